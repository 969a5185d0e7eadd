pub mod table;

use color_eyre::eyre::{eyre, Report, Result};
use color_eyre::Help;
use log::warn;
use std::path::Path;

pub use table::Table;

/// Sentinel for absent values in delimited tables.
pub const NO_DATA_CHAR: &str = "NA";

/// Pick the field delimiter for a table from its file extension.
pub fn path_to_delim(path: &Path) -> Result<char, Report> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| eyre!("File has no parsable extension: {path:?}"))?;

    match ext {
        "tsv" => Ok('\t'),
        "csv" => Ok(','),
        "txt" => {
            warn!("Assuming tab delimiters for the .txt file: {path:?}");
            Ok('\t')
        }
        _ => Err(eyre!("Delimiter of .{ext} files is unknown: {path:?}")
            .suggestion("Supported table extensions are tsv and csv.")),
    }
}
