use crate::utils;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use itertools::Itertools;
use std::default::Default;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A delimited text table, headers plus rows of string cells.
#[derive(Clone, Debug)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub path: PathBuf,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Table {
            headers: Vec::new(),
            rows: Vec::new(),
            path: PathBuf::new(),
        }
    }

    /// Read a delimited file, the delimiter is decided by the file extension.
    pub fn read(path: &Path) -> Result<Table, Report> {
        let mut table = Table::new();

        let delim = utils::path_to_delim(path)?;

        let file = File::open(path)
            .wrap_err_with(|| eyre!("Failed to read file: {path:?}"))?;
        let lines = BufReader::new(file).lines();

        for line in lines {
            let line = line.wrap_err_with(|| eyre!("Failed to parse file: {path:?}"))?;
            let row = line.split(delim).map(String::from).collect_vec();
            // first line is headers
            if table.headers.is_empty() {
                table.headers = row;
            } else {
                if row.len() != table.headers.len() {
                    return Err(eyre!(
                        "Row has {} columns, expected {}: {path:?}",
                        row.len(),
                        table.headers.len()
                    ));
                }
                table.rows.push(row);
            }
        }

        if table.headers.is_empty() {
            return Err(eyre!("Table is empty: {path:?}"));
        }

        table.path = path.to_path_buf();

        Ok(table)
    }

    pub fn header_position(&self, header: &str) -> Result<usize, Report> {
        let pos = self.headers.iter().position(|h| h == header).ok_or_else(|| {
            eyre!("Column '{header}' was not found in table: {:?}.", self.path)
        })?;

        Ok(pos)
    }

    /// Write to file, the delimiter is decided by the file extension.
    pub fn write(&self, path: &Path) -> Result<(), Report> {
        let mut file = File::create(path)
            .wrap_err_with(|| format!("Unable to create file: {path:?}"))?;

        let delim = utils::path_to_delim(path)?.to_string();

        let line = format!("{}\n", self.headers.iter().join(&delim));
        file.write_all(line.as_bytes())
            .wrap_err_with(|| format!("Unable to write table headers: {line}"))?;

        for row in &self.rows {
            let line = format!("{}\n", row.iter().join(&delim));
            file.write_all(line.as_bytes())
                .wrap_err_with(|| format!("Unable to write table rows: {line}"))?;
        }

        Ok(())
    }

    /// Convert table to markdown format, mainly for debug logs.
    pub fn to_markdown(&self) -> Result<String, Report> {
        // get the maximum width of each column
        let col_widths = self
            .headers
            .iter()
            .enumerate()
            .map(|(col_i, header)| {
                self.rows
                    .iter()
                    // +2 to add space on either side of the cell
                    .map(|row| {
                        let cell_width = row[col_i].len();
                        if cell_width >= header.len() {
                            cell_width + 2
                        } else {
                            header.len() + 2
                        }
                    })
                    .max()
                    .unwrap_or(header.len() + 2)
            })
            .collect_vec();

        let mut markdown = String::from("|");
        // frame in between headers and rows
        let mut header_frame = String::from("|");

        for (header, col_width) in self.headers.iter().zip(col_widths.iter()) {
            let cell = format!("{:^width$}|", header, width = col_width);
            markdown.push_str(&cell);

            let frame = format!("{}|", "-".repeat(*col_width));
            header_frame.push_str(&frame);
        }
        markdown.push('\n');
        markdown.push_str(&header_frame);
        markdown.push('\n');

        for row in &self.rows {
            markdown.push('|');
            for (col_i, col_width) in col_widths.iter().enumerate() {
                let cell = format!("{:^width$}|", row[col_i], width = col_width);
                markdown.push_str(&cell);
            }
            markdown.push('\n');
        }

        Ok(markdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trip() -> Result<(), Report> {
        let mut table = Table::new();
        table.headers = vec!["strain".to_string(), "lineage".to_string()];
        table.rows = vec![
            vec!["sample_1".to_string(), "BA.2".to_string()],
            vec!["sample_2".to_string(), "XBB.1.5".to_string()],
        ];

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("table.tsv");
        table.write(&path)?;

        let observed = Table::read(&path)?;
        assert_eq!(observed.headers, table.headers);
        assert_eq!(observed.rows, table.rows);

        Ok(())
    }

    #[test]
    fn header_position_missing() -> Result<(), Report> {
        let mut table = Table::new();
        table.headers = vec!["strain".to_string()];
        assert!(table.header_position("lineage").is_err());
        assert_eq!(table.header_position("strain")?, 0);
        Ok(())
    }
}
