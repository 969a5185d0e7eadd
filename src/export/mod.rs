use crate::barcode::RecombinantStatus;
use crate::run::SampleResult;
use crate::utils::NO_DATA_CHAR;
use color_eyre::eyre::{Report, Result, WrapErr};
use itertools::Itertools;
use std::path::Path;

/// Column headers of the per-sample linelist.
pub fn linelist_headers() -> Vec<String> {
    vec![
        "strain",
        "lineage",
        "clade",
        "recombinant",
        "recursive",
        "edge_case",
        "parents",
        "parents_clade_lineage",
        "breakpoints",
        "regions",
        "genome_length",
    ]
    .into_iter()
    .map(String::from)
    .collect_vec()
}

/// One linelist row for a sample result, negative outcomes are NA.
pub fn linelist_row(result: &SampleResult) -> Vec<String> {
    let na = || NO_DATA_CHAR.to_string();

    let (lineage, clade, recombinant, recursive, edge_case) = match &result.lineage {
        Some(lineage_match) => {
            let recombinant = match &lineage_match.recombinant {
                RecombinantStatus::Unknown => na(),
                status => status.to_string(),
            };
            let recursive = match &lineage_match.recombinant {
                RecombinantStatus::Unknown => na(),
                RecombinantStatus::NotRecombinant => false.to_string(),
                RecombinantStatus::Recombinant { recursive, .. } => recursive.to_string(),
            };
            (
                lineage_match.lineage.clone(),
                lineage_match.clade.clone().unwrap_or_else(na),
                recombinant,
                recursive,
                lineage_match.edge_case.to_string(),
            )
        }
        None => (na(), na(), na(), na(), na()),
    };

    let recombination = &result.recombination;
    let (parents, parents_clade_lineage, breakpoints, regions) =
        if recombination.is_detected() {
            let parents = [&recombination.parent_1, &recombination.parent_2];
            (
                parents.iter().map(|parent| parent.lineage.clone()).join(","),
                parents
                    .iter()
                    .map(|parent| {
                        format!(
                            "{} ({})",
                            parent.clade.clone().unwrap_or_else(na),
                            parent.lineage
                        )
                    })
                    .join(","),
                recombination.breakpoints.iter().join(","),
                recombination.regions.values().join(","),
            )
        } else {
            (na(), na(), na(), na())
        };

    vec![
        result.strain.clone(),
        lineage,
        clade,
        recombinant,
        recursive,
        edge_case,
        parents,
        parents_clade_lineage,
        breakpoints,
        regions,
        result.genome_length.to_string(),
    ]
}

/// Write all sample results as a yaml summary.
pub fn write_summary(results: &[SampleResult], path: &Path) -> Result<(), Report> {
    let yaml = serde_yaml::to_string(results).wrap_err("Failed to serialize summary.")?;
    std::fs::write(path, yaml)
        .wrap_err_with(|| format!("Unable to write summary: {path:?}"))?;

    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
