use crate::barcode::BarcodeSummary;
use crate::utils::{Table, NO_DATA_CHAR};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

pub const NUCLEOTIDES: [char; 4] = ['A', 'C', 'G', 'T'];

// ----------------------------------------------------------------------------
// Substitution
// ----------------------------------------------------------------------------

/// A single nucleotide substitution (ex. "A21987G").
#[derive(Copy, Clone, Debug, Hash, Serialize, Deserialize, PartialEq)]
pub struct Substitution {
    pub coord: usize,
    pub reference: char,
    pub alt: char,
}

impl std::fmt::Display for Substitution {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}{}{}", self.reference, self.coord, self.alt)
    }
}

impl FromStr for Substitution {
    type Err = Report;

    fn from_str(text: &str) -> Result<Self, Report> {
        if !text.is_ascii() || text.len() < 3 {
            return Err(eyre!("Substitution is not in the form <ref><coord><alt>: {text}"));
        }
        let reference = text.chars().next().unwrap();
        let alt = text.chars().last().unwrap();
        if !NUCLEOTIDES.contains(&reference) {
            return Err(eyre!("Substitution reference base is not a nucleotide: {text}"));
        }
        if !NUCLEOTIDES.contains(&alt) && alt != '-' {
            return Err(eyre!("Substitution alternate base is not a nucleotide: {text}"));
        }
        let coord = text[1..text.len() - 1]
            .parse()
            .wrap_err_with(|| eyre!("Substitution coordinate is not numeric: {text}"))?;
        if coord == 0 {
            return Err(eyre!("Substitution coordinates are 1-based: {text}"));
        }

        Ok(Substitution {
            coord,
            reference,
            alt,
        })
    }
}

impl Eq for Substitution {}

impl Ord for Substitution {
    fn cmp(&self, other: &Self) -> Ordering {
        // coord is the primary order, bases break ties at multi-allelic sites
        self.coord
            .cmp(&other.coord)
            .then(self.reference.cmp(&other.reference))
            .then(self.alt.cmp(&other.alt))
    }
}

impl PartialOrd for Substitution {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ----------------------------------------------------------------------------
// Genome
// ----------------------------------------------------------------------------

/// A sample genome, parsed from one row of the input substitutions table.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Genome {
    pub id: String,
    pub genome_length: usize,
    pub substitutions: Vec<Substitution>,
    pub deletions: Vec<usize>,
    pub missing: Vec<usize>,
    pub privates_reversion: Vec<Substitution>,
    pub privates_labeled: Vec<Substitution>,
    pub privates_unlabeled: Vec<Substitution>,
    #[serde(skip_serializing)]
    pub barcode_summary: BarcodeSummary,
}

impl std::fmt::Display for Genome {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Genome {
    pub fn from_row(
        table: &Table,
        row: &[String],
        genome_length: usize,
        barcodes: &BTreeMap<String, BTreeSet<Substitution>>,
    ) -> Result<Genome, Report> {
        let id = row[table.header_position("strain")?].clone();

        let substitutions = parse_substitutions(&row[table.header_position("substitutions")?])
            .wrap_err_with(|| eyre!("Failed to parse substitutions of strain {id}"))?;
        let deletions = parse_intervals(&row[table.header_position("deletions")?])
            .wrap_err_with(|| eyre!("Failed to parse deletions of strain {id}"))?;
        let missing = parse_intervals(&row[table.header_position("missing")?])
            .wrap_err_with(|| eyre!("Failed to parse missing of strain {id}"))?;

        // private mutation columns are optional
        let optional_cell = |header: &str| -> &str {
            match table.header_position(header) {
                Ok(i) => row[i].as_str(),
                Err(_) => NO_DATA_CHAR,
            }
        };
        let privates_reversion =
            parse_substitutions(optional_cell("privateNucMutations.reversionSubstitutions"))?;
        let privates_labeled = parse_labeled_substitutions(optional_cell(
            "privateNucMutations.labeledSubstitutions",
        ))?;
        let privates_unlabeled =
            parse_substitutions(optional_cell("privateNucMutations.unlabeledSubstitutions"))?;

        // all coordinates must fit the genome
        let max_coord = substitutions
            .iter()
            .map(|s| s.coord)
            .chain(deletions.iter().copied())
            .chain(missing.iter().copied())
            .max()
            .unwrap_or(0);
        if max_coord > genome_length {
            return Err(eyre!(
                "Strain {id} has coordinate {max_coord} beyond the genome length {genome_length}."
            ));
        }

        let barcode_summary = BarcodeSummary::new(&substitutions, barcodes);

        Ok(Genome {
            id,
            genome_length,
            substitutions,
            deletions,
            missing,
            privates_reversion,
            privates_labeled,
            privates_unlabeled,
            barcode_summary,
        })
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Parse a comma-separated list of substitutions, "NA" and "" are absence.
pub fn parse_substitutions(cell: &str) -> Result<Vec<Substitution>, Report> {
    let substitutions = cell
        .split(',')
        .filter(|s| !s.is_empty() && *s != NO_DATA_CHAR)
        .unique()
        .map(Substitution::from_str)
        .collect::<Result<Vec<_>, Report>>()?;

    Ok(substitutions.into_iter().sorted().collect_vec())
}

/// Parse labeled substitutions ("sub|label" pairs), keeping the sub field.
pub fn parse_labeled_substitutions(cell: &str) -> Result<Vec<Substitution>, Report> {
    let substitutions = cell
        .split(',')
        .filter(|s| s.contains('|'))
        .map(|s| s.split('|').next().unwrap())
        .unique()
        .map(Substitution::from_str)
        .collect::<Result<Vec<_>, Report>>()?;

    Ok(substitutions.into_iter().sorted().collect_vec())
}

/// Parse comma-separated coordinate intervals ("a-b" or single coords).
pub fn parse_intervals(cell: &str) -> Result<Vec<usize>, Report> {
    let mut coords: Vec<usize> = Vec::new();

    for interval in cell.split(',') {
        if interval.is_empty() || interval == NO_DATA_CHAR {
            continue;
        }
        let bounds = interval
            .split('-')
            .map(|c| {
                c.parse::<usize>()
                    .wrap_err_with(|| eyre!("Interval is not numeric: {interval}"))
            })
            .collect::<Result<Vec<_>, Report>>()?;
        match bounds.len() {
            1 => coords.push(bounds[0]),
            2 => coords.extend(bounds[0]..=bounds[1]),
            _ => return Err(eyre!("Interval is not in the form <start>-<end>: {interval}")),
        }
    }

    coords.sort();
    coords.dedup();
    Ok(coords)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_from_str() -> Result<(), Report> {
        let sub = Substitution::from_str("A21987G")?;
        assert_eq!(sub.coord, 21987);
        assert_eq!(sub.reference, 'A');
        assert_eq!(sub.alt, 'G');
        assert_eq!(sub.to_string(), "A21987G");

        // deletion alleles are allowed as alternates
        let sub = Substitution::from_str("C100-")?;
        assert_eq!(sub.alt, '-');

        assert!(Substitution::from_str("N100T").is_err());
        assert!(Substitution::from_str("A100N").is_err());
        assert!(Substitution::from_str("AT").is_err());
        assert!(Substitution::from_str("A10X0T").is_err());
        assert!(Substitution::from_str("A0T").is_err());

        Ok(())
    }

    #[test]
    fn substitution_order() -> Result<(), Report> {
        let mut subs = vec![
            Substitution::from_str("T300C")?,
            Substitution::from_str("A100T")?,
            Substitution::from_str("A100G")?,
            Substitution::from_str("G200A")?,
        ];
        subs.sort();
        let observed = subs.iter().map(|s| s.to_string()).collect_vec();
        assert_eq!(observed, vec!["A100G", "A100T", "G200A", "T300C"]);
        Ok(())
    }

    #[test]
    fn parse_substitutions_na() -> Result<(), Report> {
        assert!(parse_substitutions("NA")?.is_empty());
        assert!(parse_substitutions("")?.is_empty());

        let subs = parse_substitutions("C200G,A100T,A100T")?;
        let observed = subs.iter().map(|s| s.to_string()).collect_vec();
        assert_eq!(observed, vec!["A100T", "C200G"]);
        Ok(())
    }

    #[test]
    fn parse_labeled() -> Result<(), Report> {
        let subs = parse_labeled_substitutions("A100T|21L,C200G|22B")?;
        let observed = subs.iter().map(|s| s.to_string()).collect_vec();
        assert_eq!(observed, vec!["A100T", "C200G"]);

        // entries without a label separator are skipped
        assert!(parse_labeled_substitutions("A100T")?.is_empty());
        Ok(())
    }

    #[test]
    fn parse_interval_ranges() -> Result<(), Report> {
        assert_eq!(parse_intervals("100-103,200")?, vec![100, 101, 102, 103, 200]);
        assert!(parse_intervals("NA")?.is_empty());
        assert!(parse_intervals("1-2-3").is_err());
        assert!(parse_intervals("abc").is_err());
        Ok(())
    }

    #[test]
    fn genome_from_row() -> Result<(), Report> {
        let mut table = Table::new();
        table.headers = ["strain", "substitutions", "deletions", "missing"]
            .into_iter()
            .map(String::from)
            .collect_vec();
        let row = ["sample_1", "A100T,C200G", "300-302", "400,500-501"]
            .into_iter()
            .map(String::from)
            .collect_vec();

        let barcodes = BTreeMap::new();
        let genome = Genome::from_row(&table, &row, 29903, &barcodes)?;
        assert_eq!(genome.id, "sample_1");
        assert_eq!(genome.substitutions.len(), 2);
        assert_eq!(genome.deletions, vec![300, 301, 302]);
        assert_eq!(genome.missing, vec![400, 500, 501]);

        // coordinates beyond the genome length are malformed input
        let row = ["sample_2", "A100T", "NA", "40000"]
            .into_iter()
            .map(String::from)
            .collect_vec();
        assert!(Genome::from_row(&table, &row, 29903, &barcodes).is_err());

        Ok(())
    }
}
