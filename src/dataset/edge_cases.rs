use crate::cli;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// EdgeCase
// ----------------------------------------------------------------------------

/// Search adjustments for a recombinant whose evidence the generic
/// filters would miss. `None` fields inherit the caller's value.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EdgeCase {
    /// Recombinant groups this entry applies to.
    pub recombinants: Vec<String>,
    /// Restrict the parent_1 candidates to descendants of this lineage.
    pub include_descendants: Option<String>,
    /// Remove descendants of this lineage from the candidates.
    pub exclude_descendants: Option<String>,
    pub min_subs: Option<usize>,
    pub min_consecutive: Option<usize>,
    pub min_length: Option<usize>,
}

impl EdgeCase {
    /// Override run thresholds with this edge case's values.
    pub fn apply(&self, args: &cli::run::Args) -> cli::run::Args {
        let mut args = args.clone();
        if let Some(min_subs) = self.min_subs {
            args.min_subs = min_subs;
        }
        if let Some(min_consecutive) = self.min_consecutive {
            args.min_consecutive = min_consecutive;
        }
        if let Some(min_length) = self.min_length {
            args.min_length = min_length;
        }
        args
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// The default edge cases for sars-cov-2 recombinants.
pub fn defaults() -> Vec<EdgeCase> {
    vec![
        // XB: top lineages are tied exactly B.1.631 and B.1.634,
        // force the first parent to be B.1.631
        EdgeCase {
            recombinants: vec!["XB".to_string()],
            include_descendants: Some("B.1.631".to_string()),
            exclude_descendants: None,
            min_subs: None,
            min_consecutive: None,
            min_length: None,
        },
        // XP: second parent comes from one barcode position: A29510C
        EdgeCase {
            recombinants: vec!["XP".to_string()],
            include_descendants: Some("BA.2".to_string()),
            exclude_descendants: None,
            min_subs: None,
            min_consecutive: Some(1),
            min_length: Some(1),
        },
        // XR: no diagnostic subs from second parent, only 2 consecutive barcodes
        EdgeCase {
            recombinants: vec!["XR".to_string()],
            include_descendants: None,
            exclude_descendants: None,
            min_subs: Some(0),
            min_consecutive: Some(2),
            min_length: None,
        },
        // XBK, XBQ: only 2 consecutive barcodes
        EdgeCase {
            recombinants: vec!["XBK".to_string(), "XBQ".to_string()],
            include_descendants: Some("BA.2".to_string()),
            exclude_descendants: None,
            min_subs: None,
            min_consecutive: None,
            min_length: None,
        },
        // XBZ: only 2 consecutive barcodes, extremely short parent 2 length
        EdgeCase {
            recombinants: vec!["XBZ".to_string()],
            include_descendants: None,
            exclude_descendants: None,
            min_subs: None,
            min_consecutive: Some(2),
            min_length: Some(300),
        },
        // XAS: the pango designation required deletions to resolve the
        // first parent, force it to be BA.2
        EdgeCase {
            recombinants: vec!["XAS".to_string()],
            include_descendants: Some("BA.2".to_string()),
            exclude_descendants: None,
            min_subs: None,
            min_consecutive: None,
            min_length: None,
        },
        // XAE: second parent only has 1 conflict sub, force the first
        // parent to be the minor parent (BA.1)
        EdgeCase {
            recombinants: vec!["XAE".to_string()],
            include_descendants: Some("BA.1".to_string()),
            exclude_descendants: None,
            min_subs: None,
            min_consecutive: Some(5),
            min_length: None,
        },
        // XAV: no diagnostic subs from second parent, BA.5.1.24 interferes
        EdgeCase {
            recombinants: vec!["XAV".to_string()],
            include_descendants: None,
            exclude_descendants: Some("BA.5.1.24".to_string()),
            min_subs: Some(0),
            min_consecutive: Some(2),
            min_length: None,
        },
        // XAZ: no diagnostic subs from BA.2, force the minor parent (BA.2)
        // to be the first parent, this improves the search for the major
        // parent (BA.5)
        EdgeCase {
            recombinants: vec!["XAZ".to_string()],
            include_descendants: Some("BA.2".to_string()),
            exclude_descendants: None,
            min_subs: Some(0),
            min_consecutive: Some(1),
            min_length: Some(1),
        },
    ]
}

/// Find the edge case for a recombinant group.
pub fn find<'e>(edge_cases: &'e [EdgeCase], recombinant: &str) -> Option<&'e EdgeCase> {
    edge_cases.iter().find(|e| e.recombinants.iter().any(|r| r == recombinant))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_group() {
        let edge_cases = defaults();
        assert!(find(&edge_cases, "XB").is_some());
        assert!(find(&edge_cases, "XBQ").is_some());
        assert!(find(&edge_cases, "XBB").is_none());
    }

    #[test]
    fn apply_overrides() {
        let edge_cases = defaults();
        let args = cli::run::Args::default();

        // XP loosens the region filters but inherits min_subs
        let edge_case = find(&edge_cases, "XP").unwrap();
        let observed = edge_case.apply(&args);
        assert_eq!(observed.min_consecutive, 1);
        assert_eq!(observed.min_length, 1);
        assert_eq!(observed.min_subs, args.min_subs);

        // XB inherits all thresholds
        let edge_case = find(&edge_cases, "XB").unwrap();
        let observed = edge_case.apply(&args);
        assert_eq!(observed.min_subs, args.min_subs);
        assert_eq!(observed.min_consecutive, args.min_consecutive);
        assert_eq!(observed.min_length, args.min_length);
    }
}
