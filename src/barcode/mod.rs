use crate::dataset::Dataset;
use crate::phylogeny::{RECOMBINANT_NODE, ROOT_NODE};
use crate::sequence::{Genome, Substitution};
use color_eyre::eyre::{eyre, Report, Result};
use itertools::Itertools;
use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Fixed seed for the top lineage subsample, keeps reruns identical.
pub const SUBSAMPLE_SEED: u64 = 123456;
/// Large top lineage ties are subsampled down to this many for speed.
pub const MAX_TOP_LINEAGES: usize = 10;
/// Mean tree distances are rounded to 6 decimals before comparison.
const DISTANCE_PRECISION: f64 = 1e6;

// ----------------------------------------------------------------------------
// BarcodeSummary
// ----------------------------------------------------------------------------

/// Per-genome candidate pool: how many of each lineage's barcode
/// substitutions the genome carries.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BarcodeSummary {
    /// (lineage, barcode hits), sorted by hits descending.
    pub lineages: Vec<(String, usize)>,
}

impl BarcodeSummary {
    pub fn new(
        substitutions: &[Substitution],
        barcodes: &BTreeMap<String, BTreeSet<Substitution>>,
    ) -> Self {
        let mut lineages = barcodes
            .iter()
            .filter_map(|(lineage, barcode)| {
                let count = substitutions.iter().filter(|s| barcode.contains(s)).count();
                (count > 0).then(|| (lineage.clone(), count))
            })
            .collect_vec();
        // stable sort keeps name order between tied counts
        lineages.sort_by(|(_, count_1), (_, count_2)| count_2.cmp(count_1));

        BarcodeSummary { lineages }
    }

    pub fn is_empty(&self) -> bool {
        self.lineages.is_empty()
    }

    /// Lineages tied at the highest barcode count.
    pub fn top_lineages(&self) -> Vec<String> {
        let max_count = self.lineages.first().map(|(_, count)| *count).unwrap_or(0);
        self.lineages
            .iter()
            .filter(|(_, count)| *count == max_count)
            .map(|(lineage, _)| lineage.clone())
            .collect_vec()
    }

    /// A new pool without the named lineages.
    pub fn exclude(&self, names: &[String]) -> BarcodeSummary {
        let lineages = self
            .lineages
            .iter()
            .filter(|(lineage, _)| !names.contains(lineage))
            .cloned()
            .collect_vec();
        BarcodeSummary { lineages }
    }

    /// A new pool restricted to the named lineages.
    pub fn retain(&self, names: &[String]) -> BarcodeSummary {
        let lineages = self
            .lineages
            .iter()
            .filter(|(lineage, _)| names.contains(lineage))
            .cloned()
            .collect_vec();
        BarcodeSummary { lineages }
    }
}

// ----------------------------------------------------------------------------
// RecombinantStatus
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub enum RecombinantStatus {
    /// Classification could not be decided, the pipeline continues.
    #[default]
    Unknown,
    /// Perfect match to a non-recombinant lineage.
    NotRecombinant,
    /// A designated recombinant group (ex. XBB). Recursive means the
    /// group descends from another recombinant.
    Recombinant { group: String, recursive: bool },
}

impl RecombinantStatus {
    pub fn group(&self) -> Option<&str> {
        match self {
            RecombinantStatus::Recombinant { group, .. } => Some(group),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecombinantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RecombinantStatus::Unknown => write!(f, ""),
            RecombinantStatus::NotRecombinant => write!(f, "false"),
            RecombinantStatus::Recombinant { group, .. } => write!(f, "{group}"),
        }
    }
}

// ----------------------------------------------------------------------------
// Match
// ----------------------------------------------------------------------------

/// The best supported lineage for a set of observed substitutions.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Match {
    pub lineage: String,
    pub definition: String,
    pub clade: Option<String>,
    pub top_lineages: Vec<String>,
    pub top_lineages_subsample: Vec<String>,
    pub outlier_lineages: Vec<String>,
    /// Expected substitutions: the lineage's barcode plus the subs
    /// shared by every non-outlier top lineage.
    pub barcode: Vec<Substitution>,
    pub support: Vec<Substitution>,
    pub missing: Vec<Substitution>,
    pub conflict_ref: Vec<Substitution>,
    pub conflict_alt: Vec<Substitution>,
    pub recombinant: RecombinantStatus,
    pub edge_case: bool,
}

impl Match {
    /// Yaml rendering of the match, for debug logs.
    pub fn to_yaml(&self) -> Result<String, Report> {
        Ok(serde_yaml::to_string(self)?)
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Find the best supported lineage for a genome among the candidate pool.
///
/// Returns `None` when the pool is empty.
pub fn search(
    genome: &Genome,
    summary: &BarcodeSummary,
    dataset: &Dataset,
) -> Result<Option<Match>, Report> {
    if summary.is_empty() {
        return Ok(None);
    }

    let top_lineages = summary.top_lineages();
    let mut lineage = dataset.phylogeny.get_common_ancestor(&top_lineages)?;

    // ------------------------------------------------------------------------
    // Outlier Detection

    let mut top_lineages_subsample = top_lineages.clone();
    let mut outlier_lineages: Vec<String> = Vec::new();

    if top_lineages.len() >= 2 {
        if top_lineages.len() > MAX_TOP_LINEAGES {
            let mut rng = StdRng::seed_from_u64(SUBSAMPLE_SEED);
            top_lineages_subsample = (0..MAX_TOP_LINEAGES)
                .map(|_| top_lineages[rng.gen_range(0..top_lineages.len())].clone())
                .collect_vec();
        }

        // mean distance from each subsampled lineage to all the others,
        // drawing with replacement can repeat a name, those collapse
        let members = top_lineages_subsample.iter().unique().cloned().collect_vec();
        if members.len() >= 2 {
            let mut mean_distances: Vec<(String, i64)> = Vec::new();
            for lineage_1 in &members {
                let distances = top_lineages_subsample
                    .iter()
                    .filter(|lineage_2| *lineage_2 != lineage_1)
                    .map(|lineage_2| dataset.phylogeny.get_distance(lineage_1, lineage_2))
                    .collect::<Result<Vec<_>, Report>>()?;
                let mean = distances.iter().sum::<usize>() as f64 / distances.len() as f64;
                let rounded = (mean * DISTANCE_PRECISION).round() as i64;
                mean_distances.push((lineage_1.clone(), rounded));
            }

            // mode of the means, the first value encountered wins ties
            let mut mode = mean_distances[0].1;
            let mut mode_count = 0;
            for value in mean_distances.iter().map(|(_, distance)| *distance).unique() {
                let count =
                    mean_distances.iter().filter(|(_, distance)| *distance == value).count();
                if count > mode_count {
                    mode = value;
                    mode_count = count;
                }
            }

            let keep = mean_distances
                .iter()
                .filter(|(_, distance)| *distance <= mode)
                .map(|(lineage, _)| lineage.clone())
                .collect_vec();
            outlier_lineages = mean_distances
                .iter()
                .filter(|(_, distance)| *distance > mode)
                .map(|(lineage, _)| lineage.clone())
                .collect_vec();

            // refold to the common ancestor of the remaining lineages, any
            // top lineage outside that clade is also an outlier
            lineage = dataset.phylogeny.get_common_ancestor(&keep)?;
            let descendants = dataset.phylogeny.get_descendants(&lineage)?;
            for top_lineage in &top_lineages {
                if !descendants.contains(top_lineage)
                    && !outlier_lineages.contains(top_lineage)
                {
                    outlier_lineages.push(top_lineage.clone());
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Clade

    let clade = if let Some(clade) = dataset.clades.get(&lineage) {
        Some(clade.clone())
    } else if lineage == ROOT_NODE || lineage == RECOMBINANT_NODE {
        Some(lineage.clone())
    } else {
        warn!("{genome}: lineage {lineage} has no known clade.");
        None
    };

    // ------------------------------------------------------------------------
    // Expected Substitutions

    // A sub carried by every non-outlier top lineage must not count as a
    // conflict, even when the folded ancestor's own barcode lacks it.
    // Ex. XAJ: T15009C conflicts with the MRCA BA.2.12.1, but all top
    // lineages (BG*) have it.
    let members = top_lineages_subsample
        .iter()
        .filter(|member| !outlier_lineages.contains(*member))
        .unique()
        .collect_vec();
    let mut shared: Vec<Substitution> = Vec::new();
    for (i, member) in members.iter().enumerate() {
        let member_barcode = dataset
            .barcodes
            .get(*member)
            .ok_or_else(|| eyre!("Lineage {member} is not in the barcodes."))?;
        if i == 0 {
            shared = member_barcode.iter().copied().collect_vec();
        } else {
            shared.retain(|sub| member_barcode.contains(sub));
        }
    }

    // the folded ancestor may have no barcode row of its own (ex. MRCA, X)
    let mut expected: BTreeSet<Substitution> = shared.iter().copied().collect();
    if let Some(lineage_barcode) = dataset.barcodes.get(&lineage) {
        expected.extend(lineage_barcode.iter().copied());
    }
    let barcode = expected.iter().copied().collect_vec();

    // ------------------------------------------------------------------------
    // Support and Conflicts

    let support = barcode
        .iter()
        .filter(|sub| genome.substitutions.contains(sub))
        .copied()
        .collect_vec();
    let missing = barcode
        .iter()
        .filter(|sub| {
            !genome.substitutions.contains(sub) && genome.missing.contains(&sub.coord)
        })
        .copied()
        .collect_vec();
    let conflict_ref = barcode
        .iter()
        .filter(|sub| {
            !genome.substitutions.contains(sub) && !genome.missing.contains(&sub.coord)
        })
        .copied()
        .collect_vec();
    let conflict_alt = genome
        .substitutions
        .iter()
        .filter(|sub| !expected.contains(sub))
        .copied()
        .collect_vec();

    let mut definition = lineage.clone();
    if !conflict_alt.is_empty() {
        definition = format!("{lineage}+{}", conflict_alt.iter().join(","));
    }

    Ok(Some(Match {
        lineage,
        definition,
        clade,
        top_lineages,
        top_lineages_subsample,
        outlier_lineages,
        barcode,
        support,
        missing,
        conflict_ref,
        conflict_alt,
        recombinant: RecombinantStatus::default(),
        edge_case: false,
    }))
}

/// Classify the recombinant status of a barcode match.
pub fn set_recombinant_status(
    barcode_match: &mut Match,
    dataset: &Dataset,
) -> Result<(), Report> {
    // the match folded all the way up to the recombinant root
    if barcode_match.lineage == RECOMBINANT_NODE {
        barcode_match.recombinant = RecombinantStatus::Recombinant {
            group: RECOMBINANT_NODE.to_string(),
            recursive: false,
        };
        return Ok(());
    }

    if dataset.recombinant_lineages.contains(&barcode_match.lineage) {
        // walk from the lineage back towards the recombinant root, the first
        // X-named ancestor is the group (aliases like EK are skipped over)
        let path = subtree_path(dataset, &barcode_match.lineage)?;
        let group = path
            .iter()
            .rev()
            .find(|name| name.starts_with('X'))
            .map(|name| name.split('.').next().unwrap().to_string());

        if let Some(group) = group {
            // nested below another recombinant group
            let recursive = subtree_path(dataset, &group)?.len() > 1;
            barcode_match.recombinant = RecombinantStatus::Recombinant { group, recursive };
        }
        return Ok(());
    }

    if barcode_match.conflict_ref.is_empty() {
        barcode_match.recombinant = RecombinantStatus::NotRecombinant;
    }

    Ok(())
}

/// Path of names from just below the recombinant root down to a lineage.
fn subtree_path(dataset: &Dataset, lineage: &str) -> Result<Vec<String>, Report> {
    let ancestors = dataset.phylogeny.get_ancestors(lineage)?;
    let position = ancestors
        .iter()
        .position(|name| name == RECOMBINANT_NODE)
        .ok_or_else(|| eyre!("Lineage {lineage} is not in the recombinant subtree."))?;

    Ok(ancestors[position + 1..].to_vec())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phylogeny::Phylogeny;
    use std::str::FromStr;

    fn toy_dataset(newick: &str, barcodes: &[(&str, &[&str])]) -> Dataset {
        let phylogeny = Phylogeny::from_newick_str(newick).unwrap();
        let recombinant_lineages = phylogeny.get_descendants(RECOMBINANT_NODE).unwrap();
        let barcodes = barcodes
            .iter()
            .map(|(lineage, subs)| {
                let subs = subs
                    .iter()
                    .map(|s| Substitution::from_str(s).unwrap())
                    .collect::<BTreeSet<_>>();
                (lineage.to_string(), subs)
            })
            .collect();

        Dataset {
            barcodes,
            phylogeny,
            clades: BTreeMap::new(),
            recombinant_lineages,
            edge_cases: Vec::new(),
        }
    }

    fn toy_genome(dataset: &Dataset, substitutions: &str, missing: &[usize]) -> Genome {
        let substitutions = crate::sequence::parse_substitutions(substitutions).unwrap();
        let barcode_summary = BarcodeSummary::new(&substitutions, &dataset.barcodes);
        Genome {
            id: "query".to_string(),
            genome_length: 29903,
            substitutions,
            missing: missing.to_vec(),
            barcode_summary,
            ..Default::default()
        }
    }

    #[test]
    fn empty_summary_is_no_match() -> Result<(), Report> {
        let dataset = toy_dataset("((BA.2)B.1.1.529,X)MRCA;", &[("BA.2", &["A100T"])]);
        let genome = toy_genome(&dataset, "NA", &[]);
        assert_eq!(search(&genome, &genome.barcode_summary, &dataset)?, None);
        Ok(())
    }

    #[test]
    fn single_top_lineage() -> Result<(), Report> {
        let dataset = toy_dataset(
            "((BA.2,(BA.5.2)BA.5)B.1.1.529,X)MRCA;",
            &[
                ("BA.2", &["A100T", "C200G"]),
                ("BA.5.2", &["A100T"]),
            ],
        );
        let genome = toy_genome(&dataset, "A100T,C200G", &[]);

        let result = search(&genome, &genome.barcode_summary, &dataset)?.unwrap();
        assert_eq!(result.lineage, "BA.2");
        assert_eq!(result.top_lineages, vec!["BA.2"]);
        assert!(result.outlier_lineages.is_empty());
        assert_eq!(result.support.len(), 2);
        assert!(result.conflict_ref.is_empty());
        assert!(result.conflict_alt.is_empty());
        assert_eq!(result.definition, "BA.2");
        Ok(())
    }

    #[test]
    fn partitions_are_disjoint() -> Result<(), Report> {
        let dataset = toy_dataset(
            "((BA.2)B.1.1.529,X)MRCA;",
            &[("BA.2", &["A100T", "C200G", "G300A", "T400C"])],
        );
        // support A100T, missing C200G (coord in missing), conflicts on the
        // rest, plus an unexpected private sub
        let genome = toy_genome(&dataset, "A100T,T500G", &[200]);

        let result = search(&genome, &genome.barcode_summary, &dataset)?.unwrap();
        assert_eq!(result.support.iter().join(","), "A100T");
        assert_eq!(result.missing.iter().join(","), "C200G");
        assert_eq!(result.conflict_ref.iter().join(","), "G300A,T400C");
        assert_eq!(result.conflict_alt.iter().join(","), "T500G");
        assert_eq!(result.definition, "BA.2+T500G");

        // the partitions cover the expected set exactly
        let mut partitioned = result.support.clone();
        partitioned.extend(result.missing.clone());
        partitioned.extend(result.conflict_ref.clone());
        partitioned.sort();
        assert_eq!(partitioned, result.barcode);
        Ok(())
    }

    #[test]
    fn tie_folds_to_common_ancestor_with_shared_subs() -> Result<(), Report> {
        let dataset = toy_dataset(
            "(((BA.2.75)BA.2,BA.1)B.1.1.529,X)MRCA;",
            &[
                ("BA.2", &["A100T", "C200G"]),
                ("BA.2.75", &["A100T", "C200G", "G300A"]),
            ],
        );
        // two barcode hits each, the tie folds to BA.2
        let genome = toy_genome(&dataset, "A100T,C200G", &[]);

        let result = search(&genome, &genome.barcode_summary, &dataset)?.unwrap();
        assert_eq!(result.lineage, "BA.2");
        assert_eq!(result.top_lineages, vec!["BA.2", "BA.2.75"]);
        assert!(result.outlier_lineages.is_empty());
        // shared subs of both top lineages, G300A belongs only to BA.2.75
        assert_eq!(result.barcode.iter().join(","), "A100T,C200G");
        assert!(result.conflict_alt.is_empty());
        Ok(())
    }

    #[test]
    fn shared_subs_promoted_to_expected() -> Result<(), Report> {
        // the folded ancestor's own barcode lacks G300A, but every top
        // lineage carries it, so it must not become a conflict
        let dataset = toy_dataset(
            "(((BG.1,BG.2)BA.2.12.1)BA.2,X)MRCA;",
            &[
                ("BA.2.12.1", &["A100T"]),
                ("BG.1", &["A100T", "G300A"]),
                ("BG.2", &["A100T", "G300A"]),
            ],
        );
        let genome = toy_genome(&dataset, "A100T,G300A", &[]);

        let result = search(&genome, &genome.barcode_summary, &dataset)?.unwrap();
        assert_eq!(result.lineage, "BA.2.12.1");
        assert!(result.barcode.iter().any(|s| s.to_string() == "G300A"));
        assert!(result.conflict_alt.is_empty());
        assert_eq!(result.support.len(), 2);
        Ok(())
    }

    #[test]
    fn mode_tie_keeps_first_encountered() -> Result<(), Report> {
        // two pairs of tied top lineages: AA.1/AA.2 are siblings, AB.1/AB.2
        // sit three edges below AB. Mean distances tie 2 vs 2, the AA pair
        // comes first in the pool and wins the mode
        let dataset = toy_dataset(
            "((AA.1,AA.2)AA,(((AB.1)AB.C2)AB.C1,((AB.2)AB.D2)AB.D1)AB,X)MRCA;",
            &[
                ("AA.1", &["A100T", "C200G"]),
                ("AA.2", &["A100T", "C200G"]),
                ("AB.1", &["A100T", "C200G"]),
                ("AB.2", &["A100T", "C200G"]),
            ],
        );
        let genome = toy_genome(&dataset, "A100T,C200G", &[]);

        let result = search(&genome, &genome.barcode_summary, &dataset)?.unwrap();
        assert_eq!(result.lineage, "AA");
        let mut outliers = result.outlier_lineages.clone();
        outliers.sort();
        assert_eq!(outliers, vec!["AB.1", "AB.2"]);
        Ok(())
    }

    #[test]
    fn large_tie_subsample_is_deterministic() -> Result<(), Report> {
        // 12 tied lineages: 10 close siblings and 2 distant outliers
        let newick = "((C.1,C.2,C.3,C.4,C.5,C.6,C.7,C.8,C.9,C.10)P,((((F.1,F.2)F)G)H)J,X)MRCA;";
        let subs: &[&str] = &["A100T", "C200G"];
        let barcodes = [
            ("C.1", subs), ("C.2", subs), ("C.3", subs), ("C.4", subs),
            ("C.5", subs), ("C.6", subs), ("C.7", subs), ("C.8", subs),
            ("C.9", subs), ("C.10", subs), ("F.1", subs), ("F.2", subs),
        ];
        let dataset = toy_dataset(newick, &barcodes);
        let genome = toy_genome(&dataset, "A100T,C200G", &[]);

        let result = search(&genome, &genome.barcode_summary, &dataset)?.unwrap();
        assert_eq!(result.top_lineages.len(), 12);
        assert_eq!(result.top_lineages_subsample.len(), MAX_TOP_LINEAGES);

        // the distant pair is always flagged, whatever the draw
        assert!(result.outlier_lineages.contains(&"F.1".to_string()));
        assert!(result.outlier_lineages.contains(&"F.2".to_string()));
        assert_eq!(result.lineage, "P");

        // the seeded draw makes reruns identical
        let rerun = search(&genome, &genome.barcode_summary, &dataset)?.unwrap();
        assert_eq!(result, rerun);
        Ok(())
    }

    #[test]
    fn recombinant_status_designated() -> Result<(), Report> {
        let dataset = toy_dataset(
            "((BA.2)B.1.1.529,(XB,(XBL)XBB)X)MRCA;",
            &[("XB", &["A100T"])],
        );

        let mut result = Match {
            lineage: "XB".to_string(),
            ..Default::default()
        };
        set_recombinant_status(&mut result, &dataset)?;
        assert_eq!(
            result.recombinant,
            RecombinantStatus::Recombinant {
                group: "XB".to_string(),
                recursive: false
            }
        );

        // XBL descends from XBB, it is a recursive recombinant
        let mut result = Match {
            lineage: "XBL".to_string(),
            ..Default::default()
        };
        set_recombinant_status(&mut result, &dataset)?;
        assert_eq!(
            result.recombinant,
            RecombinantStatus::Recombinant {
                group: "XBL".to_string(),
                recursive: true
            }
        );

        // the recombinant root itself
        let mut result = Match {
            lineage: "X".to_string(),
            ..Default::default()
        };
        set_recombinant_status(&mut result, &dataset)?;
        assert_eq!(
            result.recombinant,
            RecombinantStatus::Recombinant {
                group: "X".to_string(),
                recursive: false
            }
        );
        Ok(())
    }

    #[test]
    fn recombinant_status_by_conflict() -> Result<(), Report> {
        let dataset = toy_dataset("((BA.2)B.1.1.529,X)MRCA;", &[("BA.2", &["A100T"])]);

        // perfect match
        let mut result = Match {
            lineage: "BA.2".to_string(),
            ..Default::default()
        };
        set_recombinant_status(&mut result, &dataset)?;
        assert_eq!(result.recombinant, RecombinantStatus::NotRecombinant);

        // unresolved conflicts leave the status open
        let mut result = Match {
            lineage: "BA.2".to_string(),
            conflict_ref: vec![Substitution::from_str("A100T")?],
            ..Default::default()
        };
        set_recombinant_status(&mut result, &dataset)?;
        assert_eq!(result.recombinant, RecombinantStatus::Unknown);
        Ok(())
    }
}
