pub mod edge_cases;

use crate::cli;
use crate::phylogeny::{Phylogeny, RECOMBINANT_NODE, ROOT_NODE};
use crate::sequence::Substitution;
use crate::utils::Table;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use edge_cases::EdgeCase;
use itertools::Itertools;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

// ----------------------------------------------------------------------------
// Dataset
// ----------------------------------------------------------------------------

/// The lineage reference data shared read-only by all samples: barcodes,
/// nomenclature tree, clade map and edge cases.
#[derive(Debug, Default)]
pub struct Dataset {
    /// Lineage name to its set of expected (barcode) substitutions.
    pub barcodes: BTreeMap<String, BTreeSet<Substitution>>,
    /// Lineage nomenclature tree.
    pub phylogeny: Phylogeny,
    /// Lineage name to nextstrain clade.
    pub clades: BTreeMap<String, String>,
    /// All lineage names in the designated recombinant subtree.
    pub recombinant_lineages: Vec<String>,
    /// Search adjustments for particular recombinants.
    pub edge_cases: Vec<EdgeCase>,
}

/// Load and cross-validate the dataset input files.
pub fn load(args: &cli::run::Args) -> Result<Dataset, Report> {
    let mut dataset = Dataset::default();

    // ------------------------------------------------------------------------
    // Lineage Tree (Required)

    info!("Loading tree: {:?}", args.tree);
    dataset.phylogeny = Phylogeny::from_newick(&args.tree)?;

    let root = dataset.phylogeny.get_root()?;
    if root != ROOT_NODE {
        return Err(eyre!("Tree root is {root}, expected {ROOT_NODE}.")
            .suggestion("Was the tree built from the designated lineage notes?"));
    }
    dataset
        .phylogeny
        .get_node(RECOMBINANT_NODE)
        .wrap_err_with(|| eyre!("Tree has no recombinant node {RECOMBINANT_NODE}."))?;

    dataset.recombinant_lineages = dataset.phylogeny.get_descendants(RECOMBINANT_NODE)?;

    // ------------------------------------------------------------------------
    // Barcodes (Required)

    info!("Loading barcodes: {:?}", args.barcodes);
    dataset.barcodes = load_barcodes(args)?;

    // lineages absent from the tree are excluded from all candidate pools
    let unknown = dataset
        .barcodes
        .keys()
        .filter(|lineage| dataset.phylogeny.get_node(lineage).is_err())
        .cloned()
        .collect_vec();
    for lineage in &unknown {
        warn!("Barcode lineage {lineage} is not in the tree and will be excluded.");
        dataset.barcodes.remove(lineage);
    }

    // problematic lineages are excluded globally
    for lineage in &args.knockout {
        if dataset.barcodes.remove(lineage).is_none() {
            warn!("Knockout lineage {lineage} is not in the barcodes.");
        }
    }

    // ------------------------------------------------------------------------
    // Lineage to Clade (Required)

    info!("Loading lineage to clade map: {:?}", args.lineage_to_clade);
    let table = Table::read(&args.lineage_to_clade)?;
    let lineage_i = table.header_position("lineage")?;
    let clade_i = table.header_position("nextstrainClade")?;
    for row in &table.rows {
        dataset.clades.insert(row[lineage_i].clone(), row[clade_i].clone());
    }

    // ------------------------------------------------------------------------
    // Edge Cases

    dataset.edge_cases = if args.no_edge_cases {
        info!("Edge cases are disabled.");
        Vec::new()
    } else {
        edge_cases::defaults()
    };

    Ok(dataset)
}

/// Parse the barcodes table, lineage rows by substitution site columns.
fn load_barcodes(
    args: &cli::run::Args,
) -> Result<BTreeMap<String, BTreeSet<Substitution>>, Report> {
    let table = Table::read(&args.barcodes)?;

    // the lineage column header may be blank (ex. pandas index exports)
    if !table.headers[0].is_empty() && table.headers[0] != "lineage" {
        return Err(eyre!(
            "Barcodes column 1 is {:?}, expected 'lineage': {:?}",
            table.headers[0],
            args.barcodes
        ));
    }

    let sites = table
        .headers
        .iter()
        .skip(1)
        .map(|header| {
            Substitution::from_str(header).wrap_err_with(|| {
                eyre!("Barcodes column {header:?} is not a substitution: {:?}", args.barcodes)
            })
        })
        .collect::<Result<Vec<_>, Report>>()?;

    let mut barcodes: BTreeMap<String, BTreeSet<Substitution>> = BTreeMap::new();
    for row in &table.rows {
        let lineage = row[0].clone();
        if barcodes.contains_key(&lineage) {
            return Err(eyre!(
                "Barcodes lineage {lineage} has duplicate rows: {:?}",
                args.barcodes
            ));
        }

        let mut subs = BTreeSet::new();
        for (site, cell) in sites.iter().zip(row.iter().skip(1)) {
            match cell.as_str() {
                "1" => {
                    subs.insert(*site);
                }
                "0" => continue,
                _ => {
                    return Err(eyre!(
                        "Barcodes value for {lineage} at {site} is {cell:?}, expected 0 or 1."
                    ))
                }
            }
        }
        barcodes.insert(lineage, subs);
    }

    Ok(barcodes)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_toy_dataset() -> Result<(), Report> {
        let dir = tempfile::tempdir()?;

        let mut args = cli::run::Args {
            tree: write_file(dir.path(), "tree.nwk", "((AY.4,(BA.2)B.1.1.529)B.1,(XD)X)MRCA;"),
            barcodes: write_file(
                dir.path(),
                "barcodes.csv",
                "lineage,A100T,C200G,T300A\nAY.4,1,1,0\nBA.2,0,0,1\nBQ.1,1,0,1\n",
            ),
            lineage_to_clade: write_file(
                dir.path(),
                "lineage_to_clade.tsv",
                "lineage\tnextstrainClade\nAY.4\t21J\nBA.2\t21L\n",
            ),
            ..Default::default()
        };

        let dataset = load(&args)?;
        // BQ.1 is not in the tree, it is excluded from the barcodes
        assert_eq!(dataset.barcodes.keys().collect_vec(), vec!["AY.4", "BA.2"]);
        assert_eq!(dataset.recombinant_lineages, vec!["X", "XD"]);
        assert_eq!(dataset.clades["AY.4"], "21J");
        assert_eq!(dataset.barcodes["AY.4"].len(), 2);

        // a knockout empties the candidate pool of a problematic lineage
        args.knockout = vec!["BA.2".to_string()];
        let dataset = load(&args)?;
        assert_eq!(dataset.barcodes.keys().collect_vec(), vec!["AY.4"]);

        Ok(())
    }

    #[test]
    fn load_rejects_malformed_barcodes() -> Result<(), Report> {
        let dir = tempfile::tempdir()?;
        let tree = write_file(dir.path(), "tree.nwk", "((AY.4)B.1,(XD)X)MRCA;");
        let clades = write_file(
            dir.path(),
            "lineage_to_clade.tsv",
            "lineage\tnextstrainClade\nAY.4\t21J\n",
        );

        // header is not a substitution
        let args = cli::run::Args {
            tree: tree.clone(),
            lineage_to_clade: clades.clone(),
            barcodes: write_file(dir.path(), "barcodes.csv", "lineage,notasub\nAY.4,1\n"),
            ..Default::default()
        };
        assert!(load(&args).is_err());

        // duplicate lineage rows
        let args = cli::run::Args {
            tree: tree.clone(),
            lineage_to_clade: clades.clone(),
            barcodes: write_file(
                dir.path(),
                "barcodes2.csv",
                "lineage,A100T\nAY.4,1\nAY.4,0\n",
            ),
            ..Default::default()
        };
        assert!(load(&args).is_err());

        // tree without a recombinant node
        let args = cli::run::Args {
            tree: write_file(dir.path(), "tree2.nwk", "((AY.4)B.1)MRCA;"),
            lineage_to_clade: clades,
            barcodes: write_file(dir.path(), "barcodes3.csv", "lineage,A100T\nAY.4,1\n"),
            ..Default::default()
        };
        assert!(load(&args).is_err());

        Ok(())
    }
}
