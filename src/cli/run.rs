use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

/// Detect recombination in input genomes.
#[derive(Clone, Debug, Parser, Serialize)]
#[clap(verbatim_doc_comment)]
pub struct Args {
    /// Input substitutions table (tsv or csv).
    ///
    /// One row per sample with columns: strain, substitutions,
    /// deletions, missing.
    #[clap(short = 'i', long, required = true)]
    pub input: PathBuf,

    /// Input barcodes table (tsv or csv).
    ///
    /// Lineage rows by substitution site columns, values 0 or 1.
    #[clap(short = 'b', long, required = true)]
    pub barcodes: PathBuf,

    /// Input lineage nomenclature tree (newick).
    #[clap(long, required = true)]
    pub tree: PathBuf,

    /// Input lineage to clade table (tsv or csv).
    #[clap(long, required = true)]
    pub lineage_to_clade: PathBuf,

    /// Output directory.
    ///
    /// If the directory does not exist, it will be created.
    #[clap(short = 'o', long, required = true)]
    pub output_dir: PathBuf,

    /// Genome length of the reference.
    #[arg(short = 'g', long, default_value_t = Args::default().genome_length)]
    pub genome_length: usize,

    /// Maximum number of breakpoints.
    #[arg(long, default_value_t = Args::default().max_breakpoints)]
    pub max_breakpoints: usize,

    /// Minimum number of consecutive barcode substitutions in a parental region.
    #[arg(short = 'c', long, default_value_t = Args::default().min_consecutive)]
    pub min_consecutive: usize,

    /// Minimum length of a parental region.
    #[arg(short = 'l', long, default_value_t = Args::default().min_length)]
    pub min_length: usize,

    /// Minimum number of unique substitutions from each parent.
    #[arg(short = 's', long, default_value_t = Args::default().min_subs)]
    pub min_subs: usize,

    /// Lineages excluded from all candidate pools.
    #[arg(long, value_delimiter = ',', default_value = "BA.2.85")]
    pub knockout: Vec<String>,

    /// Disable the edge case search adjustments for particular recombinants.
    #[arg(long, default_value_t = Args::default().no_edge_cases)]
    pub no_edge_cases: bool,

    /// Number of CPU threads to use.
    #[clap(short = 't', long, default_value_t = Args::default().threads)]
    pub threads: usize,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            input: PathBuf::new(),
            barcodes: PathBuf::new(),
            tree: PathBuf::new(),
            lineage_to_clade: PathBuf::new(),
            output_dir: PathBuf::new(),
            genome_length: 29903,
            max_breakpoints: 1,
            min_consecutive: 3,
            min_length: 500,
            min_subs: 1,
            knockout: vec!["BA.2.85".to_string()],
            no_edge_cases: false,
            threads: 1,
        }
    }
}
