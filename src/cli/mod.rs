pub mod run;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::default::Default;

// -----------------------------------------------------------------------------
// CLI Entry Point
// -----------------------------------------------------------------------------

/// xdetect command-line interface (CLI)
#[derive(Parser, Debug)]
#[clap(name = "xdetect", trailing_var_arg = true)]
#[clap(author, version)]
#[clap(verbatim_doc_comment)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,

    /// Control output verbosity level.
    #[clap(short = 'v', long)]
    #[clap(value_enum, default_value_t = Verbosity::default())]
    #[clap(hide_possible_values = false)]
    #[clap(global = true)]
    pub verbosity: Verbosity,
}

/// CLI commands (run, help).
#[derive(Subcommand, Debug)]
#[clap(verbatim_doc_comment)]
pub enum Command {
    Run(Box<run::Args>),
}

// -----------------------------------------------------------------------------
// Verbosity
// -----------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, ValueEnum)]
pub enum Verbosity {
    #[default]
    Info,
    Warn,
    Debug,
    Error,
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // Convert to lowercase for RUST_LOG env var compatibility
        let lowercase = format!("{:?}", self).to_lowercase();
        write!(f, "{lowercase}")
    }
}
