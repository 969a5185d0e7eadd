use clap::Parser;
use color_eyre::eyre::{Report, Result};
use std::env;
use xdetect::cli::{Cli, Command};
use xdetect::run;

fn setup(args: &Cli) -> Result<(), Report> {
    color_eyre::install()?;

    // Set default logging level if RUST_LOG is not set.
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", args.verbosity.to_string())
    }
    env_logger::init();

    Ok(())
}

fn main() -> Result<(), Report> {
    let mut args = Cli::parse();
    setup(&args)?;

    match &mut args.command {
        Command::Run(args) => run::run(args)?,
    }

    Ok(())
}
