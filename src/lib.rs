pub mod barcode;
pub mod cli;
pub mod dataset;
pub mod export;
pub mod phylogeny;
pub mod recombination;
pub mod run;
pub mod sequence;
pub mod utils;
