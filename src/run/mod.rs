use crate::barcode::{self, Match, RecombinantStatus};
use crate::cli;
use crate::dataset::{self, edge_cases, Dataset};
use crate::export;
use crate::recombination::{self, Recombination};
use crate::sequence::Genome;
use crate::utils::{self, Table};
use color_eyre::eyre::{Report, Result, WrapErr};
use indicatif::{style::ProgressStyle, ProgressBar};
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

// ----------------------------------------------------------------------------
// SampleResult
// ----------------------------------------------------------------------------

/// The analysis outcome of one sample genome.
#[derive(Clone, Debug, Serialize)]
pub struct SampleResult {
    pub strain: String,
    pub genome_length: usize,
    /// The overall lineage assignment, `None` when nothing matched.
    pub lineage: Option<Match>,
    pub recombination: Recombination,
}

impl SampleResult {
    pub fn new(genome: &Genome) -> Self {
        SampleResult {
            strain: genome.id.clone(),
            genome_length: genome.genome_length,
            lineage: None,
            recombination: Recombination::new(),
        }
    }
}

// ----------------------------------------------------------------------------
// Run
// ----------------------------------------------------------------------------

/// Run recombination detection on all input genomes.
pub fn run(args: &mut cli::run::Args) -> Result<(), Report> {
    if !args.output_dir.exists() {
        info!("Creating output directory: {:?}", &args.output_dir);
        create_dir_all(&args.output_dir)?;
    } else {
        warn!("Output directory already exists: {:?}", args.output_dir);
    }

    // ------------------------------------------------------------------------
    // Threads

    // check how many threads are available on the system
    let default_thread_pool =
        rayon::ThreadPoolBuilder::new().build().wrap_err("Failed to build thread pool.")?;
    let available_threads = default_thread_pool.current_num_threads();
    info!("Number of threads available: {available_threads}");

    if args.threads > available_threads {
        warn!("--threads {} is greater than the available threads.", args.threads);
        args.threads = available_threads;
    }
    // debug verbosity interleaves the worker logs unreadably
    if log::log_enabled!(log::Level::Debug) && args.threads > 1 {
        warn!("Debug verbosity is incompatible with multiple threads, using 1.");
        args.threads = 1;
    }

    info!("Using {} thread(s).", args.threads);
    let result =
        rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global();

    // the global thread pool might fail if it has already been initialized,
    // we've seen this in integration tests and unittests
    if result.is_err() {
        warn!("Failed to build global thread pool.");
    }

    // ------------------------------------------------------------------------
    // Export CLI args

    let path = args.output_dir.join("run_args.json");
    info!("Exporting run args: {path:?}");

    let mut file =
        File::create(&path).wrap_err_with(|| format!("Failed to create file: {path:?}"))?;
    let output = serde_json::to_string_pretty(args).wrap_err("Failed to serialize run args.")?;
    file.write_all(format!("{}\n", output).as_bytes())
        .wrap_err_with(|| format!("Failed to write file: {path:?}"))?;

    // ------------------------------------------------------------------------
    // Dataset

    let dataset = dataset::load(args)?;

    // ------------------------------------------------------------------------
    // Input Genomes

    info!("Loading genome records: {:?}", args.input);
    let table = Table::read(&args.input)?;

    let mut genomes = Vec::new();
    for row in &table.rows {
        match Genome::from_row(&table, row, args.genome_length, &dataset.barcodes) {
            Ok(genome) => genomes.push(genome),
            // a malformed record never aborts the batch
            Err(e) => warn!("Skipping genome record: {e}"),
        }
    }
    info!("Loaded {} genome(s).", genomes.len());

    // args mutations are finished, workers share it read-only
    let args: &cli::run::Args = args;

    // ------------------------------------------------------------------------
    // Linelist

    let linelist_path = args.output_dir.join("linelist.tsv");
    info!("Initializing linelist: {linelist_path:?}");

    let linelist_delim = utils::path_to_delim(&linelist_path)?.to_string();
    let headers = export::linelist_headers();
    let line = format!("{}\n", headers.join(&linelist_delim));
    let mut file = File::create(&linelist_path)?;
    file.write_all(line.as_bytes())?;

    // append to linelist progressively, use Mutex lock for parallel access
    let linelist_file = OpenOptions::new().append(true).open(linelist_path)?;
    let linelist_file = Mutex::new(linelist_file);

    // ------------------------------------------------------------------------
    // Detect Recombination

    info!("Detecting recombination.");

    let progress_bar_style = ProgressStyle::with_template(
        "{bar:40} {pos}/{len} ({percent}%) | Samples / Second: {per_sec} | Elapsed: {elapsed_precise}"
    ).wrap_err("Failed to create progress bar from template.")?;
    let progress_bar = ProgressBar::new(genomes.len() as u64);
    progress_bar.set_style(progress_bar_style);

    let results = genomes
        .par_iter()
        .map(|genome| {
            let result = match search(genome, &dataset, args) {
                Ok(result) => result,
                // an analysis failure becomes a negative result
                Err(e) => {
                    warn!("{genome}: analysis failed: {e}");
                    SampleResult::new(genome)
                }
            };

            // append to linelist
            let row = export::linelist_row(&result);
            let line = format!("{}\n", row.join(&linelist_delim));
            linelist_file.lock().unwrap().write_all(line.as_bytes())?;

            progress_bar.inc(1);
            Ok(result)
        })
        .collect::<Result<Vec<_>, Report>>()?;

    progress_bar.finish();

    // ------------------------------------------------------------------------
    // Export Summary

    let summary_path = args.output_dir.join("summary.yaml");
    info!("Exporting summary: {summary_path:?}");
    export::write_summary(&results, &summary_path)?;

    // ------------------------------------------------------------------------
    // Export Barcode Tables

    let detections = results.iter().filter(|r| r.recombination.is_detected()).collect_vec();
    if detections.is_empty() {
        warn!("No recombination detected, no barcode tables will be outputted.");
    } else {
        let outdir_barcodes = args.output_dir.join("barcodes");
        info!("Exporting barcode tables: {outdir_barcodes:?}");
        create_dir_all(&outdir_barcodes)?;

        for result in detections {
            let file_name = format!("{}.tsv", result.strain.replace('/', "_"));
            result.recombination.write_tsv(&outdir_barcodes.join(file_name))?;
        }
    }

    info!("Done.");
    Ok(())
}

// ----------------------------------------------------------------------------
// Search
// ----------------------------------------------------------------------------

/// Analyze one genome: lineage assignment, parent searches and
/// recombination detection.
pub fn search(
    genome: &Genome,
    dataset: &Dataset,
    args: &cli::run::Args,
) -> Result<SampleResult, Report> {
    let mut result = SampleResult::new(genome);

    // ------------------------------------------------------------------------
    // Lineage Assignment

    // the best match over all lineages, recombinants included
    let Some(mut primary) = barcode::search(genome, &genome.barcode_summary, dataset)?
    else {
        warn!("{genome}: no barcode matches found.");
        return Ok(result);
    };
    barcode::set_recombinant_status(&mut primary, dataset)?;

    if log::log_enabled!(log::Level::Debug) {
        debug!("{genome}: lineage assignment:\n{}", primary.to_yaml()?);
    }

    // a perfect match to a non-recombinant lineage ends the analysis
    if primary.recombinant == RecombinantStatus::NotRecombinant {
        result.lineage = Some(primary);
        return Ok(result);
    }

    // ------------------------------------------------------------------------
    // Edge Cases

    // parents are searched among the non-recombinant lineages
    let base_summary = genome.barcode_summary.exclude(&dataset.recombinant_lineages);
    let mut summary_1 = base_summary.clone();
    let mut summary_2 = base_summary;
    let mut search_args = args.clone();

    let group = primary.recombinant.group().map(String::from);
    if let Some(group) = group {
        if let Some(edge_case) = edge_cases::find(&dataset.edge_cases, &group) {
            debug!("{genome}: applying {group} edge case: {edge_case:?}");
            search_args = edge_case.apply(&search_args);

            // narrowing exists to steer the parent_1 choice, exclusions
            // apply to both parent searches
            if let Some(ancestor) = &edge_case.include_descendants {
                let descendants = dataset.phylogeny.get_descendants(ancestor)?;
                summary_1 = summary_1.retain(&descendants);
            }
            if let Some(ancestor) = &edge_case.exclude_descendants {
                let descendants = dataset.phylogeny.get_descendants(ancestor)?;
                summary_1 = summary_1.exclude(&descendants);
                summary_2 = summary_2.exclude(&descendants);
            }

            primary.edge_case = true;
        }
    }

    // ------------------------------------------------------------------------
    // Parent 1

    let Some(parent_1) = barcode::search(genome, &summary_1, dataset)? else {
        debug!("{genome}: no parent_1 candidates.");
        result.lineage = Some(primary);
        return Ok(result);
    };
    // parent_1 explains every barcode sub, nothing left for a second parent
    if parent_1.conflict_ref.is_empty() {
        debug!("{genome}: parent {} has no conflicts, not a recombinant.", parent_1.lineage);
        result.lineage = Some(primary);
        return Ok(result);
    }

    // ------------------------------------------------------------------------
    // Parent 2

    let summary_2 = summary_2.exclude(&parent_1.top_lineages);
    let Some(parent_2) = barcode::search(genome, &summary_2, dataset)? else {
        debug!("{genome}: no parent_2 candidates.");
        result.lineage = Some(primary);
        return Ok(result);
    };

    // ------------------------------------------------------------------------
    // Recombination

    match recombination::detect(genome, &parent_1, &parent_2, &search_args)? {
        Some(recombination) => result.recombination = recombination,
        None => debug!("{genome}: no recombination detected."),
    }

    result.lineage = Some(primary);
    Ok(result)
}
