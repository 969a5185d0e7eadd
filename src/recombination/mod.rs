use crate::barcode::Match;
use crate::cli;
use crate::sequence::{Genome, Substitution};
use crate::utils::Table;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

// ----------------------------------------------------------------------------
// Breakpoint
// ----------------------------------------------------------------------------

/// Recombination breakpoint interval, exclusive of the flanking regions.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Breakpoint {
    pub start: usize,
    pub end: usize,
}

impl std::fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for Breakpoint {
    type Err = Report;

    fn from_str(text: &str) -> Result<Self, Report> {
        let (start, end) = text
            .split(':')
            .collect_tuple()
            .ok_or_else(|| eyre!("Breakpoint is not in the form <start>:<end>: {text}"))?;
        let start = start.parse().wrap_err_with(|| eyre!("Breakpoint is not numeric: {text}"))?;
        let end = end.parse().wrap_err_with(|| eyre!("Breakpoint is not numeric: {text}"))?;

        Ok(Breakpoint { start, end })
    }
}

// ----------------------------------------------------------------------------
// Direction
// ----------------------------------------------------------------------------

/// Genomic reading direction, forward (5' -> 3') or reverse (3' -> 5').
pub enum Direction {
    Forward,
    Reverse,
}

// ----------------------------------------------------------------------------
// Region
// ----------------------------------------------------------------------------

/// A maximal run of barcode sites inherited from a single parent.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Region {
    pub start: usize,
    pub end: usize,
    pub parent: String,
    #[serde(skip)]
    pub substitutions: Vec<Substitution>,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}-{}|{}", self.start, self.end, self.parent)
    }
}

impl FromStr for Region {
    type Err = Report;

    fn from_str(text: &str) -> Result<Self, Report> {
        let (coords, parent) = text
            .split('|')
            .collect_tuple()
            .ok_or_else(|| eyre!("Region is not in the form <start>-<end>|<parent>: {text}"))?;
        let (start, end) = coords
            .split('-')
            .collect_tuple()
            .ok_or_else(|| eyre!("Region is not in the form <start>-<end>|<parent>: {text}"))?;
        let start = start.parse().wrap_err_with(|| eyre!("Region is not numeric: {text}"))?;
        let end = end.parse().wrap_err_with(|| eyre!("Region is not numeric: {text}"))?;

        Ok(Region {
            start,
            end,
            parent: parent.to_string(),
            substitutions: Vec::new(),
        })
    }
}

// ----------------------------------------------------------------------------
// Recombination
// ----------------------------------------------------------------------------

/// Parental regions and breakpoints detected in one sample genome.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Recombination {
    pub parent_1: Match,
    pub parent_2: Match,
    pub breakpoints: Vec<Breakpoint>,
    pub regions: BTreeMap<usize, Region>,
    pub depth: usize,
    #[serde(skip)]
    pub table: Table,
}

impl Recombination {
    pub fn new() -> Self {
        Recombination::default()
    }

    pub fn is_detected(&self) -> bool {
        !self.breakpoints.is_empty()
    }

    pub fn write_tsv(&self, output_path: &Path) -> Result<(), Report> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(output_path)
            .wrap_err_with(|| format!("Unable to create file: {output_path:?}"))?;

        writer.write_record(&self.table.headers)?;
        for row in &self.table.rows {
            writer.write_record(row)?;
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Search for recombination between two parents in a genome.
///
/// Returns `None` when no recombination passes the filters.
pub fn detect(
    genome: &Genome,
    parent_1: &Match,
    parent_2: &Match,
    args: &cli::run::Args,
) -> Result<Option<Recombination>, Report> {
    if parent_1.lineage == parent_2.lineage {
        debug!("{genome}: parents are the same lineage ({}).", parent_1.lineage);
        return Ok(None);
    }

    // ------------------------------------------------------------------------
    // Joint Table

    let table = joint_table(genome, parent_1, parent_2)?;
    if log::log_enabled!(log::Level::Debug) {
        debug!("{genome}: discriminating sites:\n{}", table.to_markdown()?);
    }

    // each parent must contribute a minimum of unique substitutions
    for (lineage, col_i) in [(&parent_1.lineage, 3), (&parent_2.lineage, 4)] {
        let num_unique = table
            .rows
            .iter()
            .filter(|row| row[1] == *lineage && row[col_i] != row[2])
            .count();
        if num_unique < args.min_subs {
            debug!(
                "{genome}: insufficient unique substitutions ({num_unique}) from parent {lineage}."
            );
            return Ok(None);
        }
    }

    // ------------------------------------------------------------------------
    // Parental Regions

    // identify and filter regions in both reading directions, an
    // asymmetric collapse of an intermission fails the intersection
    let regions = identify_regions(&table)?;

    let regions_5p = filter_regions(&regions, Direction::Forward, args.min_consecutive, 0)?;
    let regions_5p = filter_regions(&regions_5p, Direction::Forward, 0, args.min_length)?;
    debug!("{genome}: regions 5': {}", regions_5p.values().join(", "));

    let regions_3p = filter_regions(&regions, Direction::Reverse, args.min_consecutive, 0)?;
    let regions_3p = filter_regions(&regions_3p, Direction::Reverse, 0, args.min_length)?;
    debug!("{genome}: regions 3': {}", regions_3p.values().join(", "));

    let regions_intersect = intersect_regions(&regions_5p, &regions_3p)?;
    debug!("{genome}: regions intersect: {}", regions_intersect.values().join(", "));

    // a single parental region is not recombination
    if regions_intersect.len() < 2 {
        debug!("{genome}: no breakpoints detected.");
        return Ok(None);
    }

    // ------------------------------------------------------------------------
    // Breakpoints

    let breakpoints = identify_breakpoints(&regions_intersect)?;
    debug!("{genome}: breakpoints: {}", breakpoints.iter().join(", "));

    if breakpoints.len() > args.max_breakpoints {
        debug!(
            "{genome}: number of breakpoints ({}) exceeds the maximum ({}).",
            breakpoints.len(),
            args.max_breakpoints
        );
        return Ok(None);
    }

    Ok(Some(Recombination {
        parent_1: parent_1.clone(),
        parent_2: parent_2.clone(),
        breakpoints,
        regions: regions_intersect,
        depth: 0,
        table,
    }))
}

/// Annotate every discriminating barcode site of the two parents with the
/// base of each parent and of the genome, and the parental origin.
pub fn joint_table(
    genome: &Genome,
    parent_1: &Match,
    parent_2: &Match,
) -> Result<Table, Report> {
    let mut table = Table::new();
    table.headers = vec![
        "coord".to_string(),
        "parent".to_string(),
        "Reference".to_string(),
        parent_1.lineage.clone(),
        parent_2.lineage.clone(),
        genome.id.clone(),
    ];

    let coords = parent_1
        .barcode
        .iter()
        .chain(parent_2.barcode.iter())
        .map(|sub| sub.coord)
        .unique()
        .sorted()
        .collect_vec();

    for coord in coords {
        let parent_1_sub = parent_1.barcode.iter().find(|sub| sub.coord == coord);
        let parent_2_sub = parent_2.barcode.iter().find(|sub| sub.coord == coord);
        let reference = parent_1_sub.or(parent_2_sub).unwrap().reference;

        // a parent shows its alternate base only where the other parent does
        // not carry the identical substitution, multi-allelic sites collapse
        // to one row with both alternates
        let parent_1_base = parent_1_sub
            .filter(|sub| !parent_2.barcode.contains(sub))
            .map(|sub| sub.alt)
            .unwrap_or(reference);
        let parent_2_base = parent_2_sub
            .filter(|sub| !parent_1.barcode.contains(sub))
            .map(|sub| sub.alt)
            .unwrap_or(reference);

        // the site cannot discriminate the parents
        if parent_1_base == parent_2_base {
            continue;
        }

        let genome_base = if genome.missing.contains(&coord) {
            'N'
        } else if genome.deletions.contains(&coord) {
            '-'
        } else {
            genome
                .substitutions
                .iter()
                .find(|sub| sub.coord == coord)
                .map(|sub| sub.alt)
                .unwrap_or(reference)
        };

        // genome-private alleles (and missing or deleted sites) must not
        // drive parent assignment
        let parent = if genome_base == parent_1_base {
            &parent_1.lineage
        } else if genome_base == parent_2_base {
            &parent_2.lineage
        } else {
            continue;
        };

        table.rows.push(vec![
            coord.to_string(),
            parent.clone(),
            reference.to_string(),
            parent_1_base.to_string(),
            parent_2_base.to_string(),
            genome_base.to_string(),
        ]);
    }

    Ok(table)
}

/// Group consecutive table rows sharing a parent into regions.
pub fn identify_regions(table: &Table) -> Result<BTreeMap<usize, Region>, Report> {
    let mut regions = BTreeMap::new();
    let mut parent_prev: Option<String> = None;
    let mut start = 0;

    for row in &table.rows {
        let coord = row[0]
            .parse::<usize>()
            .wrap_err_with(|| eyre!("Table coord is not numeric: {row:?}"))?;
        let parent = row[1].clone();
        let reference = row[2]
            .chars()
            .next()
            .ok_or_else(|| eyre!("Table row has no reference base: {row:?}"))?;
        let alt = row[5]
            .chars()
            .next()
            .ok_or_else(|| eyre!("Table row has no genome base: {row:?}"))?;
        let substitution = Substitution {
            coord,
            reference,
            alt,
        };

        // start of a new region, either first or the parent changes
        if parent_prev.as_ref() != Some(&parent) {
            start = coord;
            let region = Region {
                start,
                end: coord,
                parent: parent.clone(),
                substitutions: vec![substitution],
            };
            regions.insert(start, region);
        }
        // same parent, the region continues
        else {
            let region = regions.get_mut(&start).unwrap();
            region.end = coord;
            region.substitutions.push(substitution);
        }

        parent_prev = Some(parent);
    }

    Ok(regions)
}

/// Filter regions on length and consecutive substitutions, merging
/// same-parent continuations across failed intermissions.
pub fn filter_regions(
    regions: &BTreeMap<usize, Region>,
    direction: Direction,
    min_consecutive: usize,
    min_length: usize,
) -> Result<BTreeMap<usize, Region>, Report> {
    let mut regions_filter: BTreeMap<usize, Region> = BTreeMap::new();
    let mut parent_prev: Option<String> = None;
    let mut start_prev: Option<usize> = None;

    let start_coords = match direction {
        Direction::Forward => regions.keys().collect_vec(),
        Direction::Reverse => regions.keys().rev().collect_vec(),
    };

    for start in start_coords {
        let region = &regions[start];
        let num_consecutive = region.substitutions.len();
        let region_length = (region.end - region.start) + 1;

        // first region, or the parent changes
        if parent_prev.as_ref() != Some(&region.parent) {
            // is the new parental region long enough?
            if num_consecutive >= min_consecutive && region_length >= min_length {
                regions_filter.insert(region.start, region.to_owned());
                parent_prev = Some(region.parent.clone());
                start_prev = Some(region.start);
            }
        }
        // the previous parent continues, the intermission itself failed
        else if let Some(prev) = start_prev {
            match direction {
                // walking forward, extend the previous region
                Direction::Forward => {
                    let region_update = regions_filter.get_mut(&prev).unwrap();
                    region_update.substitutions.extend(region.substitutions.clone());
                    region_update.end = region.end;
                }
                // walking backward, the region is re-keyed by its new start
                Direction::Reverse => {
                    let mut region_new = regions_filter[&prev].to_owned();
                    region_new.substitutions.extend(region.substitutions.clone());
                    region_new.substitutions.sort();
                    region_new.start = region.start;

                    regions_filter.remove(&prev);
                    regions_filter.insert(region.start, region_new);
                    start_prev = Some(region.start);
                }
            }
        }
    }

    Ok(regions_filter)
}

/// Intersect same-parent regions from the two reading directions.
pub fn intersect_regions(
    regions_1: &BTreeMap<usize, Region>,
    regions_2: &BTreeMap<usize, Region>,
) -> Result<BTreeMap<usize, Region>, Report> {
    let mut regions_intersect = BTreeMap::new();

    for region_1 in regions_1.values() {
        for region_2 in regions_2.values() {
            if region_1.parent != region_2.parent {
                continue;
            }

            let substitutions = region_1
                .substitutions
                .iter()
                .filter(|sub| region_2.substitutions.contains(sub))
                .copied()
                .sorted()
                .collect_vec();
            if substitutions.is_empty() {
                continue;
            }

            let start = substitutions.first().unwrap().coord;
            let end = substitutions.last().unwrap().coord;
            let region = Region {
                start,
                end,
                parent: region_1.parent.clone(),
                substitutions,
            };
            regions_intersect.insert(start, region);
        }
    }

    Ok(regions_intersect)
}

/// Extract the breakpoint intervals between consecutive regions.
pub fn identify_breakpoints(
    regions: &BTreeMap<usize, Region>,
) -> Result<Vec<Breakpoint>, Report> {
    let mut breakpoints: Vec<Breakpoint> = Vec::new();
    let mut end_prev: Option<usize> = None;

    for region in regions.values() {
        // breakpoint intervals are exclusive of the flanking regions
        if let Some(end_prev) = end_prev {
            let breakpoint = Breakpoint {
                start: end_prev + 1,
                end: region.start - 1,
            };
            breakpoints.push(breakpoint);
        }

        end_prev = Some(region.end);
    }

    Ok(breakpoints)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
