pub mod ancestry;
pub mod error;
pub mod io;
pub mod merge;
pub mod prune;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use error::{AggError, Result};
pub use merge::merge;
pub use prune::{PruneReport, Pruner};

// ── Parameters ────────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct Parameters {
    /// Minimum `tot_orgs` a lineage without surviving offspring needs to be kept.
    pub cutoff: i64,
    /// Regex searched in each snapshot file name; the first match is the time step.
    pub time_regex: String,
    /// Prefix for the `_edges.csv` and `_sizes.csv` outputs.
    pub output_file_root: String,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            cutoff: 500,
            time_regex: "[0-9]+".to_string(),
            output_file_root: "all_phylogeny".to_string(),
        }
    }
}

/// A validated, non-negative population cutoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cutoff(u64);

impl Cutoff {
    pub fn new(value: i64) -> Result<Self> {
        u64::try_from(value)
            .map(Self)
            .map_err(|_| AggError::Cutoff(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

// ── Snapshot input ────────────────────────────────────────────────────────────

/// One row of a per-timestep phylogeny snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(rename = "id")]
    pub lineage_id: u64,
    pub ancestor_list: String,
    pub origin_time: f64,
    /// Empty while the lineage is still alive at snapshot time.
    pub destruction_time: Option<f64>,
    /// Population at the snapshot's time step.
    #[serde(rename = "num_orgs")]
    pub current_population: u64,
    /// Organisms ever belonging to the lineage up to this snapshot.
    #[serde(rename = "tot_orgs")]
    pub total_organism_count: u64,
    pub info: String,
}

/// All records of one snapshot file together with the time step parsed from its name.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotBatch {
    pub time: i64,
    pub records: Vec<SnapshotRecord>,
}

impl SnapshotBatch {
    pub fn new(time: i64, records: Vec<SnapshotRecord>) -> Self {
        Self { time, records }
    }
}

// ── Consolidated tables ───────────────────────────────────────────────────────

/// One lineage and its edge to its parent.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineageRow {
    #[serde(rename = "ChildId")]
    pub child_id: u64,
    /// [`ancestry::ROOT_PARENT`] for roots.
    #[serde(rename = "ParentId")]
    pub parent_id: u64,
    pub origin_time: f64,
    /// Earliest destruction time recorded by any snapshot.
    pub destruction_time: Option<f64>,
    pub info: String,
    #[serde(rename = "tot_orgs")]
    pub total_organism_count: u64,
    /// Number of rows currently in the table whose parent is this lineage.
    pub total_offspring: i64,
}

impl LineageRow {
    pub fn is_root(&self) -> bool {
        self.parent_id == ancestry::ROOT_PARENT
    }
}

/// Population of one lineage at one time step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PopulationObservation {
    #[serde(rename = "Id")]
    pub lineage_id: u64,
    #[serde(rename = "Step")]
    pub time: i64,
    #[serde(rename = "Pop")]
    pub population: u64,
    pub info: String,
}

/// Edge table sorted by `child_id`, size table sorted by `(lineage_id, time)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhylogenyTables {
    pub lineages: Vec<LineageRow>,
    pub observations: Vec<PopulationObservation>,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Merge the snapshot batches and prune lineages that stayed below the cutoff.
///
/// The cutoff is checked before any merging takes place.
pub fn aggregate(
    batches: &[SnapshotBatch],
    params: &Parameters,
) -> Result<(PhylogenyTables, PruneReport)> {
    let cutoff = Cutoff::new(params.cutoff)?;
    let merged = merge(batches)?;
    info!(
        batches = batches.len(),
        lineages = merged.lineages.len(),
        observations = merged.observations.len(),
        "merged snapshots"
    );
    let (pruned, report) = Pruner::new(merged, cutoff).run();
    info!(
        rounds = report.rounds,
        removed = report.removed,
        retained = pruned.lineages.len(),
        observations = pruned.observations.len(),
        "pruned phylogeny"
    );
    Ok((pruned, report))
}
