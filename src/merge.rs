//! Consolidation of snapshot batches into one edge table and one size table.
//!
//! Rows describing the same lineage in different snapshots are folded
//! together: the first snapshot wins for `ancestor_list`, `origin_time` and
//! `info`, the smallest recorded `destruction_time` wins, and the largest
//! `tot_orgs` wins. Batches are folded in the order given.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use tracing::debug;

use crate::ancestry::decode_ancestor_list;
use crate::error::{AggError, Result};
use crate::{LineageRow, PhylogenyTables, PopulationObservation, SnapshotBatch, SnapshotRecord};

/// Running fold of every record seen for one lineage id.
struct LineageAccumulator {
    ancestor_list: String,
    origin_time: f64,
    destruction_time: Option<f64>,
    info: String,
    total_organism_count: u64,
}

impl LineageAccumulator {
    fn new(record: &SnapshotRecord) -> Self {
        Self {
            ancestor_list: record.ancestor_list.clone(),
            origin_time: record.origin_time,
            destruction_time: known_time(record.destruction_time),
            info: record.info.clone(),
            total_organism_count: record.total_organism_count,
        }
    }

    fn absorb(&mut self, record: &SnapshotRecord) {
        self.destruction_time = match (self.destruction_time, known_time(record.destruction_time)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.total_organism_count = self.total_organism_count.max(record.total_organism_count);
    }

    fn into_row(self, child_id: u64) -> Result<LineageRow> {
        let parent_id = decode_ancestor_list(&self.ancestor_list)
            .map_err(|e| AggError::Input(format!("lineage {child_id}: {e}")))?;
        Ok(LineageRow {
            child_id,
            parent_id,
            origin_time: self.origin_time,
            destruction_time: self.destruction_time,
            info: self.info,
            total_organism_count: self.total_organism_count,
            total_offspring: 0,
        })
    }
}

/// NaN is treated like an empty field.
fn known_time(t: Option<f64>) -> Option<f64> {
    t.filter(|v| !v.is_nan())
}

/// Fold all batches into a [`PhylogenyTables`].
///
/// `total_offspring` is left at 0; [`Pruner::new`](crate::Pruner::new) counts
/// offspring on the rows it is handed.
///
/// Fails with [`AggError::Input`] when `batches` is empty or an ancestor list
/// cannot be decoded.
pub fn merge(batches: &[SnapshotBatch]) -> Result<PhylogenyTables> {
    if batches.is_empty() {
        return Err(AggError::Input("no snapshot batches to merge".to_string()));
    }

    let mut lineages: BTreeMap<u64, LineageAccumulator> = BTreeMap::new();
    let mut observations: BTreeMap<(u64, i64), PopulationObservation> = BTreeMap::new();

    for batch in batches {
        for record in &batch.records {
            match lineages.entry(record.lineage_id) {
                Entry::Vacant(slot) => {
                    slot.insert(LineageAccumulator::new(record));
                }
                Entry::Occupied(mut slot) => slot.get_mut().absorb(record),
            }

            match observations.entry((record.lineage_id, batch.time)) {
                Entry::Vacant(slot) => {
                    slot.insert(PopulationObservation {
                        lineage_id: record.lineage_id,
                        time: batch.time,
                        population: record.current_population,
                        info: record.info.clone(),
                    });
                }
                Entry::Occupied(_) => {
                    debug!(
                        lineage = record.lineage_id,
                        time = batch.time,
                        "duplicate observation, keeping the first"
                    );
                }
            }
        }
    }

    let rows = lineages
        .into_iter()
        .map(|(id, acc)| acc.into_row(id))
        .collect::<Result<Vec<_>>>()?;

    Ok(PhylogenyTables {
        lineages: rows,
        observations: observations.into_values().collect(),
    })
}
