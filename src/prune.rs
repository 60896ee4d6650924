//! Fixed-point pruning of unproductive leaf lineages.
//!
//! A non-root lineage is removed when it has no offspring left in the table
//! and its `tot_orgs` is below the cutoff. Removing a leaf can turn its parent
//! into a leaf, so removal runs in rounds: every round drops the current
//! candidates, decrements each surviving parent once per removed child, and
//! re-evaluates. The loop ends on the first round with no candidates.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::{Cutoff, LineageRow, PhylogenyTables};

/// Set `total_offspring` on every row to the number of other rows naming it as parent.
pub fn count_offspring(rows: &mut [LineageRow]) {
    let mut counts: HashMap<u64, i64> = HashMap::new();
    for row in rows.iter().filter(|r| r.parent_id != r.child_id) {
        *counts.entry(row.parent_id).or_insert(0) += 1;
    }
    for row in rows.iter_mut() {
        row.total_offspring = counts.get(&row.child_id).copied().unwrap_or(0);
    }
}

/// Summary of one pruning run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Removal rounds that dropped at least one lineage.
    pub rounds: usize,
    /// Lineages dropped in total.
    pub removed: usize,
}

/// Working set of lineages keyed by `child_id`.
pub struct Pruner {
    cutoff: Cutoff,
    lineages: BTreeMap<u64, LineageRow>,
    tables: PhylogenyTables,
}

impl Pruner {
    /// Takes ownership of the merged tables; offspring counts are recomputed
    /// here, so whatever the rows carried before is ignored.
    pub fn new(mut tables: PhylogenyTables, cutoff: Cutoff) -> Self {
        count_offspring(&mut tables.lineages);
        let lineages = std::mem::take(&mut tables.lineages)
            .into_iter()
            .map(|row| (row.child_id, row))
            .collect();
        Self {
            cutoff,
            lineages,
            tables,
        }
    }

    fn is_removal_candidate(&self, row: &LineageRow) -> bool {
        row.total_offspring <= 0 && row.total_organism_count < self.cutoff.get() && !row.is_root()
    }

    fn is_retained(&self, row: &LineageRow) -> bool {
        row.is_root() || row.total_offspring > 0 || row.total_organism_count >= self.cutoff.get()
    }

    /// One removal round. Returns how many lineages were dropped.
    fn remove_round(&mut self) -> usize {
        let removal: Vec<u64> = self
            .lineages
            .values()
            .filter(|row| self.is_removal_candidate(row))
            .map(|row| row.child_id)
            .collect();

        let parents: Vec<(u64, u64)> = removal
            .iter()
            .filter_map(|id| self.lineages.remove(id))
            .map(|row| (row.child_id, row.parent_id))
            .collect();

        // Parents removed in this same round have nothing left to decrement.
        for (child, parent_id) in parents {
            if parent_id == child {
                continue;
            }
            match self.lineages.get_mut(&parent_id) {
                Some(parent) => {
                    if parent.total_offspring <= 0 {
                        warn!(
                            parent = parent_id,
                            child,
                            offspring = parent.total_offspring,
                            "offspring count would go negative"
                        );
                        debug_assert!(
                            parent.total_offspring > 0,
                            "lineage {parent_id} lost child {child} with no offspring recorded"
                        );
                    }
                    parent.total_offspring -= 1;
                }
                None => {
                    warn!(parent = parent_id, child, "removed lineage has no parent row");
                }
            }
        }
        removal.len()
    }

    /// Prune to a fixed point and restrict the size table to the survivors.
    pub fn run(mut self) -> (PhylogenyTables, PruneReport) {
        let mut report = PruneReport::default();
        loop {
            let removed = self.remove_round();
            if removed == 0 {
                break;
            }
            report.rounds += 1;
            report.removed += removed;
            debug!(
                round = report.rounds,
                removed,
                remaining = self.lineages.len(),
                "pruning round"
            );
        }

        let survivors: Vec<LineageRow> = self
            .lineages
            .values()
            .filter(|row| self.is_retained(row))
            .cloned()
            .collect();
        report.removed += self.lineages.len() - survivors.len();

        let mut tables = self.tables;
        tables
            .observations
            .retain(|obs| survivors.binary_search_by_key(&obs.lineage_id, |r| r.child_id).is_ok());
        tables.lineages = survivors;
        (tables, report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::PopulationObservation;

    fn row(child_id: u64, parent_id: u64, tot_orgs: u64) -> LineageRow {
        LineageRow {
            child_id,
            parent_id,
            origin_time: 0.0,
            destruction_time: None,
            info: String::new(),
            total_organism_count: tot_orgs,
            total_offspring: 0,
        }
    }

    fn obs(lineage_id: u64, time: i64) -> PopulationObservation {
        PopulationObservation {
            lineage_id,
            time,
            population: 1,
            info: String::new(),
        }
    }

    fn prune(rows: Vec<LineageRow>, cutoff: u64) -> (PhylogenyTables, PruneReport) {
        let observations = rows.iter().map(|r| obs(r.child_id, 1)).collect();
        let tables = PhylogenyTables {
            lineages: rows,
            observations,
        };
        Pruner::new(tables, Cutoff::new(cutoff as i64).unwrap()).run()
    }

    fn ids(tables: &PhylogenyTables) -> Vec<u64> {
        tables.lineages.iter().map(|r| r.child_id).collect()
    }

    #[test]
    fn counts_direct_children_only() {
        let mut rows = vec![row(1, 0, 1), row(2, 1, 1), row(3, 1, 1), row(4, 2, 1), row(5, 5, 1)];
        count_offspring(&mut rows);
        let counts: Vec<i64> = rows.iter().map(|r| r.total_offspring).collect();
        assert_eq!(counts, vec![2, 1, 0, 0, 0]);
    }

    #[test]
    fn cascade_removes_chain_down_to_root() {
        let (tables, report) = prune(vec![row(1, 0, 1000), row(2, 1, 10), row(3, 2, 5)], 500);
        assert_eq!(ids(&tables), vec![1]);
        assert_eq!(tables.lineages[0].total_offspring, 0);
        assert_eq!(report.rounds, 2);
        assert_eq!(report.removed, 2);
        assert_eq!(tables.observations, vec![obs(1, 1)]);
    }

    #[test]
    fn large_lineages_need_no_rounds() {
        let (tables, report) = prune(vec![row(1, 0, 1000), row(2, 1, 600)], 500);
        assert_eq!(ids(&tables), vec![1, 2]);
        assert_eq!(report, PruneReport::default());
        assert_eq!(tables.lineages[0].total_offspring, 1);
    }

    #[test]
    fn cutoff_boundary_is_inclusive() {
        let (tables, _) = prune(vec![row(1, 0, 1), row(2, 1, 500), row(3, 1, 499)], 500);
        assert_eq!(ids(&tables), vec![1, 2]);
    }

    #[test]
    fn small_root_survives() {
        let (tables, _) = prune(vec![row(1, 0, 1), row(2, 0, 0)], 500);
        assert_eq!(ids(&tables), vec![1, 2]);
    }

    #[test]
    fn productive_small_lineage_is_kept() {
        // 2 is small but its child 3 clears the cutoff.
        let (tables, _) = prune(vec![row(1, 0, 1000), row(2, 1, 3), row(3, 2, 800), row(4, 2, 1)], 500);
        assert_eq!(ids(&tables), vec![1, 2, 3]);
        assert_eq!(tables.lineages[1].total_offspring, 1);
    }

    #[test]
    fn siblings_removed_in_one_round_decrement_once_each() {
        let (tables, report) = prune(
            vec![row(1, 0, 1000), row(2, 1, 10), row(3, 2, 1), row(4, 2, 1), row(5, 2, 1)],
            500,
        );
        assert_eq!(ids(&tables), vec![1]);
        assert_eq!(report.rounds, 2);
        assert_eq!(report.removed, 4);
    }

    #[test]
    fn dangling_parent_does_not_panic() {
        let (tables, _) = prune(vec![row(1, 0, 1000), row(7, 99, 1)], 500);
        assert_eq!(ids(&tables), vec![1]);
    }

    #[test]
    fn stale_offspring_counts_are_recomputed() {
        let mut stale = row(2, 1, 1);
        stale.total_offspring = 10;
        let (tables, _) = prune(vec![row(1, 0, 1000), stale], 500);
        assert_eq!(ids(&tables), vec![1]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "lost child 3 with no offspring recorded")]
    fn decrement_below_zero_is_caught() {
        let tables = PhylogenyTables {
            lineages: vec![row(1, 0, 1000), row(2, 1, 1000), row(3, 2, 1)],
            observations: vec![],
        };
        let mut pruner = Pruner::new(tables, Cutoff::new(500).unwrap());
        // Lineage 2 still has child 3 but claims it has none.
        if let Some(parent) = pruner.lineages.get_mut(&2) {
            parent.total_offspring = 0;
        }
        pruner.remove_round();
    }

    #[test]
    fn consistent_counts_never_go_negative_mid_run() {
        let tables = PhylogenyTables {
            lineages: vec![row(1, 0, 1000), row(2, 1, 10), row(3, 2, 5), row(4, 2, 5)],
            observations: vec![],
        };
        let mut pruner = Pruner::new(tables, Cutoff::new(500).unwrap());
        while pruner.remove_round() > 0 {
            assert!(pruner.lineages.values().all(|r| r.total_offspring >= 0));
        }
        assert_eq!(pruner.lineages.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    // ── Properties ────────────────────────────────────────────────────────────

    /// Random forest: lineage `i` (1-based) points at an earlier lineage or is a root.
    fn arb_forest() -> impl Strategy<Value = Vec<LineageRow>> {
        prop::collection::vec((any::<prop::sample::Index>(), prop::bool::weighted(0.15), 0u64..1200), 1..60)
            .prop_map(|picks| {
                picks
                    .into_iter()
                    .enumerate()
                    .map(|(i, (pick, is_root, tot_orgs))| {
                        let id = i as u64 + 1;
                        let parent = if i == 0 || is_root { 0 } else { pick.index(i) as u64 + 1 };
                        row(id, parent, tot_orgs)
                    })
                    .collect()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_pruning_is_idempotent(rows in arb_forest(), cutoff in 0u64..1200) {
            let (once, _) = prune(rows, cutoff);
            let again = Pruner::new(once.clone(), Cutoff::new(cutoff as i64).unwrap()).run();
            prop_assert_eq!(&again.0, &once);
            prop_assert_eq!(again.1, PruneReport::default());
        }

        #[test]
        fn prop_higher_cutoff_never_keeps_more(rows in arb_forest(), a in 0u64..1200, b in 0u64..1200) {
            let (low, high) = (a.min(b), a.max(b));
            let (kept_low, _) = prune(rows.clone(), low);
            let (kept_high, _) = prune(rows, high);
            prop_assert!(kept_high.lineages.len() <= kept_low.lineages.len());
        }

        #[test]
        fn prop_roots_always_survive(rows in arb_forest(), cutoff in 0u64..1200) {
            let roots: Vec<u64> = rows.iter().filter(|r| r.is_root()).map(|r| r.child_id).collect();
            let (tables, _) = prune(rows, cutoff);
            let kept: HashSet<u64> = ids(&tables).into_iter().collect();
            for root in roots {
                prop_assert!(kept.contains(&root));
            }
        }

        #[test]
        fn prop_offspring_counts_match_survivors(rows in arb_forest(), cutoff in 0u64..1200) {
            let (tables, _) = prune(rows, cutoff);
            for r in &tables.lineages {
                let children = tables.lineages.iter().filter(|c| c.parent_id == r.child_id).count();
                prop_assert_eq!(r.total_offspring, children as i64);
                prop_assert!(r.is_root() || r.total_offspring > 0 || r.total_organism_count >= cutoff);
            }
        }

        #[test]
        fn prop_observations_follow_lineages(rows in arb_forest(), cutoff in 0u64..1200) {
            let (tables, _) = prune(rows, cutoff);
            let kept: Vec<u64> = ids(&tables);
            let observed: Vec<u64> = tables.observations.iter().map(|o| o.lineage_id).collect();
            prop_assert_eq!(observed, kept);
        }

        #[test]
        fn prop_surviving_parents_are_present(rows in arb_forest(), cutoff in 0u64..1200) {
            let (tables, _) = prune(rows, cutoff);
            let kept: HashSet<u64> = ids(&tables).into_iter().collect();
            for r in &tables.lineages {
                prop_assert!(r.is_root() || kept.contains(&r.parent_id));
            }
        }
    }
}
