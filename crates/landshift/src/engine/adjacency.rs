//! Neighborhood attribute averages feeding the adjacency multipliers.
use std::collections::BTreeMap;

use crate::grid::{CellId, Landscape, TransitionGroupId};
use crate::rules::RuleSet;

/// Per-group, per-cell averages of a state attribute over the cell and
/// its 8-neighborhood. Cells whose neighborhood carries no value hold
/// NaN, reported as `None`.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyCache {
    values: BTreeMap<TransitionGroupId, Vec<f64>>,
}

impl AdjacencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes the averages for every group whose update frequency is
    /// due at this timestep (and for groups never computed yet).
    pub fn refresh(
        &mut self,
        landscape: &Landscape,
        rules: &RuleSet,
        timestep: i32,
        min_timestep: i32,
    ) {
        for (group_id, setting) in &rules.adjacency_settings {
            let due = !self.values.contains_key(group_id)
                || (timestep - min_timestep) % setting.update_frequency == 0;
            if !due {
                continue;
            }

            let mut averages = vec![f64::NAN; landscape.topology().n_cells()];
            for cell in landscape.cells() {
                let mut sum = 0.0;
                let mut count = 0usize;
                if let Some(v) = rules.state_attributes.value(setting.attribute_type_id, cell) {
                    sum += v;
                    count += 1;
                }
                for neighbor_id in landscape.neighbors(cell.id) {
                    let neighbor = landscape
                        .cell(neighbor_id)
                        .expect("neighbors returns instantiated cells");
                    if let Some(v) = rules.state_attributes.value(setting.attribute_type_id, neighbor)
                    {
                        sum += v;
                        count += 1;
                    }
                }
                if count > 0 {
                    averages[cell.id] = sum / count as f64;
                }
            }
            self.values.insert(*group_id, averages);
        }
    }

    /// Neighborhood average for a cell, if the group has one computed.
    pub fn value(&self, group_id: TransitionGroupId, cell_id: CellId) -> Option<f64> {
        self.values
            .get(&group_id)
            .and_then(|v| v.get(cell_id))
            .copied()
            .filter(|v| !v.is_nan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Cell, GridTopology};
    use crate::rules::{
        Definitions, StateAttributeValue, TransitionAdjacencySetting,
    };

    fn landscape_2x2() -> Landscape {
        let mut landscape = Landscape::new(GridTopology::new(2, 2, 1.0), 1.0);
        for id in 0..4 {
            let state_class = if id == 0 { 1 } else { 2 };
            landscape.insert_cell(Cell::new(id, 1, state_class));
        }
        landscape
    }

    #[test]
    fn averages_cover_cell_and_neighbors() {
        let landscape = landscape_2x2();
        let mut rules = RuleSet::new(Definitions::new());
        rules.add_adjacency_setting(TransitionAdjacencySetting::new(10, 100));
        // State class 1 carries 1.0, state class 2 carries 0.0.
        rules.state_attributes.add(StateAttributeValue {
            attribute_type_id: 100,
            stratum_id: None,
            state_class_id: Some(1),
            value: 1.0,
        });
        rules.state_attributes.add(StateAttributeValue {
            attribute_type_id: 100,
            stratum_id: None,
            state_class_id: Some(2),
            value: 0.0,
        });

        let mut cache = AdjacencyCache::new();
        cache.refresh(&landscape, &rules, 0, 0);

        // Every cell's neighborhood is the whole 2x2 grid: mean 0.25.
        for id in 0..4 {
            let v = cache.value(10, id).unwrap();
            assert!((v - 0.25).abs() < 1e-12, "cell {id}: {v}");
        }
        assert!(cache.value(99, 0).is_none());
    }

    #[test]
    fn cells_without_values_report_none() {
        let landscape = landscape_2x2();
        let mut rules = RuleSet::new(Definitions::new());
        rules.add_adjacency_setting(TransitionAdjacencySetting::new(10, 100));

        let mut cache = AdjacencyCache::new();
        cache.refresh(&landscape, &rules, 0, 0);
        assert!(cache.value(10, 0).is_none());
    }

    #[test]
    fn update_frequency_skips_off_cycle_timesteps() {
        let landscape = landscape_2x2();
        let mut rules = RuleSet::new(Definitions::new());
        rules.add_adjacency_setting(
            TransitionAdjacencySetting::new(10, 100).with_update_frequency(5),
        );
        rules.state_attributes.add(StateAttributeValue {
            attribute_type_id: 100,
            stratum_id: None,
            state_class_id: None,
            value: 2.0,
        });

        let mut cache = AdjacencyCache::new();
        // First refresh always computes.
        cache.refresh(&landscape, &rules, 1, 0);
        assert!(cache.value(10, 0).is_some());

        // Emptying the attribute table and refreshing off-cycle leaves the
        // cached values in place.
        let stale = cache.value(10, 0).unwrap();
        rules.state_attributes = crate::rules::StateAttributeTable::new();
        cache.refresh(&landscape, &rules, 2, 0);
        assert_eq!(cache.value(10, 0), Some(stale));

        // On-cycle refresh recomputes (now empty).
        cache.refresh(&landscape, &rules, 5, 0);
        assert!(cache.value(10, 0).is_none());
    }
}
