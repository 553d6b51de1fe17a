//! Per-timestep output buffers: transitioned pixels, attribute amounts,
//! and average transition probabilities.
use std::collections::BTreeMap;

use crate::grid::{
    AttributeTypeId, CellId, TransitionGroupId, TransitionTypeId, DEFAULT_NO_DATA_VALUE,
};
use crate::rules::RuleSet;

/// Which output buffers a run maintains.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Record per-group transitioned-pixel arrays each timestep.
    pub raster_transitions: bool,
    /// Record per-attribute amount arrays each timestep.
    pub raster_attributes: bool,
    /// Accumulate per-group average transition probabilities.
    pub average_probability: bool,
    /// Timestep period at which average-probability snapshots are taken.
    pub average_probability_frequency: i32,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            raster_transitions: false,
            raster_attributes: false,
            average_probability: false,
            average_probability_frequency: 1,
        }
    }
}

impl OutputOptions {
    pub fn all() -> Self {
        Self {
            raster_transitions: true,
            raster_attributes: true,
            average_probability: true,
            average_probability_frequency: 1,
        }
    }
}

/// Buffers produced by one timestep.
///
/// Arrays are only allocated for enabled outputs; a disabled output leaves
/// its map empty.
#[derive(Debug, Clone, Default)]
pub struct TimestepOutput {
    /// Per-group transition-type map ids, no-data where nothing
    /// transitioned.
    pub transitioned_pixels: BTreeMap<TransitionGroupId, Vec<i32>>,
    /// Per-attribute accumulated amounts, no-data where nothing accrued.
    pub attribute_values: BTreeMap<AttributeTypeId, Vec<f64>>,
    /// Average-probability snapshot, present on snapshot timesteps only.
    pub average_probabilities: Option<BTreeMap<TransitionGroupId, Vec<f64>>>,
    /// Number of cells that transitioned this timestep.
    pub transitioned_cells: usize,
}

impl TimestepOutput {
    /// Allocates buffers according to the options. Transitioned-pixel
    /// arrays exist for every group with primary types; attribute arrays
    /// for every attribute type tied to some group.
    pub fn allocate(options: &OutputOptions, rules: &RuleSet, n_cells: usize) -> Self {
        let mut output = TimestepOutput::default();

        if options.raster_transitions {
            for group in rules.definitions.transition_groups() {
                if group.primary_transition_types.is_empty() {
                    continue;
                }
                output
                    .transitioned_pixels
                    .insert(group.id, vec![DEFAULT_NO_DATA_VALUE; n_cells]);
            }
        }

        if options.raster_attributes {
            let mut attribute_types: Vec<AttributeTypeId> = rules
                .definitions
                .transition_groups()
                .flat_map(|g| rules.transition_attributes.attribute_types_for_group(g.id))
                .collect();
            attribute_types.sort_unstable();
            attribute_types.dedup();
            for attr in attribute_types {
                output
                    .attribute_values
                    .insert(attr, vec![f64::from(DEFAULT_NO_DATA_VALUE); n_cells]);
            }
        }

        output
    }

    /// Records a committed transition in the group's pixel array.
    pub fn record_transition(
        &mut self,
        group_id: TransitionGroupId,
        cell_id: CellId,
        map_id: Option<i32>,
        _transition_type_id: TransitionTypeId,
    ) {
        let Some(map_id) = map_id else {
            return;
        };
        if let Some(pixels) = self.transitioned_pixels.get_mut(&group_id) {
            pixels[cell_id] = map_id;
        }
    }

    /// Accumulates an attribute amount at a cell, clearing the no-data
    /// marker on first touch.
    pub fn record_attribute(&mut self, attribute_type_id: AttributeTypeId, cell_id: CellId, amount: f64) {
        if let Some(values) = self.attribute_values.get_mut(&attribute_type_id) {
            let slot = &mut values[cell_id];
            if *slot == f64::from(DEFAULT_NO_DATA_VALUE) {
                *slot = 0.0;
            }
            *slot += amount;
        }
    }
}

/// Running mean of per-cell truncated transition probabilities per group.
#[derive(Debug, Clone, Default)]
pub struct AverageProbabilities {
    sums: BTreeMap<TransitionGroupId, Vec<f64>>,
    timesteps: usize,
}

impl AverageProbabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one timestep's per-cell probabilities for every group.
    pub fn accumulate(&mut self, per_group: BTreeMap<TransitionGroupId, Vec<f64>>) {
        for (group, values) in per_group {
            match self.sums.get_mut(&group) {
                Some(sums) => {
                    for (sum, v) in sums.iter_mut().zip(values) {
                        *sum += v;
                    }
                }
                None => {
                    self.sums.insert(group, values);
                }
            }
        }
        self.timesteps += 1;
    }

    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    /// Mean probability per cell for a group, if any timestep accumulated.
    pub fn average(&self, group_id: TransitionGroupId) -> Option<Vec<f64>> {
        if self.timesteps == 0 {
            return None;
        }
        self.sums.get(&group_id).map(|sums| {
            sums.iter()
                .map(|s| s / self.timesteps as f64)
                .collect()
        })
    }

    /// Mean probabilities for every group.
    pub fn averages(&self) -> BTreeMap<TransitionGroupId, Vec<f64>> {
        self.sums
            .keys()
            .filter_map(|g| self.average(*g).map(|v| (*g, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Definitions, TransitionGroup, TransitionType};

    fn rules_with_group() -> RuleSet {
        let mut defs = Definitions::new();
        defs.add_transition_type(TransitionType::new(1, "fire"));
        defs.add_transition_group(TransitionGroup::new(10, "fire-group"));
        defs.add_group_membership(1, 10, true);
        RuleSet::new(defs)
    }

    #[test]
    fn disabled_outputs_allocate_nothing() {
        let rules = rules_with_group();
        let output = TimestepOutput::allocate(&OutputOptions::default(), &rules, 9);
        assert!(output.transitioned_pixels.is_empty());
        assert!(output.attribute_values.is_empty());
    }

    #[test]
    fn pixel_arrays_start_as_no_data() {
        let rules = rules_with_group();
        let mut options = OutputOptions::default();
        options.raster_transitions = true;
        let mut output = TimestepOutput::allocate(&options, &rules, 4);
        let pixels = output.transitioned_pixels.get(&10).unwrap();
        assert!(pixels.iter().all(|p| *p == DEFAULT_NO_DATA_VALUE));

        output.record_transition(10, 2, Some(1), 1);
        assert_eq!(output.transitioned_pixels[&10][2], 1);
        // A type without a map id records nothing.
        output.record_transition(10, 3, None, 1);
        assert_eq!(output.transitioned_pixels[&10][3], DEFAULT_NO_DATA_VALUE);
    }

    #[test]
    fn attribute_recording_clears_no_data_then_accumulates() {
        let mut output = TimestepOutput::default();
        output
            .attribute_values
            .insert(100, vec![f64::from(DEFAULT_NO_DATA_VALUE); 3]);
        output.record_attribute(100, 1, 2.0);
        output.record_attribute(100, 1, 3.0);
        assert_eq!(output.attribute_values[&100][1], 5.0);
        assert_eq!(
            output.attribute_values[&100][0],
            f64::from(DEFAULT_NO_DATA_VALUE)
        );
    }

    #[test]
    fn averages_divide_by_timestep_count() {
        let mut avg = AverageProbabilities::new();
        avg.accumulate(BTreeMap::from([(10, vec![0.2, 0.4])]));
        avg.accumulate(BTreeMap::from([(10, vec![0.4, 0.0])]));
        let mean = avg.average(10).unwrap();
        assert!((mean[0] - 0.3).abs() < 1e-12);
        assert!((mean[1] - 0.2).abs() < 1e-12);
        assert_eq!(avg.timesteps(), 2);
        assert!(avg.average(99).is_none());
    }
}
