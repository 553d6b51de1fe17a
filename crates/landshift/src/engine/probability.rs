//! Per-cell transition probabilities.
//!
//! The probability of a cell transitioning under a group is the sum, over
//! the cell's options whose type is one of the group's primary types, of
//! `probability x proportion x multiplier chain`. The chain order matters:
//! a target prioritization override short-circuits the whole cell to 0.0
//! or 1.0, and the attribute-target modification always comes last.
//!
//! Two variants exist on purpose: the truncated probability (clamped to
//! 1.0) drives decisions, while the non-truncated sum feeds expected-area
//! accounting so that over-100% cells still contribute their true
//! expected area.
use crate::engine::runner::Simulation;
use crate::grid::{Cell, CellId, TransitionGroupId};

/// Result of evaluating one option's multiplier chain.
pub(crate) enum OptionTerm {
    /// Normal multiplier product.
    Multiplier(f64),
    /// A target prioritization override: the whole cell's probability is
    /// forced to this value.
    Override(f64),
}

impl Simulation {
    /// Cell probability clamped to 1.0 for decision-making.
    pub fn cell_probability(
        &self,
        cell_id: CellId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
    ) -> f64 {
        let p = self.cell_probability_non_truncated(cell_id, group_id, iteration, timestep);
        p.min(1.0)
    }

    /// Cell probability left unclamped; may exceed 1.0.
    pub fn cell_probability_non_truncated(
        &self,
        cell_id: CellId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
    ) -> f64 {
        let Some(cell) = self.landscape().cell(cell_id) else {
            return 0.0;
        };
        let Some(group) = self.rules().definitions.transition_group(group_id) else {
            return 0.0;
        };

        let mut total = 0.0;
        for option in &cell.transitions {
            if !group
                .primary_transition_types
                .contains(&option.transition_type_id)
            {
                continue;
            }
            match self.option_term(cell, option.transition_type_id, group_id, iteration, timestep)
            {
                OptionTerm::Override(v) => return v,
                OptionTerm::Multiplier(m) => {
                    total += option.probability * option.proportion * m;
                }
            }
        }
        total
    }

    /// Evaluates the multiplier chain for one option on a cell.
    pub(crate) fn option_term(
        &self,
        cell: &Cell,
        transition_type_id: i32,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
    ) -> OptionTerm {
        let rules = self.rules();
        let targets = self.targets();

        let mut multiplier = rules
            .multipliers
            .get(cell, transition_type_id, iteration, timestep);
        multiplier *= rules
            .external
            .transition_multiplier(cell, transition_type_id, iteration, timestep);

        let mut prioritization_applied = false;
        if let Some(target) = targets.transition_target(
            group_id,
            Some(cell.stratum_id),
            cell.secondary_stratum_id,
            cell.tertiary_stratum_id,
            iteration,
            timestep,
        ) {
            if !target.disabled && !target.prioritizations.is_empty() {
                if let Some(pri) = target.prioritization_for(cell) {
                    if let Some(value) = pri.probability_override {
                        return OptionTerm::Override(value);
                    }
                    multiplier *= pri.probability_multiplier;
                    prioritization_applied = true;
                }
                // No prioritization for this cell: no additional
                // multiplier; the generic target multiplier applies below.
            }
        }

        if !prioritization_applied {
            multiplier *= targets.target_multiplier(
                group_id,
                Some(cell.stratum_id),
                cell.secondary_stratum_id,
                cell.tertiary_stratum_id,
                iteration,
                timestep,
            );
        }

        multiplier *= rules
            .spatial_multipliers
            .get(cell.id, transition_type_id, iteration, timestep);

        for member_group in rules.definitions.groups_for_type(transition_type_id) {
            multiplier *= self.adjacency_multiplier(*member_group, cell, iteration, timestep);
            multiplier *= rules
                .external
                .spatial_multiplier(cell, *member_group, iteration, timestep);
        }

        if targets.has_attribute_targets() {
            multiplier =
                self.modify_for_attribute_target(multiplier, transition_type_id, cell, iteration, timestep);
        }

        OptionTerm::Multiplier(multiplier)
    }

    /// Adjacency multiplier from the cell's cached neighborhood attribute
    /// value; neutral when no value is available.
    fn adjacency_multiplier(
        &self,
        group_id: TransitionGroupId,
        cell: &Cell,
        iteration: i32,
        timestep: i32,
    ) -> f64 {
        match self.adjacency().value(group_id, cell.id) {
            Some(value) => self.rules().adjacency_multipliers.get(
                group_id,
                cell.stratum_id,
                cell.secondary_stratum_id,
                cell.tertiary_stratum_id,
                iteration,
                timestep,
                value,
            ),
            None => 1.0,
        }
    }

    /// Zeroes the multiplier once an applicable attribute target is
    /// exhausted. Applied last in the chain.
    fn modify_for_attribute_target(
        &self,
        multiplier: f64,
        transition_type_id: i32,
        cell: &Cell,
        iteration: i32,
        timestep: i32,
    ) -> f64 {
        if self.attribute_target_exceeded(cell, transition_type_id, iteration, timestep) {
            0.0
        } else {
            multiplier
        }
    }

    /// Whether any attribute target applicable to this cell and transition
    /// type has been used up.
    pub(crate) fn attribute_target_exceeded(
        &self,
        cell: &Cell,
        transition_type_id: i32,
        iteration: i32,
        timestep: i32,
    ) -> bool {
        let rules = self.rules();
        let targets = self.targets();
        for record in rules
            .transition_attributes
            .values_for(transition_type_id, cell)
        {
            if let Some(index) = targets.attribute_target_index(
                record.attribute_type_id,
                Some(cell.stratum_id),
                cell.secondary_stratum_id,
                cell.tertiary_stratum_id,
                iteration,
                timestep,
            ) {
                let target = targets.attribute_target_at(index);
                if !target.disabled && target.remaining <= 0.0 {
                    return true;
                }
            }
        }
        false
    }

    /// Per-option selection weights for a cell under a group. Overrides
    /// act as plain multipliers here; the cell-level short-circuit only
    /// applies to the summed probability.
    pub(crate) fn option_weights(
        &self,
        cell_id: CellId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
    ) -> Vec<(usize, f64)> {
        let Some(cell) = self.landscape().cell(cell_id) else {
            return Vec::new();
        };
        let Some(group) = self.rules().definitions.transition_group(group_id) else {
            return Vec::new();
        };

        let mut weights = Vec::new();
        for option in &cell.transitions {
            if !group
                .primary_transition_types
                .contains(&option.transition_type_id)
            {
                continue;
            }
            let multiplier = match self.option_term(
                cell,
                option.transition_type_id,
                group_id,
                iteration,
                timestep,
            ) {
                OptionTerm::Multiplier(m) => m,
                OptionTerm::Override(v) => v,
            };
            weights.push((
                option.pathway,
                option.probability * option.proportion * multiplier,
            ));
        }
        weights
    }
}
