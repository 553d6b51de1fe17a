//! Area and attribute targets and their remaining-amount accounting.
//!
//! Targets meter how much area (or attribute amount) a transition group
//! may produce per scope and timestep. Remaining amounts are decremented
//! as transitions commit and are never silently clamped; a negative
//! remainder records overshoot. The `has_target` / `attribute_targets_met`
//! predicates gate how aggressively the growth engine keeps generating
//! events.
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::grid::{AttributeTypeId, Cell, StateClassId, StratumId, TransitionGroupId};
use crate::rules::scoped::ScopedKeyMap;

/// Per-classification prioritization attached to a transition target.
///
/// A probability override short-circuits the whole cell/group probability
/// to exactly 0.0 or 1.0; a multiplier scales it. A record carries one or
/// the other.
#[derive(Debug, Clone)]
pub struct TargetPrioritization {
    pub stratum_id: Option<StratumId>,
    pub secondary_stratum_id: Option<StratumId>,
    pub tertiary_stratum_id: Option<StratumId>,
    pub state_class_id: Option<StateClassId>,
    pub probability_override: Option<f64>,
    pub probability_multiplier: f64,
}

impl TargetPrioritization {
    /// A prioritization that scales probability by `multiplier`.
    pub fn multiplier(multiplier: f64) -> Self {
        Self {
            stratum_id: None,
            secondary_stratum_id: None,
            tertiary_stratum_id: None,
            state_class_id: None,
            probability_override: None,
            probability_multiplier: multiplier,
        }
    }

    /// A prioritization that overrides probability outright. Only 0.0 and
    /// 1.0 are meaningful overrides; anything else is a configuration
    /// error.
    pub fn probability_override(value: f64) -> Result<Self> {
        if value != 0.0 && value != 1.0 {
            return Err(Error::InvalidConfig(format!(
                "probability override must be 0.0 or 1.0, got {value}"
            )));
        }
        Ok(Self {
            stratum_id: None,
            secondary_stratum_id: None,
            tertiary_stratum_id: None,
            state_class_id: None,
            probability_override: Some(value),
            probability_multiplier: 1.0,
        })
    }

    pub fn with_scope(
        mut self,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
    ) -> Self {
        self.stratum_id = stratum_id;
        self.secondary_stratum_id = secondary_stratum_id;
        self.tertiary_stratum_id = tertiary_stratum_id;
        self
    }

    pub fn with_state_class(mut self, state_class_id: Option<StateClassId>) -> Self {
        self.state_class_id = state_class_id;
        self
    }

    fn matches(&self, cell: &Cell) -> bool {
        self.stratum_id.is_none_or(|s| s == cell.stratum_id)
            && self
                .secondary_stratum_id
                .is_none_or(|s| Some(s) == cell.secondary_stratum_id)
            && self
                .tertiary_stratum_id
                .is_none_or(|s| Some(s) == cell.tertiary_stratum_id)
            && self.state_class_id.is_none_or(|sc| sc == cell.state_class_id)
    }
}

/// Remaining-area counter for a transition group and scope.
#[derive(Debug, Clone)]
pub struct TransitionTarget {
    pub transition_group_id: TransitionGroupId,
    pub stratum_id: Option<StratumId>,
    pub secondary_stratum_id: Option<StratumId>,
    pub tertiary_stratum_id: Option<StratumId>,
    /// Configured amount per timestep.
    pub amount: f64,
    /// Remaining amount; decremented as transitions commit, may go
    /// negative.
    pub remaining: f64,
    /// Steering multiplier, recomputed per timestep so that expected area
    /// tracks the remaining amount.
    pub multiplier: f64,
    pub disabled: bool,
    pub prioritizations: Vec<TargetPrioritization>,
}

impl TransitionTarget {
    pub fn new(transition_group_id: TransitionGroupId, amount: f64) -> Self {
        Self {
            transition_group_id,
            stratum_id: None,
            secondary_stratum_id: None,
            tertiary_stratum_id: None,
            amount,
            remaining: amount,
            multiplier: 1.0,
            disabled: false,
            prioritizations: Vec::new(),
        }
    }

    pub fn with_scope(
        mut self,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
    ) -> Self {
        self.stratum_id = stratum_id;
        self.secondary_stratum_id = secondary_stratum_id;
        self.tertiary_stratum_id = tertiary_stratum_id;
        self
    }

    pub fn with_prioritization(mut self, prioritization: TargetPrioritization) -> Self {
        self.prioritizations.push(prioritization);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// First prioritization whose scope matches the cell.
    pub fn prioritization_for(&self, cell: &Cell) -> Option<&TargetPrioritization> {
        self.prioritizations.iter().find(|p| p.matches(cell))
    }
}

/// Remaining-amount counter for a transition attribute type and scope.
#[derive(Debug, Clone)]
pub struct TransitionAttributeTarget {
    pub attribute_type_id: AttributeTypeId,
    pub stratum_id: Option<StratumId>,
    pub secondary_stratum_id: Option<StratumId>,
    pub tertiary_stratum_id: Option<StratumId>,
    pub amount: f64,
    pub remaining: f64,
    pub disabled: bool,
}

impl TransitionAttributeTarget {
    pub fn new(attribute_type_id: AttributeTypeId, amount: f64) -> Self {
        Self {
            attribute_type_id,
            stratum_id: None,
            secondary_stratum_id: None,
            tertiary_stratum_id: None,
            amount,
            remaining: amount,
            disabled: false,
        }
    }

    pub fn with_scope(
        mut self,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
    ) -> Self {
        self.stratum_id = stratum_id;
        self.secondary_stratum_id = secondary_stratum_id;
        self.tertiary_stratum_id = tertiary_stratum_id;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// Owns every target of a run and the scoped maps that resolve them.
///
/// Targets are index-addressed so the engine can decrement remainders
/// while the resolution maps stay immutable.
#[derive(Debug, Clone, Default)]
pub struct TargetPool {
    transition_targets: Vec<TransitionTarget>,
    attribute_targets: Vec<TransitionAttributeTarget>,
    transition_map: ScopedKeyMap<4, usize>,
    attribute_map: ScopedKeyMap<4, usize>,
    by_group: BTreeMap<TransitionGroupId, Vec<usize>>,
}

impl TargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transition target for the given scope. Duplicate
    /// (group, scope, iteration, timestep) tuples are rejected.
    pub fn add_transition_target(
        &mut self,
        target: TransitionTarget,
        iteration: Option<i32>,
        timestep: Option<i32>,
    ) -> Result<usize> {
        let index = self.transition_targets.len();
        self.transition_map.add(
            [
                Some(target.transition_group_id),
                target.stratum_id,
                target.secondary_stratum_id,
                target.tertiary_stratum_id,
            ],
            iteration,
            timestep,
            index,
        )?;
        self.by_group
            .entry(target.transition_group_id)
            .or_default()
            .push(index);
        self.transition_targets.push(target);
        Ok(index)
    }

    /// Registers an attribute target for the given scope.
    pub fn add_attribute_target(
        &mut self,
        target: TransitionAttributeTarget,
        iteration: Option<i32>,
        timestep: Option<i32>,
    ) -> Result<usize> {
        let index = self.attribute_targets.len();
        self.attribute_map.add(
            [
                Some(target.attribute_type_id),
                target.stratum_id,
                target.secondary_stratum_id,
                target.tertiary_stratum_id,
            ],
            iteration,
            timestep,
            index,
        )?;
        self.attribute_targets.push(target);
        Ok(index)
    }

    pub fn transition_target_index(
        &self,
        group_id: TransitionGroupId,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: i32,
        timestep: i32,
    ) -> Option<usize> {
        self.transition_map
            .get(
                [
                    Some(group_id),
                    stratum_id,
                    secondary_stratum_id,
                    tertiary_stratum_id,
                ],
                iteration,
                timestep,
            )
            .copied()
    }

    pub fn transition_target(
        &self,
        group_id: TransitionGroupId,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: i32,
        timestep: i32,
    ) -> Option<&TransitionTarget> {
        self.transition_target_index(
            group_id,
            stratum_id,
            secondary_stratum_id,
            tertiary_stratum_id,
            iteration,
            timestep,
        )
        .map(|i| &self.transition_targets[i])
    }

    pub fn transition_target_at(&self, index: usize) -> &TransitionTarget {
        &self.transition_targets[index]
    }

    pub fn transition_target_at_mut(&mut self, index: usize) -> &mut TransitionTarget {
        &mut self.transition_targets[index]
    }

    pub fn attribute_target_index(
        &self,
        attribute_type_id: AttributeTypeId,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: i32,
        timestep: i32,
    ) -> Option<usize> {
        self.attribute_map
            .get(
                [
                    Some(attribute_type_id),
                    stratum_id,
                    secondary_stratum_id,
                    tertiary_stratum_id,
                ],
                iteration,
                timestep,
            )
            .copied()
    }

    pub fn attribute_target_at(&self, index: usize) -> &TransitionAttributeTarget {
        &self.attribute_targets[index]
    }

    pub fn attribute_target_at_mut(&mut self, index: usize) -> &mut TransitionAttributeTarget {
        &mut self.attribute_targets[index]
    }

    /// Indices of every transition target registered for a group.
    pub fn transition_target_indices_for_group(&self, group_id: TransitionGroupId) -> &[usize] {
        self.by_group
            .get(&group_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_attribute_targets(&self) -> bool {
        !self.attribute_targets.is_empty()
    }

    /// The steering multiplier of the resolved target; neutral when no
    /// target applies or the target is disabled.
    pub fn target_multiplier(
        &self,
        group_id: TransitionGroupId,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: i32,
        timestep: i32,
    ) -> f64 {
        match self.transition_target(
            group_id,
            stratum_id,
            secondary_stratum_id,
            tertiary_stratum_id,
            iteration,
            timestep,
        ) {
            Some(t) if !t.disabled => t.multiplier,
            _ => 1.0,
        }
    }

    /// Restores every remaining amount to the configured amount and
    /// resets steering multipliers. Called at the start of each timestep.
    pub fn reset_remaining(&mut self) {
        for t in &mut self.transition_targets {
            t.remaining = t.amount;
            t.multiplier = 1.0;
        }
        for t in &mut self.attribute_targets {
            t.remaining = t.amount;
        }
    }

    /// Whether any area target, checked across the wildcard and every
    /// concrete secondary/tertiary stratum combination, or any attribute
    /// target tied to the group's attribute types is defined and enabled.
    pub fn has_target(
        &self,
        group_id: TransitionGroupId,
        stratum_id: StratumId,
        secondary_ids: &[Option<StratumId>],
        tertiary_ids: &[Option<StratumId>],
        attribute_types: &[AttributeTypeId],
        iteration: i32,
        timestep: i32,
    ) -> bool {
        for ss in secondary_ids {
            for ts in tertiary_ids {
                if let Some(t) = self.transition_target(
                    group_id,
                    Some(stratum_id),
                    *ss,
                    *ts,
                    iteration,
                    timestep,
                ) {
                    if !t.disabled {
                        return true;
                    }
                }
            }
        }

        for attr in attribute_types {
            for ss in secondary_ids {
                for ts in tertiary_ids {
                    if let Some(index) = self.attribute_target_index(
                        *attr,
                        Some(stratum_id),
                        *ss,
                        *ts,
                        iteration,
                        timestep,
                    ) {
                        if !self.attribute_targets[index].disabled {
                            return true;
                        }
                    }
                }
            }
        }

        false
    }

    /// True when at least one applicable attribute target exists and every
    /// enabled one has zero or negative remaining amount. With no
    /// applicable targets there is nothing to satisfy and the growth loop
    /// keeps going, so this returns false.
    pub fn attribute_targets_met(
        &self,
        stratum_id: StratumId,
        secondary_ids: &[Option<StratumId>],
        tertiary_ids: &[Option<StratumId>],
        attribute_types: &[AttributeTypeId],
        iteration: i32,
        timestep: i32,
    ) -> bool {
        let mut found = false;
        for attr in attribute_types {
            for ss in secondary_ids {
                for ts in tertiary_ids {
                    if let Some(index) = self.attribute_target_index(
                        *attr,
                        Some(stratum_id),
                        *ss,
                        *ts,
                        iteration,
                        timestep,
                    ) {
                        let target = &self.attribute_targets[index];
                        if target.disabled {
                            continue;
                        }
                        found = true;
                        if target.remaining > 0.0 {
                            return false;
                        }
                    }
                }
            }
        }
        found
    }
}
