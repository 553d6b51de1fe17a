//! Transition multipliers: base state/age records, raster-derived spatial
//! multipliers, and the external multiplier hook.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::grid::{Cell, StateClassId, StratumId, TransitionGroupId, TransitionTypeId};
use crate::rules::scoped::ScopedKeyMap;

/// One base multiplier record, optionally restricted by state class and
/// age. Records sharing a scope live in one list; the first match wins.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct TransitionMultiplier {
    pub state_class_id: Option<StateClassId>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub value: f64,
}

impl TransitionMultiplier {
    pub fn new(value: f64) -> Self {
        Self {
            state_class_id: None,
            age_min: None,
            age_max: None,
            value,
        }
    }

    pub fn with_state_class(mut self, state_class_id: Option<StateClassId>) -> Self {
        self.state_class_id = state_class_id;
        self
    }

    pub fn with_age_range(mut self, age_min: Option<i32>, age_max: Option<i32>) -> Self {
        self.age_min = age_min;
        self.age_max = age_max;
        self
    }

    fn matches(&self, cell: &Cell) -> bool {
        if let Some(sc) = self.state_class_id {
            if sc != cell.state_class_id {
                return false;
            }
        }
        if let Some(min) = self.age_min {
            if cell.age < min {
                return false;
            }
        }
        if let Some(max) = self.age_max {
            if cell.age > max {
                return false;
            }
        }
        true
    }
}

/// Base state/age multipliers keyed by (transition type, stratum,
/// secondary stratum, tertiary stratum) and scoped temporally.
#[derive(Debug, Clone, Default)]
pub struct TransitionMultiplierMap {
    map: ScopedKeyMap<4, Vec<TransitionMultiplier>>,
}

impl TransitionMultiplierMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        transition_type_id: TransitionTypeId,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: Option<i32>,
        timestep: Option<i32>,
        record: TransitionMultiplier,
    ) {
        self.map
            .get_or_insert_with(
                [
                    Some(transition_type_id),
                    stratum_id,
                    secondary_stratum_id,
                    tertiary_stratum_id,
                ],
                iteration,
                timestep,
                Vec::new,
            )
            .push(record);
    }

    /// Resolves the multiplier for a cell and transition type; 1.0 when no
    /// record applies.
    pub fn get(
        &self,
        cell: &Cell,
        transition_type_id: TransitionTypeId,
        iteration: i32,
        timestep: i32,
    ) -> f64 {
        let records = self.map.get(
            [
                Some(transition_type_id),
                Some(cell.stratum_id),
                cell.secondary_stratum_id,
                cell.tertiary_stratum_id,
            ],
            iteration,
            timestep,
        );
        match records {
            Some(list) => list
                .iter()
                .find(|r| r.matches(cell))
                .map(|r| r.value)
                .unwrap_or(1.0),
            None => 1.0,
        }
    }
}

/// Raster-derived per-cell multipliers keyed by transition type.
#[derive(Debug, Clone, Default)]
pub struct SpatialMultiplierMap {
    map: ScopedKeyMap<1, Vec<f64>>,
}

impl SpatialMultiplierMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        transition_type_id: TransitionTypeId,
        iteration: Option<i32>,
        timestep: Option<i32>,
        values: Vec<f64>,
    ) -> crate::error::Result<()> {
        self.map
            .add([Some(transition_type_id)], iteration, timestep, values)
    }

    /// Per-cell multiplier; 1.0 when no raster applies.
    pub fn get(
        &self,
        cell_id: usize,
        transition_type_id: TransitionTypeId,
        iteration: i32,
        timestep: i32,
    ) -> f64 {
        self.map
            .get([Some(transition_type_id)], iteration, timestep)
            .and_then(|values| values.get(cell_id))
            .copied()
            .unwrap_or(1.0)
    }
}

/// Raster-derived per-cell initiation multipliers keyed by transition
/// group. Applied only when weighing initiation candidates, never in the
/// expected-area accumulation.
#[derive(Debug, Clone, Default)]
pub struct SpatialInitiationMultiplierMap {
    map: ScopedKeyMap<1, Vec<f64>>,
}

impl SpatialInitiationMultiplierMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        transition_group_id: TransitionGroupId,
        iteration: Option<i32>,
        timestep: Option<i32>,
        values: Vec<f64>,
    ) -> crate::error::Result<()> {
        self.map
            .add([Some(transition_group_id)], iteration, timestep, values)
    }

    pub fn get(
        &self,
        cell_id: usize,
        transition_group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
    ) -> f64 {
        self.map
            .get([Some(transition_group_id)], iteration, timestep)
            .and_then(|values| values.get(cell_id))
            .copied()
            .unwrap_or(1.0)
    }
}

/// Hook for multipliers supplied by the hosting application.
///
/// The probability calculator consults both methods for every option; the
/// defaults are neutral.
pub trait ExternalMultipliers {
    fn transition_multiplier(
        &self,
        _cell: &Cell,
        _transition_type_id: TransitionTypeId,
        _iteration: i32,
        _timestep: i32,
    ) -> f64 {
        1.0
    }

    fn spatial_multiplier(
        &self,
        _cell: &Cell,
        _transition_group_id: TransitionGroupId,
        _iteration: i32,
        _timestep: i32,
    ) -> f64 {
        1.0
    }
}

/// The neutral hook used when the host supplies nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalMultipliers;

impl ExternalMultipliers for NoExternalMultipliers {}
