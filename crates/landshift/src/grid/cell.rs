//! Simulation cells and their currently-available transition options.
use crate::grid::{CellId, StateClassId, StratumId, TransitionTypeId};

/// One transition pathway currently available to a cell.
///
/// `pathway` indexes the pathway record in the
/// [`crate::rules::PathwayTable`] that produced this option; two options
/// with the same index represent the same pathway, which is what the
/// autocorrelation rules compare.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionOption {
    /// Index of the source pathway record.
    pub pathway: usize,
    /// Transition type this option belongs to.
    pub transition_type_id: TransitionTypeId,
    /// Base annual probability.
    pub probability: f64,
    /// Proportion of the probability allotted to this pathway.
    pub proportion: f64,
}

/// One spatial unit of the simulated landscape.
///
/// Cells are created once during initialization, mutated by transition
/// events for the rest of the run, and owned exclusively by the
/// [`crate::grid::Landscape`]. The `transitions` list is recomputed every
/// time the cell's classification changes.
#[derive(Debug, Clone)]
pub struct Cell {
    pub id: CellId,
    pub stratum_id: StratumId,
    pub secondary_stratum_id: Option<StratumId>,
    pub tertiary_stratum_id: Option<StratumId>,
    pub state_class_id: StateClassId,
    pub age: i32,
    /// Transition options currently available to this cell.
    pub transitions: Vec<TransitionOption>,
}

impl Cell {
    pub fn new(id: CellId, stratum_id: StratumId, state_class_id: StateClassId) -> Self {
        Self {
            id,
            stratum_id,
            secondary_stratum_id: None,
            tertiary_stratum_id: None,
            state_class_id,
            age: 0,
            transitions: Vec::new(),
        }
    }

    pub fn with_secondary_stratum(mut self, id: Option<StratumId>) -> Self {
        self.secondary_stratum_id = id;
        self
    }

    pub fn with_tertiary_stratum(mut self, id: Option<StratumId>) -> Self {
        self.tertiary_stratum_id = id;
        self
    }

    pub fn with_age(mut self, age: i32) -> Self {
        self.age = age;
        self
    }

    /// Returns the option for the given pathway index, if the cell
    /// currently offers it.
    pub fn option_for_pathway(&self, pathway: usize) -> Option<&TransitionOption> {
        self.transitions.iter().find(|t| t.pathway == pathway)
    }
}
