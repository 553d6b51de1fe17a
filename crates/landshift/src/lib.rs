#![forbid(unsafe_code)]
//! landshift: state-and-transition landscape simulation with stochastic
//! patch growth on raster grids.
//!
//! Modules:
//! - grid: raster metadata, grid topology, cells, and the landscape
//! - rules: temporal-scoped configuration maps, pathways, multipliers,
//!   targets, size distributions, and spread settings
//! - engine: probability calculation, patch growth, initial conditions,
//!   outputs, and the run driver
//!
//! All randomness flows through a caller-supplied seeded RNG; a fixed
//! seed and configuration reproduce a run exactly.
pub mod engine;
pub mod error;
pub mod grid;
pub mod random;
pub mod rules;

mod math;

/// Convenient re-exports for common types. Import with `use landshift::prelude::*;`.
pub mod prelude {
    pub use crate::engine::{
        AverageProbabilities, DraftCell, EventSink, FnSink, InitialConditionsDistribution,
        InitialConditionsDistributionCollection, InitialRasterNames, MultiSink, OutputOptions,
        SimEvent, SimEventKind, Simulation, SimulationConfig, TimestepOutput, TransitionEvent,
        VecSink,
    };
    pub use crate::error::{Error, Result};
    pub use crate::grid::{
        Cell, CellId, CompassDirection, GridTopology, Landscape, MetadataComparison, Raster,
        RasterMetadata, RasterSink, RasterSource, StateClassId, StratumId, TransitionGroupId,
        TransitionOption, TransitionTypeId,
    };
    pub use crate::rules::{
        AutocorrelationSpread, Definitions, DeterministicTransition, ExternalMultipliers,
        PatchPrioritizationKind, PathwayAutocorrelation, RuleSet, ScopedKeyMap, SizePrioritization,
        TargetPool, TargetPrioritization, TemporalSeries, TransitionAttributeTarget,
        TransitionGroup, TransitionPathway, TransitionSizeDistribution,
        TransitionSizePrioritization, TransitionTarget, TransitionType,
    };
}
