//! Simulated landscape: raster metadata, grid topology, cells, and strata.
pub mod cell;
pub mod landscape;
pub mod raster;
pub mod topology;

pub use cell::{Cell, TransitionOption};
pub use landscape::Landscape;
pub use raster::{
    MetadataComparison, Raster, RasterMetadata, RasterSink, RasterSource, DEFAULT_NO_DATA_VALUE,
};
pub use topology::{CompassDirection, GridTopology};

/// Dense row-major raster index of a cell.
pub type CellId = usize;

/// Primary, secondary and tertiary stratum identifiers.
pub type StratumId = i32;

/// State class identifier.
pub type StateClassId = i32;

/// Transition type identifier.
pub type TransitionTypeId = i32;

/// Transition group identifier.
pub type TransitionGroupId = i32;

/// State or transition attribute type identifier.
pub type AttributeTypeId = i32;
