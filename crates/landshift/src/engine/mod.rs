//! The simulation engine: probability calculation, patch growth, initial
//! conditions, outputs, and the run driver.
pub mod adjacency;
pub mod events;
pub mod growth;
pub mod init;
pub mod output;
pub mod probability;
pub mod runner;

pub use adjacency::AdjacencyCache;
pub use events::{EventSink, FnSink, MultiSink, SimEvent, SimEventKind, VecSink};
pub use growth::TransitionEvent;
pub use init::{
    cells_from_distribution_calculated, cells_from_distribution_drawn, drafts_from_rasters,
    fill_combined, realize_landscape, square_raster_side, write_classification_rasters, DraftCell,
    InitialConditionsDistribution, InitialConditionsDistributionCollection, InitialRasterNames,
};
pub use output::{AverageProbabilities, OutputOptions, TimestepOutput};
pub use runner::{Simulation, SimulationConfig};
