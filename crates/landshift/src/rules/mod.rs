//! Configurable rules: scoped lookup maps, transition definitions,
//! multipliers, targets, size distributions, and spread settings.
//!
//! Everything here is read-only while a timestep executes; the one
//! exception is the target remainders in [`TargetPool`], which the engine
//! decrements as transitions commit.
pub mod attributes;
pub mod multipliers;
pub mod patches;
pub mod pathways;
pub mod scoped;
pub mod sizes;
pub mod spread;
pub mod targets;

pub use attributes::{
    StateAttributeTable, StateAttributeValue, TransitionAttributeTable, TransitionAttributeValue,
};
pub use multipliers::{
    ExternalMultipliers, NoExternalMultipliers, SpatialInitiationMultiplierMap,
    SpatialMultiplierMap, TransitionMultiplier, TransitionMultiplierMap,
};
pub use patches::{PatchPrioritizationKind, PatchSet, TransitionPatch};
pub use pathways::{
    Definitions, DeterministicTable, DeterministicTransition, PathwayTable, TransitionGroup,
    TransitionPathway, TransitionType,
};
pub use scoped::{ScopedKeyMap, TemporalSeries};
pub use sizes::{
    SizeDistributionMap, SizePrioritization, SizePrioritizationMap, TransitionSizeDistribution,
    TransitionSizePrioritization,
};
pub use spread::{
    AdjacencyMultiplier, AdjacencyMultiplierMap, AutocorrelationMap, AutocorrelationSpread,
    DirectionMultiplierMap, PathwayAutocorrelation, SlopeMultiplier, SlopeMultiplierMap,
    TransitionAdjacencySetting,
};
pub use targets::{
    TargetPool, TargetPrioritization, TransitionAttributeTarget, TransitionTarget,
};

use std::collections::BTreeMap;

use crate::grid::TransitionGroupId;

/// Every rule of a scenario, resolved to in-memory lookup tables before
/// the run starts. This is the seam between configuration (external,
/// read-only during a run) and simulation state owned by the engine.
pub struct RuleSet {
    pub definitions: Definitions,
    pub pathways: PathwayTable,
    pub deterministic: DeterministicTable,
    pub multipliers: TransitionMultiplierMap,
    pub spatial_multipliers: SpatialMultiplierMap,
    pub spatial_initiation_multipliers: SpatialInitiationMultiplierMap,
    pub external: Box<dyn ExternalMultipliers>,
    pub autocorrelation: AutocorrelationMap,
    pub direction_multipliers: DirectionMultiplierMap,
    pub slope_multipliers: SlopeMultiplierMap,
    pub adjacency_settings: BTreeMap<TransitionGroupId, TransitionAdjacencySetting>,
    pub adjacency_multipliers: AdjacencyMultiplierMap,
    pub state_attributes: StateAttributeTable,
    pub transition_attributes: TransitionAttributeTable,
    pub size_distributions: SizeDistributionMap,
    pub size_prioritizations: SizePrioritizationMap,
}

impl RuleSet {
    pub fn new(definitions: Definitions) -> Self {
        Self {
            definitions,
            pathways: PathwayTable::new(),
            deterministic: DeterministicTable::new(),
            multipliers: TransitionMultiplierMap::new(),
            spatial_multipliers: SpatialMultiplierMap::new(),
            spatial_initiation_multipliers: SpatialInitiationMultiplierMap::new(),
            external: Box::new(NoExternalMultipliers),
            autocorrelation: AutocorrelationMap::new(),
            direction_multipliers: DirectionMultiplierMap::new(),
            slope_multipliers: SlopeMultiplierMap::new(),
            adjacency_settings: BTreeMap::new(),
            adjacency_multipliers: AdjacencyMultiplierMap::new(),
            state_attributes: StateAttributeTable::new(),
            transition_attributes: TransitionAttributeTable::new(),
            size_distributions: SizeDistributionMap::new(),
            size_prioritizations: SizePrioritizationMap::new(),
        }
    }

    pub fn with_external_multipliers(
        mut self,
        external: Box<dyn ExternalMultipliers>,
    ) -> Self {
        self.external = external;
        self
    }

    pub fn add_adjacency_setting(&mut self, setting: TransitionAdjacencySetting) {
        self.adjacency_settings
            .insert(setting.transition_group_id, setting);
    }

    /// Rebuilds derived indices. Call once after every record is
    /// registered and before the run starts.
    pub fn finalize(&mut self) {
        let definitions = &self.definitions;
        self.transition_attributes.build_group_index(definitions);
    }
}
