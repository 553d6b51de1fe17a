//! Patch size distributions and size prioritization policies.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::grid::{StratumId, TransitionGroupId};
use crate::rules::scoped::ScopedKeyMap;

/// One size-class bin of a patch size distribution.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct TransitionSizeDistribution {
    pub minimum_size: f64,
    pub maximum_size: f64,
    /// Relative weight of this bin; bins are normalized at draw time.
    pub proportion: f64,
}

impl TransitionSizeDistribution {
    pub fn new(minimum_size: f64, maximum_size: f64, proportion: f64) -> Result<Self> {
        if minimum_size < 0.0 || maximum_size < minimum_size {
            return Err(Error::InvalidConfig(format!(
                "invalid size bin [{minimum_size}, {maximum_size}]"
            )));
        }
        if proportion <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "size bin proportion must be > 0, got {proportion}"
            )));
        }
        Ok(Self {
            minimum_size,
            maximum_size,
            proportion,
        })
    }
}

/// Size distributions keyed by (transition group, stratum).
#[derive(Debug, Clone, Default)]
pub struct SizeDistributionMap {
    map: ScopedKeyMap<2, Vec<TransitionSizeDistribution>>,
    groups: BTreeSet<TransitionGroupId>,
}

impl SizeDistributionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        transition_group_id: TransitionGroupId,
        stratum_id: Option<StratumId>,
        iteration: Option<i32>,
        timestep: Option<i32>,
        bin: TransitionSizeDistribution,
    ) {
        self.map
            .get_or_insert_with(
                [Some(transition_group_id), stratum_id],
                iteration,
                timestep,
                Vec::new,
            )
            .push(bin);
        self.groups.insert(transition_group_id);
    }

    /// Whether any distribution is configured for the group, under any
    /// scope. Groups without one fall back to whole-cell events.
    pub fn has_distribution(&self, transition_group_id: TransitionGroupId) -> bool {
        self.groups.contains(&transition_group_id)
    }

    pub fn get(
        &self,
        transition_group_id: TransitionGroupId,
        stratum_id: StratumId,
        iteration: i32,
        timestep: i32,
    ) -> Option<&[TransitionSizeDistribution]> {
        self.map
            .get(
                [Some(transition_group_id), Some(stratum_id)],
                iteration,
                timestep,
            )
            .map(Vec::as_slice)
    }
}

/// Ordering applied to a batch of transition events before growth.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePrioritization {
    /// Shuffle the batch uniformly.
    None,
    /// Grow the smallest events first.
    Smallest,
    /// Grow the largest events first.
    Largest,
}

/// Size prioritization policy for a (transition group, stratum) scope.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct TransitionSizePrioritization {
    pub prioritization: SizePrioritization,
    /// Keep the realized size distribution faithful by pruning the
    /// nearest-sized pending event when a patch falls short.
    pub maximize_fidelity_to_distribution: bool,
    /// Keep generating events until the whole expected area is realized,
    /// even without targets.
    pub maximize_fidelity_to_total_area: bool,
}

impl TransitionSizePrioritization {
    pub fn new(prioritization: SizePrioritization) -> Self {
        Self {
            prioritization,
            maximize_fidelity_to_distribution: true,
            maximize_fidelity_to_total_area: false,
        }
    }

    pub fn with_fidelity_to_distribution(mut self, value: bool) -> Self {
        self.maximize_fidelity_to_distribution = value;
        self
    }

    pub fn with_fidelity_to_total_area(mut self, value: bool) -> Self {
        self.maximize_fidelity_to_total_area = value;
        self
    }
}

/// Size prioritizations keyed by (transition group, stratum).
#[derive(Debug, Clone, Default)]
pub struct SizePrioritizationMap {
    map: ScopedKeyMap<2, TransitionSizePrioritization>,
}

impl SizePrioritizationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        transition_group_id: TransitionGroupId,
        stratum_id: Option<StratumId>,
        iteration: Option<i32>,
        timestep: Option<i32>,
        value: TransitionSizePrioritization,
    ) -> Result<()> {
        self.map.add(
            [Some(transition_group_id), stratum_id],
            iteration,
            timestep,
            value,
        )
    }

    pub fn get(
        &self,
        transition_group_id: TransitionGroupId,
        stratum_id: StratumId,
        iteration: i32,
        timestep: i32,
    ) -> Option<&TransitionSizePrioritization> {
        self.map.get(
            [Some(transition_group_id), Some(stratum_id)],
            iteration,
            timestep,
        )
    }

    /// Whether the policy for this scope requires realizing the whole
    /// expected area. Absent a policy, it does not.
    pub fn maximize_fidelity_to_total_area(
        &self,
        transition_group_id: TransitionGroupId,
        stratum_id: StratumId,
        iteration: i32,
        timestep: i32,
    ) -> bool {
        self.get(transition_group_id, stratum_id, iteration, timestep)
            .map(|p| p.maximize_fidelity_to_total_area)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_bin_validation() {
        assert!(TransitionSizeDistribution::new(1.0, 10.0, 0.5).is_ok());
        assert!(TransitionSizeDistribution::new(10.0, 1.0, 0.5).is_err());
        assert!(TransitionSizeDistribution::new(1.0, 10.0, 0.0).is_err());
        assert!(TransitionSizeDistribution::new(-1.0, 10.0, 0.5).is_err());
    }

    #[test]
    fn has_distribution_tracks_groups() {
        let mut map = SizeDistributionMap::new();
        assert!(!map.has_distribution(1));
        map.add(
            1,
            None,
            None,
            None,
            TransitionSizeDistribution::new(1.0, 5.0, 1.0).unwrap(),
        );
        assert!(map.has_distribution(1));
        assert!(!map.has_distribution(2));
    }

    #[test]
    fn bins_accumulate_per_scope() {
        let mut map = SizeDistributionMap::new();
        map.add(
            1,
            None,
            None,
            None,
            TransitionSizeDistribution::new(1.0, 5.0, 0.8).unwrap(),
        );
        map.add(
            1,
            None,
            None,
            None,
            TransitionSizeDistribution::new(5.0, 20.0, 0.2).unwrap(),
        );
        let bins = map.get(1, 3, 0, 0).unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].maximum_size, 5.0);
    }

    #[test]
    fn fidelity_defaults_without_policy() {
        let map = SizePrioritizationMap::new();
        assert!(!map.maximize_fidelity_to_total_area(1, 1, 0, 0));
    }

    #[test]
    fn prioritization_resolves_by_group_and_stratum() {
        let mut map = SizePrioritizationMap::new();
        map.add(
            1,
            None,
            None,
            None,
            TransitionSizePrioritization::new(SizePrioritization::Largest)
                .with_fidelity_to_total_area(true),
        )
        .unwrap();

        let policy = map.get(1, 42, 0, 0).unwrap();
        assert_eq!(policy.prioritization, SizePrioritization::Largest);
        assert!(map.maximize_fidelity_to_total_area(1, 42, 0, 0));
        assert!(map.get(2, 42, 0, 0).is_none());
    }
}
