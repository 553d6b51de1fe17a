//! Spatial spread rules: pathway autocorrelation, direction multipliers,
//! slope multipliers, and adjacency multipliers.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::topology::CompassDirection;
use crate::grid::{AttributeTypeId, StratumId, TransitionGroupId};
use crate::rules::scoped::ScopedKeyMap;

/// What a growing patch may spread into.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutocorrelationSpread {
    /// No restriction on where the patch spreads.
    ToAnyCell,
    /// Only cells sharing the initiation cell's primary stratum.
    ToSamePrimaryStratum,
    /// Only cells sharing the initiation cell's secondary stratum.
    ToSameSecondaryStratum,
    /// Only cells sharing the initiation cell's tertiary stratum.
    ToSameTertiaryStratum,
    /// Only cells that can reuse a pathway already committed in the patch.
    ToSamePathway,
}

/// Autocorrelation setting for a (group, stratum, secondary, tertiary)
/// scope.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct PathwayAutocorrelation {
    /// When true, a frontier cell reuses a neighbor's committed pathway
    /// instead of drawing a fresh one.
    pub autocorrelation: bool,
    pub spread_to: AutocorrelationSpread,
}

impl PathwayAutocorrelation {
    pub fn new(autocorrelation: bool, spread_to: AutocorrelationSpread) -> Self {
        Self {
            autocorrelation,
            spread_to,
        }
    }
}

/// Autocorrelation settings keyed by (group, stratum, secondary,
/// tertiary).
#[derive(Debug, Clone, Default)]
pub struct AutocorrelationMap {
    map: ScopedKeyMap<4, PathwayAutocorrelation>,
}

impl AutocorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        transition_group_id: TransitionGroupId,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: Option<i32>,
        timestep: Option<i32>,
        value: PathwayAutocorrelation,
    ) -> Result<()> {
        self.map.add(
            [
                Some(transition_group_id),
                stratum_id,
                secondary_stratum_id,
                tertiary_stratum_id,
            ],
            iteration,
            timestep,
            value,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        transition_group_id: TransitionGroupId,
        stratum_id: StratumId,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: i32,
        timestep: i32,
    ) -> Option<&PathwayAutocorrelation> {
        self.map.get(
            [
                Some(transition_group_id),
                Some(stratum_id),
                secondary_stratum_id,
                tertiary_stratum_id,
            ],
            iteration,
            timestep,
        )
    }
}

/// Per-direction spread multipliers for one scope. Directions without a
/// configured value are neutral.
#[derive(Debug, Clone, Default)]
struct DirectionMultipliers {
    values: [Option<f64>; 8],
}

/// Direction multipliers keyed by (group, stratum, secondary, tertiary).
#[derive(Debug, Clone, Default)]
pub struct DirectionMultiplierMap {
    map: ScopedKeyMap<4, DirectionMultipliers>,
}

impl DirectionMultiplierMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        transition_group_id: TransitionGroupId,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        direction: CompassDirection,
        iteration: Option<i32>,
        timestep: Option<i32>,
        value: f64,
    ) -> Result<()> {
        let entry = self.map.get_or_insert_with(
            [
                Some(transition_group_id),
                stratum_id,
                secondary_stratum_id,
                tertiary_stratum_id,
            ],
            iteration,
            timestep,
            DirectionMultipliers::default,
        );
        let slot = &mut entry.values[direction.index()];
        if slot.is_some() {
            return Err(Error::DuplicateKey(format!(
                "direction multiplier for group {transition_group_id}, direction {direction:?}"
            )));
        }
        *slot = Some(value);
        Ok(())
    }

    /// Multiplier for spreading into a cell from the given direction; 1.0
    /// when none is configured.
    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        transition_group_id: TransitionGroupId,
        stratum_id: StratumId,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        direction: CompassDirection,
        iteration: i32,
        timestep: i32,
    ) -> f64 {
        self.map
            .get(
                [
                    Some(transition_group_id),
                    Some(stratum_id),
                    secondary_stratum_id,
                    tertiary_stratum_id,
                ],
                iteration,
                timestep,
            )
            .and_then(|m| m.values[direction.index()])
            .unwrap_or(1.0)
    }
}

/// One point of a slope multiplier curve.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct SlopeMultiplier {
    /// Slope in degrees, negative for downhill.
    pub slope: f64,
    pub value: f64,
}

/// Slope multiplier curves keyed by (group, stratum, secondary,
/// tertiary). Lookups interpolate piecewise-linearly between configured
/// points and clamp to the end points outside the configured range.
#[derive(Debug, Clone, Default)]
pub struct SlopeMultiplierMap {
    map: ScopedKeyMap<4, Vec<SlopeMultiplier>>,
}

impl SlopeMultiplierMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        transition_group_id: TransitionGroupId,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: Option<i32>,
        timestep: Option<i32>,
        point: SlopeMultiplier,
    ) {
        let curve = self.map.get_or_insert_with(
            [
                Some(transition_group_id),
                stratum_id,
                secondary_stratum_id,
                tertiary_stratum_id,
            ],
            iteration,
            timestep,
            Vec::new,
        );
        let at = curve.partition_point(|p| p.slope < point.slope);
        curve.insert(at, point);
    }

    /// Multiplier for spreading over the given slope; 1.0 when no curve is
    /// configured.
    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        transition_group_id: TransitionGroupId,
        stratum_id: StratumId,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: i32,
        timestep: i32,
        slope: f64,
    ) -> f64 {
        let curve = match self.map.get(
            [
                Some(transition_group_id),
                Some(stratum_id),
                secondary_stratum_id,
                tertiary_stratum_id,
            ],
            iteration,
            timestep,
        ) {
            Some(c) if !c.is_empty() => c,
            _ => return 1.0,
        };
        interpolate(curve, slope, |p| p.slope, |p| p.value)
    }
}

/// Which state attribute a group's adjacency multiplier reads, and how
/// often the neighborhood averages are refreshed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct TransitionAdjacencySetting {
    pub transition_group_id: TransitionGroupId,
    pub attribute_type_id: AttributeTypeId,
    /// Refresh period in timesteps; 1 refreshes every timestep.
    pub update_frequency: i32,
}

impl TransitionAdjacencySetting {
    pub fn new(transition_group_id: TransitionGroupId, attribute_type_id: AttributeTypeId) -> Self {
        Self {
            transition_group_id,
            attribute_type_id,
            update_frequency: 1,
        }
    }

    pub fn with_update_frequency(mut self, frequency: i32) -> Self {
        self.update_frequency = frequency.max(1);
        self
    }
}

/// One point of an adjacency multiplier curve over neighborhood attribute
/// values.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct AdjacencyMultiplier {
    pub attribute_value: f64,
    pub value: f64,
}

/// Adjacency multiplier curves keyed by (group, stratum, secondary,
/// tertiary), interpolated over the neighborhood attribute value.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyMultiplierMap {
    map: ScopedKeyMap<4, Vec<AdjacencyMultiplier>>,
}

impl AdjacencyMultiplierMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        transition_group_id: TransitionGroupId,
        stratum_id: Option<StratumId>,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: Option<i32>,
        timestep: Option<i32>,
        point: AdjacencyMultiplier,
    ) {
        let curve = self.map.get_or_insert_with(
            [
                Some(transition_group_id),
                stratum_id,
                secondary_stratum_id,
                tertiary_stratum_id,
            ],
            iteration,
            timestep,
            Vec::new,
        );
        let at = curve.partition_point(|p| p.attribute_value < point.attribute_value);
        curve.insert(at, point);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        transition_group_id: TransitionGroupId,
        stratum_id: StratumId,
        secondary_stratum_id: Option<StratumId>,
        tertiary_stratum_id: Option<StratumId>,
        iteration: i32,
        timestep: i32,
        attribute_value: f64,
    ) -> f64 {
        let curve = match self.map.get(
            [
                Some(transition_group_id),
                Some(stratum_id),
                secondary_stratum_id,
                tertiary_stratum_id,
            ],
            iteration,
            timestep,
        ) {
            Some(c) if !c.is_empty() => c,
            _ => return 1.0,
        };
        interpolate(curve, attribute_value, |p| p.attribute_value, |p| p.value)
    }
}

/// Piecewise-linear interpolation over a curve sorted by its x values,
/// clamped to the end points.
fn interpolate<P>(curve: &[P], x: f64, x_of: impl Fn(&P) -> f64, y_of: impl Fn(&P) -> f64) -> f64 {
    debug_assert!(!curve.is_empty());
    if x <= x_of(&curve[0]) {
        return y_of(&curve[0]);
    }
    if x >= x_of(&curve[curve.len() - 1]) {
        return y_of(&curve[curve.len() - 1]);
    }
    for pair in curve.windows(2) {
        let (x0, x1) = (x_of(&pair[0]), x_of(&pair[1]));
        if x <= x1 {
            let t = (x - x0) / (x1 - x0);
            return y_of(&pair[0]) + t * (y_of(&pair[1]) - y_of(&pair[0]));
        }
    }
    y_of(&curve[curve.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autocorrelation_resolves_by_scope() {
        let mut map = AutocorrelationMap::new();
        map.add(
            1,
            None,
            None,
            None,
            None,
            None,
            PathwayAutocorrelation::new(true, AutocorrelationSpread::ToSamePrimaryStratum),
        )
        .unwrap();

        let setting = map.get(1, 5, None, None, 0, 0).unwrap();
        assert!(setting.autocorrelation);
        assert_eq!(setting.spread_to, AutocorrelationSpread::ToSamePrimaryStratum);
        assert!(map.get(2, 5, None, None, 0, 0).is_none());
    }

    #[test]
    fn direction_multiplier_defaults_to_one() {
        let mut map = DirectionMultiplierMap::new();
        map.add(1, None, None, None, CompassDirection::North, None, None, 0.0)
            .unwrap();

        assert_eq!(map.get(1, 5, None, None, CompassDirection::North, 0, 0), 0.0);
        assert_eq!(map.get(1, 5, None, None, CompassDirection::East, 0, 0), 1.0);
    }

    #[test]
    fn duplicate_direction_multiplier_is_rejected() {
        let mut map = DirectionMultiplierMap::new();
        map.add(1, None, None, None, CompassDirection::North, None, None, 0.5)
            .unwrap();
        let err = map.add(1, None, None, None, CompassDirection::North, None, None, 0.7);
        assert!(err.is_err());
        assert_eq!(map.get(1, 5, None, None, CompassDirection::North, 0, 0), 0.5);
    }

    #[test]
    fn slope_multiplier_interpolates_between_points() {
        let mut map = SlopeMultiplierMap::new();
        map.add(1, None, None, None, None, None, SlopeMultiplier { slope: 0.0, value: 1.0 });
        map.add(
            1,
            None,
            None,
            None,
            None,
            None,
            SlopeMultiplier { slope: 20.0, value: 0.0 },
        );

        assert_eq!(map.get(1, 5, None, None, 0, 0, 0.0), 1.0);
        assert_eq!(map.get(1, 5, None, None, 0, 0, 20.0), 0.0);
        let half = map.get(1, 5, None, None, 0, 0, 10.0);
        assert!((half - 0.5).abs() < 1e-12);
        // Clamped beyond the configured range.
        assert_eq!(map.get(1, 5, None, None, 0, 0, -10.0), 1.0);
        assert_eq!(map.get(1, 5, None, None, 0, 0, 45.0), 0.0);
    }

    #[test]
    fn slope_points_sort_on_insert() {
        let mut map = SlopeMultiplierMap::new();
        map.add(1, None, None, None, None, None, SlopeMultiplier { slope: 30.0, value: 0.0 });
        map.add(1, None, None, None, None, None, SlopeMultiplier { slope: -30.0, value: 1.0 });
        map.add(1, None, None, None, None, None, SlopeMultiplier { slope: 0.0, value: 0.5 });

        let mid = map.get(1, 5, None, None, 0, 0, -15.0);
        assert!((mid - 0.75).abs() < 1e-12);
    }

    #[test]
    fn adjacency_multiplier_without_curve_is_neutral() {
        let map = AdjacencyMultiplierMap::new();
        assert_eq!(map.get(1, 5, None, None, 0, 0, 0.7), 1.0);
    }

    #[test]
    fn adjacency_setting_clamps_frequency() {
        let setting = TransitionAdjacencySetting::new(1, 100).with_update_frequency(0);
        assert_eq!(setting.update_frequency, 1);
    }
}
