//! Transition definitions: types, groups, and probabilistic pathways.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};

use crate::grid::{Cell, StateClassId, StratumId, TransitionGroupId, TransitionOption, TransitionTypeId};
use crate::rules::patches::PatchPrioritizationKind;

/// A transition type, the unit a pathway belongs to.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct TransitionType {
    pub id: TransitionTypeId,
    pub name: String,
    /// Value written to transitioned-pixel rasters; `None` suppresses
    /// recording for this type.
    pub map_id: Option<i32>,
}

impl TransitionType {
    pub fn new(id: TransitionTypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            map_id: Some(id),
        }
    }

    pub fn with_map_id(mut self, map_id: Option<i32>) -> Self {
        self.map_id = map_id;
        self
    }
}

/// A named set of transition types treated together for targeting and
/// spatial purposes. A group with no primary types is inert and skipped.
#[derive(Debug, Clone)]
pub struct TransitionGroup {
    pub id: TransitionGroupId,
    pub name: String,
    pub transition_types: BTreeSet<TransitionTypeId>,
    pub primary_transition_types: BTreeSet<TransitionTypeId>,
    pub patch_prioritization: Option<PatchPrioritizationKind>,
}

impl TransitionGroup {
    pub fn new(id: TransitionGroupId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            transition_types: BTreeSet::new(),
            primary_transition_types: BTreeSet::new(),
            patch_prioritization: None,
        }
    }

    pub fn with_patch_prioritization(mut self, kind: PatchPrioritizationKind) -> Self {
        self.patch_prioritization = Some(kind);
        self
    }
}

/// Registry of transition types, groups, and their memberships.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    transition_types: BTreeMap<TransitionTypeId, TransitionType>,
    transition_groups: BTreeMap<TransitionGroupId, TransitionGroup>,
    groups_for_type: BTreeMap<TransitionTypeId, Vec<TransitionGroupId>>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transition_type(&mut self, transition_type: TransitionType) {
        self.transition_types
            .insert(transition_type.id, transition_type);
    }

    pub fn add_transition_group(&mut self, group: TransitionGroup) {
        self.transition_groups.insert(group.id, group);
    }

    /// Registers a type as a member of a group. Primary membership is what
    /// the probability calculator and growth engine act on.
    pub fn add_group_membership(
        &mut self,
        transition_type_id: TransitionTypeId,
        group_id: TransitionGroupId,
        primary: bool,
    ) {
        if let Some(group) = self.transition_groups.get_mut(&group_id) {
            group.transition_types.insert(transition_type_id);
            if primary {
                group.primary_transition_types.insert(transition_type_id);
            }
        }
        let groups = self.groups_for_type.entry(transition_type_id).or_default();
        if !groups.contains(&group_id) {
            groups.push(group_id);
        }
    }

    pub fn transition_type(&self, id: TransitionTypeId) -> Option<&TransitionType> {
        self.transition_types.get(&id)
    }

    pub fn transition_group(&self, id: TransitionGroupId) -> Option<&TransitionGroup> {
        self.transition_groups.get(&id)
    }

    pub fn transition_group_mut(&mut self, id: TransitionGroupId) -> Option<&mut TransitionGroup> {
        self.transition_groups.get_mut(&id)
    }

    /// Groups a type belongs to, in membership registration order.
    pub fn groups_for_type(&self, transition_type_id: TransitionTypeId) -> &[TransitionGroupId] {
        self.groups_for_type
            .get(&transition_type_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All groups, ascending by id.
    pub fn transition_groups(&self) -> impl Iterator<Item = &TransitionGroup> {
        self.transition_groups.values()
    }

    /// Group ids, ascending. This is the base order the runner shuffles.
    pub fn transition_group_ids(&self) -> Vec<TransitionGroupId> {
        self.transition_groups.keys().copied().collect()
    }
}

/// A probabilistic transition pathway out of a (stratum, state class).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct TransitionPathway {
    /// Source stratum; `None` applies to every stratum.
    pub stratum_id: Option<StratumId>,
    /// Source state class.
    pub state_class_id: StateClassId,
    pub transition_type_id: TransitionTypeId,
    /// Base annual probability.
    pub probability: f64,
    /// Proportion of the probability allotted to this pathway.
    pub proportion: f64,
    /// Minimum eligible cell age.
    pub age_min: i32,
    /// Maximum eligible cell age.
    pub age_max: i32,
    /// Destination state class; `None` keeps the current one.
    pub dest_state_class_id: Option<StateClassId>,
    /// Destination stratum; `None` keeps the current one.
    pub dest_stratum_id: Option<StratumId>,
    /// Whether a transition through this pathway resets cell age to zero.
    pub age_reset: bool,
}

impl TransitionPathway {
    pub fn new(
        state_class_id: StateClassId,
        transition_type_id: TransitionTypeId,
        probability: f64,
    ) -> Self {
        Self {
            stratum_id: None,
            state_class_id,
            transition_type_id,
            probability,
            proportion: 1.0,
            age_min: 0,
            age_max: i32::MAX,
            dest_state_class_id: None,
            dest_stratum_id: None,
            age_reset: true,
        }
    }

    pub fn with_stratum(mut self, stratum_id: Option<StratumId>) -> Self {
        self.stratum_id = stratum_id;
        self
    }

    pub fn with_proportion(mut self, proportion: f64) -> Self {
        self.proportion = proportion;
        self
    }

    pub fn with_age_range(mut self, age_min: i32, age_max: i32) -> Self {
        self.age_min = age_min;
        self.age_max = age_max;
        self
    }

    pub fn with_destination(mut self, state_class_id: Option<StateClassId>) -> Self {
        self.dest_state_class_id = state_class_id;
        self
    }

    pub fn with_dest_stratum(mut self, stratum_id: Option<StratumId>) -> Self {
        self.dest_stratum_id = stratum_id;
        self
    }

    pub fn with_age_reset(mut self, age_reset: bool) -> Self {
        self.age_reset = age_reset;
        self
    }
}

/// All probabilistic pathways, indexed by source classification.
///
/// Pathway indices are stable for the lifetime of the table; cells carry
/// them in their [`TransitionOption`]s, and patch autocorrelation compares
/// them to decide whether two cells took the same pathway.
#[derive(Debug, Clone, Default)]
pub struct PathwayTable {
    pathways: Vec<TransitionPathway>,
    by_source: BTreeMap<(Option<StratumId>, StateClassId), Vec<usize>>,
}

impl PathwayTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pathway: TransitionPathway) -> usize {
        let index = self.pathways.len();
        self.by_source
            .entry((pathway.stratum_id, pathway.state_class_id))
            .or_default()
            .push(index);
        self.pathways.push(pathway);
        index
    }

    pub fn pathway(&self, index: usize) -> &TransitionPathway {
        &self.pathways[index]
    }

    pub fn len(&self) -> usize {
        self.pathways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pathways.is_empty()
    }

    /// Pathway indices applicable to a (stratum, state class), exact
    /// stratum entries before wildcard ones.
    fn indices_for(&self, stratum_id: StratumId, state_class_id: StateClassId) -> Vec<usize> {
        let mut out = Vec::new();
        if let Some(ids) = self.by_source.get(&(Some(stratum_id), state_class_id)) {
            out.extend_from_slice(ids);
        }
        if let Some(ids) = self.by_source.get(&(None, state_class_id)) {
            out.extend_from_slice(ids);
        }
        out
    }

    /// Recomputes a cell's available transition options from its current
    /// classification and age.
    pub fn fill_cell_transitions(&self, cell: &mut Cell) {
        cell.transitions.clear();
        for index in self.indices_for(cell.stratum_id, cell.state_class_id) {
            let p = &self.pathways[index];
            if cell.age < p.age_min || cell.age > p.age_max {
                continue;
            }
            cell.transitions.push(TransitionOption {
                pathway: index,
                transition_type_id: p.transition_type_id,
                probability: p.probability,
                proportion: p.proportion,
            });
        }
    }
}

/// Deterministic transition record: the age range a (stratum, state
/// class) occupies, used when sampling unknown initial ages.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct DeterministicTransition {
    pub stratum_id: Option<StratumId>,
    pub state_class_id: StateClassId,
    pub age_min: i32,
    pub age_max: i32,
}

/// Deterministic transitions indexed by source classification.
#[derive(Debug, Clone, Default)]
pub struct DeterministicTable {
    by_source: BTreeMap<(Option<StratumId>, StateClassId), DeterministicTransition>,
}

impl DeterministicTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: DeterministicTransition) {
        self.by_source
            .insert((record.stratum_id, record.state_class_id), record);
    }

    /// Exact stratum match first, wildcard stratum second.
    pub fn get(
        &self,
        stratum_id: StratumId,
        state_class_id: StateClassId,
    ) -> Option<&DeterministicTransition> {
        self.by_source
            .get(&(Some(stratum_id), state_class_id))
            .or_else(|| self.by_source.get(&(None, state_class_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Cell;

    #[test]
    fn group_membership_tracks_primary_types() {
        let mut defs = Definitions::new();
        defs.add_transition_type(TransitionType::new(1, "fire"));
        defs.add_transition_type(TransitionType::new(2, "fire-secondary"));
        defs.add_transition_group(TransitionGroup::new(10, "fire-group"));
        defs.add_group_membership(1, 10, true);
        defs.add_group_membership(2, 10, false);

        let group = defs.transition_group(10).unwrap();
        assert_eq!(group.transition_types.len(), 2);
        assert!(group.primary_transition_types.contains(&1));
        assert!(!group.primary_transition_types.contains(&2));
        assert_eq!(defs.groups_for_type(1), &[10]);
    }

    #[test]
    fn fill_cell_transitions_applies_age_eligibility() {
        let mut table = PathwayTable::new();
        table.add(TransitionPathway::new(100, 1, 0.2).with_age_range(0, 10));
        table.add(TransitionPathway::new(100, 2, 0.3).with_age_range(20, 40));

        let mut cell = Cell::new(0, 1, 100).with_age(5);
        table.fill_cell_transitions(&mut cell);
        assert_eq!(cell.transitions.len(), 1);
        assert_eq!(cell.transitions[0].transition_type_id, 1);

        cell.age = 30;
        table.fill_cell_transitions(&mut cell);
        assert_eq!(cell.transitions.len(), 1);
        assert_eq!(cell.transitions[0].transition_type_id, 2);
    }

    #[test]
    fn stratum_specific_pathways_precede_wildcards() {
        let mut table = PathwayTable::new();
        let wild = table.add(TransitionPathway::new(100, 1, 0.2));
        let exact = table.add(TransitionPathway::new(100, 1, 0.5).with_stratum(Some(7)));

        let mut cell = Cell::new(0, 7, 100);
        table.fill_cell_transitions(&mut cell);
        assert_eq!(cell.transitions.len(), 2);
        assert_eq!(cell.transitions[0].pathway, exact);
        assert_eq!(cell.transitions[1].pathway, wild);

        let mut other = Cell::new(1, 8, 100);
        table.fill_cell_transitions(&mut other);
        assert_eq!(other.transitions.len(), 1);
        assert_eq!(other.transitions[0].pathway, wild);
    }

    #[test]
    fn deterministic_lookup_prefers_exact_stratum() {
        let mut table = DeterministicTable::new();
        table.add(DeterministicTransition {
            stratum_id: None,
            state_class_id: 100,
            age_min: 0,
            age_max: 50,
        });
        table.add(DeterministicTransition {
            stratum_id: Some(3),
            state_class_id: 100,
            age_min: 10,
            age_max: 20,
        });

        assert_eq!(table.get(3, 100).unwrap().age_min, 10);
        assert_eq!(table.get(4, 100).unwrap().age_max, 50);
        assert!(table.get(4, 200).is_none());
    }
}
