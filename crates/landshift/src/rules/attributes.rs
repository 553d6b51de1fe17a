//! State and transition attribute value tables.
//!
//! State attributes describe standing properties of a cell's current
//! classification (the adjacency machinery averages them over a
//! neighborhood). Transition attributes describe quantities produced when
//! a transition of some type commits; they are what attribute targets
//! meter.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};

use crate::grid::{AttributeTypeId, Cell, StateClassId, StratumId, TransitionGroupId, TransitionTypeId};
use crate::rules::pathways::Definitions;

/// Value of a state attribute for a classification scope.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct StateAttributeValue {
    pub attribute_type_id: AttributeTypeId,
    pub stratum_id: Option<StratumId>,
    pub state_class_id: Option<StateClassId>,
    pub value: f64,
}

/// State attribute values; the first matching record wins.
#[derive(Debug, Clone, Default)]
pub struct StateAttributeTable {
    records: Vec<StateAttributeValue>,
}

impl StateAttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: StateAttributeValue) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Attribute value for a cell's current classification.
    pub fn value(&self, attribute_type_id: AttributeTypeId, cell: &Cell) -> Option<f64> {
        self.records
            .iter()
            .find(|r| {
                r.attribute_type_id == attribute_type_id
                    && r.stratum_id.is_none_or(|s| s == cell.stratum_id)
                    && r.state_class_id.is_none_or(|sc| sc == cell.state_class_id)
            })
            .map(|r| r.value)
    }
}

/// Amount of a transition attribute produced per unit area when a
/// transition of the given type commits.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct TransitionAttributeValue {
    pub attribute_type_id: AttributeTypeId,
    pub transition_type_id: TransitionTypeId,
    pub stratum_id: Option<StratumId>,
    pub state_class_id: Option<StateClassId>,
    pub value: f64,
}

/// Transition attribute values plus the derived group index.
#[derive(Debug, Clone, Default)]
pub struct TransitionAttributeTable {
    records: Vec<TransitionAttributeValue>,
    by_type: BTreeMap<TransitionTypeId, Vec<usize>>,
    attribute_types_for_group: BTreeMap<TransitionGroupId, BTreeSet<AttributeTypeId>>,
}

impl TransitionAttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: TransitionAttributeValue) {
        let index = self.records.len();
        self.by_type
            .entry(record.transition_type_id)
            .or_default()
            .push(index);
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rebuilds the group index: a group is tied to every attribute type
    /// produced by any of its member transition types. Call after all
    /// records and memberships are registered.
    pub fn build_group_index(&mut self, definitions: &Definitions) {
        self.attribute_types_for_group.clear();
        for record in &self.records {
            for group_id in definitions.groups_for_type(record.transition_type_id) {
                self.attribute_types_for_group
                    .entry(*group_id)
                    .or_default()
                    .insert(record.attribute_type_id);
            }
        }
    }

    /// Attribute types tied to a group, ascending.
    pub fn attribute_types_for_group(&self, group_id: TransitionGroupId) -> Vec<AttributeTypeId> {
        self.attribute_types_for_group
            .get(&group_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Records applicable when `transition_type_id` commits on `cell`.
    pub fn values_for<'a>(
        &'a self,
        transition_type_id: TransitionTypeId,
        cell: &'a Cell,
    ) -> impl Iterator<Item = &'a TransitionAttributeValue> + 'a {
        self.by_type
            .get(&transition_type_id)
            .into_iter()
            .flatten()
            .map(|i| &self.records[*i])
            .filter(|r| {
                r.stratum_id.is_none_or(|s| s == cell.stratum_id)
                    && r.state_class_id.is_none_or(|sc| sc == cell.state_class_id)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Cell;
    use crate::rules::pathways::{TransitionGroup, TransitionType};

    #[test]
    fn state_attribute_scope_filters_apply() {
        let mut table = StateAttributeTable::new();
        table.add(StateAttributeValue {
            attribute_type_id: 1,
            stratum_id: Some(2),
            state_class_id: None,
            value: 5.0,
        });
        table.add(StateAttributeValue {
            attribute_type_id: 1,
            stratum_id: None,
            state_class_id: None,
            value: 1.0,
        });

        let in_stratum = Cell::new(0, 2, 100);
        assert_eq!(table.value(1, &in_stratum), Some(5.0));
        let elsewhere = Cell::new(1, 3, 100);
        assert_eq!(table.value(1, &elsewhere), Some(1.0));
        assert_eq!(table.value(2, &in_stratum), None);
    }

    #[test]
    fn group_index_unions_member_type_attributes() {
        let mut defs = Definitions::new();
        defs.add_transition_type(TransitionType::new(1, "a"));
        defs.add_transition_type(TransitionType::new(2, "b"));
        defs.add_transition_group(TransitionGroup::new(10, "g"));
        defs.add_group_membership(1, 10, true);
        defs.add_group_membership(2, 10, false);

        let mut table = TransitionAttributeTable::new();
        table.add(TransitionAttributeValue {
            attribute_type_id: 100,
            transition_type_id: 1,
            stratum_id: None,
            state_class_id: None,
            value: 2.0,
        });
        table.add(TransitionAttributeValue {
            attribute_type_id: 200,
            transition_type_id: 2,
            stratum_id: None,
            state_class_id: None,
            value: 3.0,
        });
        table.build_group_index(&defs);

        assert_eq!(table.attribute_types_for_group(10), vec![100, 200]);
        assert!(table.attribute_types_for_group(99).is_empty());
    }

    #[test]
    fn values_for_respects_cell_classification() {
        let mut table = TransitionAttributeTable::new();
        table.add(TransitionAttributeValue {
            attribute_type_id: 100,
            transition_type_id: 1,
            stratum_id: None,
            state_class_id: Some(50),
            value: 2.0,
        });

        let matching = Cell::new(0, 1, 50);
        assert_eq!(table.values_for(1, &matching).count(), 1);
        let other = Cell::new(1, 1, 60);
        assert_eq!(table.values_for(1, &other).count(), 0);
        assert_eq!(table.values_for(9, &matching).count(), 0);
    }
}
