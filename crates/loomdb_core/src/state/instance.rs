//! Fixed-layout instance representation.

use crate::types::InstanceId;
use loomdb_codec::Value;
use std::collections::BTreeSet;

/// The value of one relation slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationValue {
    /// A to-one relation: the target instance id, if set.
    One(Option<InstanceId>),
    /// A to-many relation: the set of target instance ids.
    Many(BTreeSet<InstanceId>),
}

impl RelationValue {
    /// Returns all target ids currently held by this slot.
    pub fn targets(&self) -> impl Iterator<Item = InstanceId> + '_ {
        let (one, many) = match self {
            Self::One(target) => (*target, None),
            Self::Many(set) => (None, Some(set.iter().copied())),
        };
        one.into_iter().chain(many.into_iter().flatten())
    }

    /// Returns `true` if the slot holds no target.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(target) => target.is_none(),
            Self::Many(set) => set.is_empty(),
        }
    }
}

/// One live record of an entity type.
///
/// Attribute and relation slots are indexed by definition order; an unset
/// attribute holds [`Value::Null`]. Relations reference other instances by
/// id only - instances never own each other.
#[derive(Debug, Clone)]
pub struct Instance {
    /// Immutable id, assigned at creation.
    pub id: InstanceId,
    /// Attribute values by slot.
    pub(crate) attributes: Vec<Value>,
    /// Relation values by slot.
    pub(crate) relations: Vec<RelationValue>,
}

impl Instance {
    /// Creates a pristine instance: all attributes null, all relations empty.
    pub(crate) fn pristine(id: InstanceId, attribute_count: usize, relation_slots: &[bool]) -> Self {
        Self {
            id,
            attributes: vec![Value::Null; attribute_count],
            relations: relation_slots
                .iter()
                .map(|&many| {
                    if many {
                        RelationValue::Many(BTreeSet::new())
                    } else {
                        RelationValue::One(None)
                    }
                })
                .collect(),
        }
    }

    /// Returns the attribute value at `slot`.
    #[must_use]
    pub fn attribute(&self, slot: usize) -> &Value {
        &self.attributes[slot]
    }

    /// Returns the relation value at `slot`.
    #[must_use]
    pub fn relation(&self, slot: usize) -> &RelationValue {
        &self.relations[slot]
    }
}
