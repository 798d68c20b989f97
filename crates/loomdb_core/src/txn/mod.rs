//! Read and write transactions.
//!
//! A [`ReadTransaction`] borrows an immutable view of the committed state;
//! any number can run concurrently. A [`WriteTransaction`] borrows the
//! writer's authoritative state mutably and records a typed undo entry for
//! every mutation, so a failing command unwinds in strict reverse order
//! and leaves no trace.
//!
//! Mutations go through the consuming [`InsertBuilder`] and
//! [`UpdateBuilder`], which defer nonnull validation to their `done()`
//! call; a half-configured instance is never observable outside the
//! transaction that builds it.

mod builder;
mod select;

pub use builder::{InsertBuilder, UpdateBuilder};
pub use select::{Matcher, Selection};

use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use crate::state::{RelationValue, StoreState, UndoOp};
use crate::types::InstanceId;
use loomdb_codec::Value;

/// A handle to a live instance: the entity type plus the instance id.
///
/// Refs are only valid within the transaction that produced them; holding
/// one across transactions is possible but it may point at a deleted
/// instance by then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectRef {
    pub(crate) entity: usize,
    pub(crate) id: InstanceId,
}

impl ObjectRef {
    /// The instance id within its entity type.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }
}

fn resolve_entity(schema: &Schema, entity: &str) -> CoreResult<usize> {
    schema
        .entity_index(entity)
        .ok_or_else(|| CoreError::malformed(format!("unknown entity {entity}")))
}

fn read_attribute(state: &StoreState, obj: &ObjectRef, attribute: &str) -> CoreResult<Value> {
    let def = state.schema().entity(obj.entity);
    let slot = def.attribute_slot(attribute).ok_or_else(|| {
        CoreError::malformed(format!("unknown attribute {}.{attribute}", def.name))
    })?;
    let inst = state
        .get(obj.entity, obj.id)
        .ok_or_else(|| CoreError::not_found(&def.name, "id", obj.id))?;
    Ok(inst.attribute(slot).clone())
}

fn read_relation(
    state: &StoreState,
    obj: &ObjectRef,
    relation: &str,
) -> CoreResult<(usize, RelationValue)> {
    let def = state.schema().entity(obj.entity);
    let slot = def.relation_slot(relation).ok_or_else(|| {
        CoreError::malformed(format!("unknown relation {}.{relation}", def.name))
    })?;
    let inst = state
        .get(obj.entity, obj.id)
        .ok_or_else(|| CoreError::not_found(&def.name, "id", obj.id))?;
    Ok((def.relation_target[slot], inst.relation(slot).clone()))
}

fn read_reciprocal(state: &StoreState, obj: &ObjectRef, view: &str) -> CoreResult<Vec<ObjectRef>> {
    let def = state.schema().entity(obj.entity);
    let view_idx = def.reciprocal_slot(view).ok_or_else(|| {
        CoreError::malformed(format!("unknown reciprocal view {}.{view}", def.name))
    })?;
    if state.get(obj.entity, obj.id).is_none() {
        return Err(CoreError::not_found(&def.name, "id", obj.id));
    }
    let tail_entity = def.reciprocals[view_idx].tail_entity;
    Ok(state
        .reciprocal(obj.entity, view_idx, obj.id)
        .into_iter()
        .map(|id| ObjectRef {
            entity: tail_entity,
            id,
        })
        .collect())
}

/// An immutable view over committed store state.
pub struct ReadTransaction<'a> {
    state: &'a StoreState,
}

impl<'a> ReadTransaction<'a> {
    pub(crate) fn new(state: &'a StoreState) -> Self {
        Self { state }
    }

    /// Whether the store is in readonly mode.
    #[must_use]
    pub fn readonly(&self) -> bool {
        self.state.readonly()
    }

    /// Starts a unique-attribute lookup on the named entity.
    #[must_use]
    pub fn find(&self, entity: &str, attribute: &str) -> Matcher<'_> {
        Matcher::new(self.state, entity, attribute)
    }

    /// Selects all live instances of the named entity.
    pub fn select(&self, entity: &str) -> CoreResult<Selection<'_>> {
        Selection::new(self.state, entity)
    }

    /// Returns a ref to the instance with the given id, if live.
    pub fn get(&self, entity: &str, id: InstanceId) -> CoreResult<Option<ObjectRef>> {
        let entity = resolve_entity(self.state.schema(), entity)?;
        Ok(self
            .state
            .get(entity, id)
            .map(|_| ObjectRef { entity, id }))
    }

    /// Reads an attribute value.
    pub fn attribute(&self, obj: &ObjectRef, attribute: &str) -> CoreResult<Value> {
        read_attribute(self.state, obj, attribute)
    }

    /// Reads a to-one relation.
    pub fn relation_one(&self, obj: &ObjectRef, relation: &str) -> CoreResult<Option<ObjectRef>> {
        match read_relation(self.state, obj, relation)? {
            (entity, RelationValue::One(target)) => {
                Ok(target.map(|id| ObjectRef { entity, id }))
            }
            _ => Err(CoreError::malformed(format!(
                "relation {relation} is to-many"
            ))),
        }
    }

    /// Reads the members of a to-many relation, in ascending id order.
    pub fn relation_many(&self, obj: &ObjectRef, relation: &str) -> CoreResult<Vec<ObjectRef>> {
        match read_relation(self.state, obj, relation)? {
            (entity, RelationValue::Many(members)) => Ok(members
                .into_iter()
                .map(|id| ObjectRef { entity, id })
                .collect()),
            _ => Err(CoreError::malformed(format!(
                "relation {relation} is to-one"
            ))),
        }
    }

    /// Reads a reciprocal view: the instances whose forward relation
    /// points at `obj`.
    pub fn reciprocal(&self, obj: &ObjectRef, view: &str) -> CoreResult<Vec<ObjectRef>> {
        read_reciprocal(self.state, obj, view)
    }
}

/// A mutable transaction over the writer's authoritative state.
///
/// Handlers receive one of these; every mutation is recorded and
/// [`rollback`](Self::rollback) undoes all of them in reverse.
pub struct WriteTransaction<'a> {
    state: &'a mut StoreState,
    undo: Vec<UndoOp>,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(state: &'a mut StoreState) -> Self {
        Self {
            state,
            undo: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, op: UndoOp) {
        self.undo.push(op);
    }

    pub(crate) fn state(&self) -> &StoreState {
        self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut StoreState {
        self.state
    }

    /// Unwinds every recorded mutation in reverse order.
    pub(crate) fn rollback(mut self) {
        while let Some(op) = self.undo.pop() {
            self.state.undo(op);
        }
    }

    /// Discards the undo record, keeping all mutations.
    pub(crate) fn commit(self) {
        // Mutations already live in the state; dropping the ops seals them.
        drop(self.undo);
    }

    /// Whether the store is in readonly mode.
    #[must_use]
    pub fn readonly(&self) -> bool {
        self.state.readonly()
    }

    /// Toggles readonly mode.
    pub fn set_readonly(&mut self, enabled: bool) {
        let op = self.state.set_readonly(enabled);
        self.record(op);
    }

    /// Starts a unique-attribute lookup on the named entity.
    #[must_use]
    pub fn find(&self, entity: &str, attribute: &str) -> Matcher<'_> {
        Matcher::new(self.state, entity, attribute)
    }

    /// Selects all live instances of the named entity.
    pub fn select(&self, entity: &str) -> CoreResult<Selection<'_>> {
        Selection::new(self.state, entity)
    }

    /// Returns a ref to the instance with the given id, if live.
    pub fn get(&self, entity: &str, id: InstanceId) -> CoreResult<Option<ObjectRef>> {
        let entity = resolve_entity(self.state.schema(), entity)?;
        Ok(self
            .state
            .get(entity, id)
            .map(|_| ObjectRef { entity, id }))
    }

    /// Reads an attribute value.
    pub fn attribute(&self, obj: &ObjectRef, attribute: &str) -> CoreResult<Value> {
        read_attribute(self.state, obj, attribute)
    }

    /// Reads a to-one relation.
    pub fn relation_one(&self, obj: &ObjectRef, relation: &str) -> CoreResult<Option<ObjectRef>> {
        match read_relation(self.state, obj, relation)? {
            (entity, RelationValue::One(target)) => {
                Ok(target.map(|id| ObjectRef { entity, id }))
            }
            _ => Err(CoreError::malformed(format!(
                "relation {relation} is to-many"
            ))),
        }
    }

    /// Reads the members of a to-many relation, in ascending id order.
    pub fn relation_many(&self, obj: &ObjectRef, relation: &str) -> CoreResult<Vec<ObjectRef>> {
        match read_relation(self.state, obj, relation)? {
            (entity, RelationValue::Many(members)) => Ok(members
                .into_iter()
                .map(|id| ObjectRef { entity, id })
                .collect()),
            _ => Err(CoreError::malformed(format!(
                "relation {relation} is to-one"
            ))),
        }
    }

    /// Reads a reciprocal view.
    pub fn reciprocal(&self, obj: &ObjectRef, view: &str) -> CoreResult<Vec<ObjectRef>> {
        read_reciprocal(self.state, obj, view)
    }

    /// Creates a new instance of the named entity and returns a builder
    /// to populate it. The instance only becomes valid once the builder's
    /// `done()` passes nonnull validation.
    pub fn insert(&mut self, entity: &str) -> CoreResult<InsertBuilder<'_, 'a>> {
        let entity = resolve_entity(self.state.schema(), entity)?;
        Ok(InsertBuilder::create(self, entity))
    }

    /// Returns a builder to modify an existing instance.
    pub fn update(&mut self, obj: &ObjectRef) -> CoreResult<UpdateBuilder<'_, 'a>> {
        let def = self.state.schema().entity(obj.entity);
        if self.state.get(obj.entity, obj.id).is_none() {
            return Err(CoreError::not_found(&def.name, "id", obj.id));
        }
        Ok(UpdateBuilder::open(self, *obj))
    }

    /// Deletes an instance. Reciprocal views drop it atomically; forward
    /// relations elsewhere that pointed at it are left dangling.
    pub fn delete(&mut self, obj: &ObjectRef) -> CoreResult<()> {
        let op = self.state.delete(obj.entity, obj.id)?;
        self.record(op);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDef, EntityDef, RelationDef, ScalarType};
    use std::sync::Arc;

    fn test_state() -> StoreState {
        let schema = Schema::builder()
            .entity(
                EntityDef::builder("Person")
                    .attribute(AttributeDef::new("name", ScalarType::Text).unique())
                    .attribute(AttributeDef::new("age", ScalarType::Integer).nullable())
                    .build(),
            )
            .entity(
                EntityDef::builder("Car")
                    .attribute(AttributeDef::new("plate", ScalarType::Text).unique())
                    .relation(
                        RelationDef::one("owner", "Person")
                            .nullable()
                            .reciprocal("owned_cars"),
                    )
                    .build(),
            )
            .build()
            .unwrap();
        StoreState::new(Arc::new(schema))
    }

    #[test]
    fn insert_find_and_read() {
        let mut state = test_state();
        let mut txn = WriteTransaction::new(&mut state);

        let john = txn
            .insert("Person")
            .unwrap()
            .set("name", "john")
            .unwrap()
            .set("age", 42)
            .unwrap()
            .done()
            .unwrap();

        let found = txn.find("Person", "name").equals_to("john").unwrap();
        assert_eq!(found, john);
        assert_eq!(txn.attribute(&john, "age").unwrap(), Value::Integer(42));
    }

    #[test]
    fn find_miss_raises_but_or_null_does_not() {
        let mut state = test_state();
        let txn = WriteTransaction::new(&mut state);

        let err = txn.find("Person", "name").equals_to("ghost").unwrap_err();
        assert!(matches!(err, CoreError::ObjectNotFound { .. }));

        let none = txn
            .find("Person", "name")
            .equals_to_or_null("ghost")
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn find_on_non_unique_attribute_is_malformed() {
        let mut state = test_state();
        let txn = WriteTransaction::new(&mut state);
        let err = txn.find("Person", "age").equals_to(42).unwrap_err();
        assert!(matches!(err, CoreError::MalformedCommand { .. }));
    }

    #[test]
    fn missing_nonnull_attribute_fails_done() {
        let mut state = test_state();
        let mut txn = WriteTransaction::new(&mut state);

        let err = txn.insert("Person").unwrap().done().unwrap_err();
        assert!(matches!(err, CoreError::NonnullConstraint { .. }));
    }

    #[test]
    fn missing_nonnull_relation_fails_done() {
        let schema = Schema::builder()
            .entity(
                EntityDef::builder("Person")
                    .attribute(AttributeDef::new("name", ScalarType::Text).unique())
                    .build(),
            )
            .entity(
                EntityDef::builder("Car")
                    .attribute(AttributeDef::new("plate", ScalarType::Text).unique())
                    .relation(RelationDef::one("owner", "Person").reciprocal("owned_cars"))
                    .build(),
            )
            .build()
            .unwrap();
        let mut state = StoreState::new(Arc::new(schema));
        let mut txn = WriteTransaction::new(&mut state);

        let john = txn
            .insert("Person")
            .unwrap()
            .set("name", "john")
            .unwrap()
            .done()
            .unwrap();

        let err = txn
            .insert("Car")
            .unwrap()
            .set("plate", "X-1")
            .unwrap()
            .done()
            .unwrap_err();
        assert!(matches!(err, CoreError::NonnullConstraint { .. }));

        // Relating the owner satisfies the constraint.
        txn.insert("Car")
            .unwrap()
            .set("plate", "X-2")
            .unwrap()
            .relate("owner", &john)
            .unwrap()
            .done()
            .unwrap();
    }

    #[test]
    fn rollback_undoes_everything_in_reverse() {
        let mut state = test_state();
        {
            let mut txn = WriteTransaction::new(&mut state);
            let john = txn
                .insert("Person")
                .unwrap()
                .set("name", "john")
                .unwrap()
                .done()
                .unwrap();
            txn.insert("Car")
                .unwrap()
                .set("plate", "X-1")
                .unwrap()
                .relate("owner", &john)
                .unwrap()
                .done()
                .unwrap();
            txn.rollback();
        }
        let txn = ReadTransaction::new(&state);
        assert_eq!(txn.select("Person").unwrap().count(), 0);
        assert_eq!(txn.select("Car").unwrap().count(), 0);
    }

    #[test]
    fn update_and_reciprocal_view() {
        let mut state = test_state();
        let mut txn = WriteTransaction::new(&mut state);

        let john = txn
            .insert("Person")
            .unwrap()
            .set("name", "john")
            .unwrap()
            .done()
            .unwrap();
        let car = txn
            .insert("Car")
            .unwrap()
            .set("plate", "X-1")
            .unwrap()
            .done()
            .unwrap();

        txn.update(&car)
            .unwrap()
            .relate("owner", &john)
            .unwrap()
            .done()
            .unwrap();
        assert_eq!(txn.reciprocal(&john, "owned_cars").unwrap(), vec![car]);

        txn.delete(&car).unwrap();
        assert!(txn.reciprocal(&john, "owned_cars").unwrap().is_empty());
    }

    #[test]
    fn readonly_flag_round_trip() {
        let mut state = test_state();
        let mut txn = WriteTransaction::new(&mut state);
        assert!(!txn.readonly());
        txn.set_readonly(true);
        assert!(txn.readonly());
        txn.rollback();
        assert!(!state.readonly());
    }
}
