//! The in-memory entity store.
//!
//! One [`EntityTable`] per entity type holds the live instances, the unique
//! indices, and the reciprocal view indices. All tables together form the
//! [`StoreState`], which is owned exclusively by the writer while a write
//! transaction is open and exposed to readers only as the latest committed
//! copy.
//!
//! Every mutating operation returns a typed [`UndoOp`] that exactly
//! reverses it; the transaction engine accumulates these and unwinds them
//! in reverse on failure.

mod instance;
mod undo;

pub use instance::{Instance, RelationValue};
pub use undo::UndoOp;

use crate::error::{CoreError, CoreResult};
use crate::schema::{Cardinality, Schema};
use crate::types::InstanceId;
use loomdb_codec::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// All state of one entity type.
#[derive(Debug, Clone)]
pub struct EntityTable {
    /// Live instances by id.
    pub(crate) instances: BTreeMap<InstanceId, Instance>,
    /// The id the next created instance receives. Never decreases across
    /// commits; ids are not reused after deletion.
    pub(crate) next_id: u64,
    /// Unique indices, parallel to the attribute slots. Non-unique slots
    /// keep an empty, unused map so indexing never fails.
    pub(crate) unique: Vec<HashMap<Value, InstanceId>>,
    /// Reciprocal view indices, parallel to the entity's view definitions:
    /// head instance id to the set of tail instance ids whose forward
    /// relation currently points here.
    pub(crate) views: Vec<HashMap<InstanceId, BTreeSet<InstanceId>>>,
}

impl EntityTable {
    fn new(attribute_count: usize, view_count: usize) -> Self {
        Self {
            instances: BTreeMap::new(),
            next_id: 0,
            unique: vec![HashMap::new(); attribute_count],
            views: vec![HashMap::new(); view_count],
        }
    }
}

/// The complete mutable state of a store: one table per entity type plus
/// the readonly flag.
///
/// Cloning produces an independent committed copy for readers; all
/// contents are plain maps and the schema is shared via `Arc`.
#[derive(Debug, Clone)]
pub struct StoreState {
    pub(crate) schema: Arc<Schema>,
    pub(crate) tables: Vec<EntityTable>,
    pub(crate) readonly: bool,
}

impl StoreState {
    /// Creates an empty state for the given schema.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        let tables = schema
            .entities()
            .iter()
            .map(|def| EntityTable::new(def.attributes.len(), def.reciprocals.len()))
            .collect();
        Self {
            schema,
            tables,
            readonly: false,
        }
    }

    /// Returns the schema this state was built for.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the readonly flag.
    #[must_use]
    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// Toggles the readonly flag.
    pub fn set_readonly(&mut self, enabled: bool) -> UndoOp {
        let previous = self.readonly;
        self.readonly = enabled;
        UndoOp::ReadonlySet { previous }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Returns the instance with the given id, if live.
    #[must_use]
    pub fn get(&self, entity: usize, id: InstanceId) -> Option<&Instance> {
        self.tables[entity].instances.get(&id)
    }

    /// Looks up an instance by a unique attribute value.
    ///
    /// The caller is responsible for only passing slots declared unique.
    #[must_use]
    pub fn get_by_unique(&self, entity: usize, slot: usize, value: &Value) -> Option<InstanceId> {
        self.tables[entity].unique[slot].get(value).copied()
    }

    /// Returns all live instance ids of an entity type, in id order.
    pub fn list(&self, entity: usize) -> impl Iterator<Item = InstanceId> + '_ {
        self.tables[entity].instances.keys().copied()
    }

    /// Returns the tail ids of a reciprocal view, in ascending order.
    #[must_use]
    pub fn reciprocal(&self, entity: usize, view: usize, head: InstanceId) -> Vec<InstanceId> {
        self.tables[entity].views[view]
            .get(&head)
            .map(|tails| tails.iter().copied().collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Allocates the next id and creates a pristine instance.
    pub fn create(&mut self, entity: usize) -> (InstanceId, UndoOp) {
        let schema = Arc::clone(&self.schema);
        let def = schema.entity(entity);
        let many: Vec<bool> = def
            .relations
            .iter()
            .map(|r| r.cardinality == Cardinality::Many)
            .collect();

        let table = &mut self.tables[entity];
        let id = InstanceId::new(table.next_id);
        table.next_id += 1;
        table
            .instances
            .insert(id, Instance::pristine(id, def.attributes.len(), &many));
        (id, UndoOp::Created { entity, id })
    }

    /// Sets an attribute, enforcing type and uniqueness.
    ///
    /// Uniqueness is checked before anything changes: on a conflict the
    /// call fails and neither the value nor the index is touched. The old
    /// index entry is only replaced once the new value is accepted.
    pub fn set_attribute(
        &mut self,
        entity: usize,
        id: InstanceId,
        slot: usize,
        value: Value,
    ) -> CoreResult<UndoOp> {
        let schema = Arc::clone(&self.schema);
        let def = schema.entity(entity);
        let attr = &def.attributes[slot];

        let value = if value.is_null() {
            Value::Null
        } else {
            attr.ty.convert(&value).ok_or_else(|| {
                CoreError::malformed(format!(
                    "attribute {}.{} expects {}, got {}",
                    def.name,
                    attr.name,
                    attr.ty.name(),
                    value.type_name()
                ))
            })?
        };

        let table = &mut self.tables[entity];
        if !table.instances.contains_key(&id) {
            return Err(CoreError::not_found(&def.name, "id", id));
        }

        if attr.unique && !value.is_null() {
            if let Some(&existing) = table.unique[slot].get(&value) {
                if existing != id {
                    return Err(CoreError::unique_violation(&def.name, &attr.name, &value));
                }
            }
        }

        let previous = {
            let inst = table
                .instances
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(&def.name, "id", id))?;
            std::mem::replace(&mut inst.attributes[slot], value.clone())
        };

        if attr.unique {
            if !previous.is_null() {
                table.unique[slot].remove(&previous);
            }
            if !value.is_null() {
                table.unique[slot].insert(value, id);
            }
        }

        Ok(UndoOp::AttributeSet {
            entity,
            id,
            slot,
            previous,
        })
    }

    /// Sets a to-one relation.
    pub fn set_relation(
        &mut self,
        entity: usize,
        id: InstanceId,
        slot: usize,
        target: Option<InstanceId>,
    ) -> CoreResult<UndoOp> {
        let schema = Arc::clone(&self.schema);
        let def = schema.entity(entity);
        let rel = &def.relations[slot];
        if rel.cardinality != Cardinality::One {
            return Err(CoreError::malformed(format!(
                "relation {}.{} is to-many; use add/remove",
                def.name, rel.name
            )));
        }

        let head_entity = def.relation_target[slot];
        if let Some(t) = target {
            self.ensure_live(head_entity, t)?;
        }

        let previous = {
            let inst = self.tables[entity]
                .instances
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(&def.name, "id", id))?;
            match std::mem::replace(&mut inst.relations[slot], RelationValue::One(target)) {
                RelationValue::One(prev) => prev,
                RelationValue::Many(_) => None,
            }
        };

        if let Some(view) = def.relation_view[slot] {
            if let Some(prev) = previous {
                self.view_remove(head_entity, view, prev, id);
            }
            if let Some(t) = target {
                self.view_insert(head_entity, view, t, id);
            }
        }

        Ok(UndoOp::RelationSet {
            entity,
            id,
            slot,
            previous,
        })
    }

    /// Adds a member to a to-many relation.
    ///
    /// Adding a member that is already present is a no-op and records
    /// nothing to undo.
    pub fn add_to_relation(
        &mut self,
        entity: usize,
        id: InstanceId,
        slot: usize,
        member: InstanceId,
    ) -> CoreResult<Option<UndoOp>> {
        let schema = Arc::clone(&self.schema);
        let def = schema.entity(entity);
        let rel = &def.relations[slot];
        if rel.cardinality != Cardinality::Many {
            return Err(CoreError::malformed(format!(
                "relation {}.{} is to-one; use set",
                def.name, rel.name
            )));
        }

        let head_entity = def.relation_target[slot];
        self.ensure_live(head_entity, member)?;

        let inserted = {
            let inst = self.tables[entity]
                .instances
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(&def.name, "id", id))?;
            match &mut inst.relations[slot] {
                RelationValue::Many(set) => set.insert(member),
                RelationValue::One(_) => false,
            }
        };
        if !inserted {
            return Ok(None);
        }

        if let Some(view) = def.relation_view[slot] {
            self.view_insert(head_entity, view, member, id);
        }

        Ok(Some(UndoOp::RelationAdded {
            entity,
            id,
            slot,
            member,
        }))
    }

    /// Removes a member from a to-many relation.
    ///
    /// Removing an absent member is a no-op.
    pub fn remove_from_relation(
        &mut self,
        entity: usize,
        id: InstanceId,
        slot: usize,
        member: InstanceId,
    ) -> CoreResult<Option<UndoOp>> {
        let schema = Arc::clone(&self.schema);
        let def = schema.entity(entity);
        let rel = &def.relations[slot];
        if rel.cardinality != Cardinality::Many {
            return Err(CoreError::malformed(format!(
                "relation {}.{} is to-one; use set",
                def.name, rel.name
            )));
        }

        let removed = {
            let inst = self.tables[entity]
                .instances
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(&def.name, "id", id))?;
            match &mut inst.relations[slot] {
                RelationValue::Many(set) => set.remove(&member),
                RelationValue::One(_) => false,
            }
        };
        if !removed {
            return Ok(None);
        }

        if let Some(view) = def.relation_view[slot] {
            let head_entity = def.relation_target[slot];
            self.view_remove(head_entity, view, member, id);
        }

        Ok(Some(UndoOp::RelationRemoved {
            entity,
            id,
            slot,
            member,
        }))
    }

    /// Clears a relation: a to-many loses all members, a to-one is unset.
    pub fn clear_relation(
        &mut self,
        entity: usize,
        id: InstanceId,
        slot: usize,
    ) -> CoreResult<UndoOp> {
        let schema = Arc::clone(&self.schema);
        let def = schema.entity(entity);
        if def.relations[slot].cardinality == Cardinality::One {
            return self.set_relation(entity, id, slot, None);
        }

        let previous = {
            let inst = self.tables[entity]
                .instances
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(&def.name, "id", id))?;
            match std::mem::replace(&mut inst.relations[slot], RelationValue::Many(BTreeSet::new()))
            {
                RelationValue::Many(set) => set,
                RelationValue::One(_) => BTreeSet::new(),
            }
        };

        if let Some(view) = def.relation_view[slot] {
            let head_entity = def.relation_target[slot];
            for member in &previous {
                self.view_remove(head_entity, view, *member, id);
            }
        }

        Ok(UndoOp::RelationCleared {
            entity,
            id,
            slot,
            previous,
        })
    }

    /// Deletes an instance.
    ///
    /// Forward relations held by *other* instances that reference the
    /// deleted one are left dangling; only the derived reciprocal views
    /// reflect the deletion, atomically.
    pub fn delete(&mut self, entity: usize, id: InstanceId) -> CoreResult<UndoOp> {
        let schema = Arc::clone(&self.schema);
        let def = schema.entity(entity);

        let instance = self.tables[entity]
            .instances
            .remove(&id)
            .ok_or_else(|| CoreError::not_found(&def.name, "id", id))?;

        // Unique index entries.
        for (slot, attr) in def.attributes.iter().enumerate() {
            if attr.unique && !instance.attributes[slot].is_null() {
                self.tables[entity].unique[slot].remove(&instance.attributes[slot]);
            }
        }

        // Contributions this instance made as a tail.
        for slot in 0..def.relations.len() {
            if let Some(view) = def.relation_view[slot] {
                let head_entity = def.relation_target[slot];
                let targets: Vec<InstanceId> = instance.relations[slot].targets().collect();
                for head in targets {
                    self.view_remove(head_entity, view, head, id);
                }
            }
        }

        // View entries where this instance was the head.
        let mut head_views = Vec::new();
        for view_idx in 0..def.reciprocals.len() {
            if let Some(tails) = self.tables[entity].views[view_idx].remove(&id) {
                head_views.push((view_idx, tails));
            }
        }

        Ok(UndoOp::Deleted {
            entity,
            instance: Box::new(instance),
            head_views,
        })
    }

    // ------------------------------------------------------------------
    // Rollback
    // ------------------------------------------------------------------

    /// Applies the inverse of one recorded mutation.
    ///
    /// Must be called in reverse recording order; see [`UndoOp`].
    pub fn undo(&mut self, op: UndoOp) {
        let schema = Arc::clone(&self.schema);
        match op {
            UndoOp::AttributeSet {
                entity,
                id,
                slot,
                previous,
            } => {
                let unique = schema.entity(entity).attributes[slot].unique;
                let table = &mut self.tables[entity];
                let current = {
                    let Some(inst) = table.instances.get_mut(&id) else {
                        return;
                    };
                    std::mem::replace(&mut inst.attributes[slot], previous.clone())
                };
                if unique {
                    if !current.is_null() {
                        table.unique[slot].remove(&current);
                    }
                    if !previous.is_null() {
                        table.unique[slot].insert(previous, id);
                    }
                }
            }

            UndoOp::RelationSet {
                entity,
                id,
                slot,
                previous,
            } => {
                let def = schema.entity(entity);
                let head_entity = def.relation_target[slot];
                let view = def.relation_view[slot];
                let current = {
                    let Some(inst) = self.tables[entity].instances.get_mut(&id) else {
                        return;
                    };
                    match std::mem::replace(&mut inst.relations[slot], RelationValue::One(previous))
                    {
                        RelationValue::One(cur) => cur,
                        RelationValue::Many(_) => None,
                    }
                };
                if let Some(view) = view {
                    if let Some(cur) = current {
                        self.view_remove(head_entity, view, cur, id);
                    }
                    if let Some(prev) = previous {
                        self.view_insert(head_entity, view, prev, id);
                    }
                }
            }

            UndoOp::RelationAdded {
                entity,
                id,
                slot,
                member,
            } => {
                let def = schema.entity(entity);
                if let Some(inst) = self.tables[entity].instances.get_mut(&id) {
                    if let RelationValue::Many(set) = &mut inst.relations[slot] {
                        set.remove(&member);
                    }
                }
                if let Some(view) = def.relation_view[slot] {
                    let head_entity = def.relation_target[slot];
                    self.view_remove(head_entity, view, member, id);
                }
            }

            UndoOp::RelationRemoved {
                entity,
                id,
                slot,
                member,
            } => {
                let def = schema.entity(entity);
                if let Some(inst) = self.tables[entity].instances.get_mut(&id) {
                    if let RelationValue::Many(set) = &mut inst.relations[slot] {
                        set.insert(member);
                    }
                }
                if let Some(view) = def.relation_view[slot] {
                    let head_entity = def.relation_target[slot];
                    self.view_insert(head_entity, view, member, id);
                }
            }

            UndoOp::RelationCleared {
                entity,
                id,
                slot,
                previous,
            } => {
                let def = schema.entity(entity);
                if let Some(inst) = self.tables[entity].instances.get_mut(&id) {
                    inst.relations[slot] = RelationValue::Many(previous.clone());
                }
                if let Some(view) = def.relation_view[slot] {
                    let head_entity = def.relation_target[slot];
                    for member in previous {
                        self.view_insert(head_entity, view, member, id);
                    }
                }
            }

            UndoOp::Created { entity, id } => {
                // LIFO unwinding guarantees the instance is back to pristine
                // here, so no index entries remain to clean up.
                let table = &mut self.tables[entity];
                table.instances.remove(&id);
                table.next_id = id.as_u64();
            }

            UndoOp::Deleted {
                entity,
                instance,
                head_views,
            } => {
                let def = schema.entity(entity);
                let id = instance.id;

                // Unique entries.
                for (slot, attr) in def.attributes.iter().enumerate() {
                    if attr.unique && !instance.attributes[slot].is_null() {
                        self.tables[entity].unique[slot]
                            .insert(instance.attributes[slot].clone(), id);
                    }
                }
                // As-head view entries first. `delete` captured them after
                // the instance's own forward relations were unwound, so a
                // self-edge is only recovered by the as-tail pass below,
                // which must merge into the restored sets.
                for (view_idx, tails) in head_views {
                    self.tables[entity].views[view_idx]
                        .entry(id)
                        .or_default()
                        .extend(tails);
                }
                // As-tail contributions.
                for slot in 0..def.relations.len() {
                    if let Some(view) = def.relation_view[slot] {
                        let head_entity = def.relation_target[slot];
                        let targets: Vec<InstanceId> = instance.relations[slot].targets().collect();
                        for head in targets {
                            self.view_insert(head_entity, view, head, id);
                        }
                    }
                }

                self.tables[entity].instances.insert(id, *instance);
            }

            UndoOp::ReadonlySet { previous } => {
                self.readonly = previous;
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_live(&self, entity: usize, id: InstanceId) -> CoreResult<()> {
        if self.tables[entity].instances.contains_key(&id) {
            Ok(())
        } else {
            Err(CoreError::not_found(
                &self.schema.entity(entity).name,
                "id",
                id,
            ))
        }
    }

    fn view_insert(&mut self, entity: usize, view: usize, head: InstanceId, tail: InstanceId) {
        self.tables[entity].views[view]
            .entry(head)
            .or_default()
            .insert(tail);
    }

    fn view_remove(&mut self, entity: usize, view: usize, head: InstanceId, tail: InstanceId) {
        if let Some(tails) = self.tables[entity].views[view].get_mut(&head) {
            tails.remove(&tail);
            if tails.is_empty() {
                self.tables[entity].views[view].remove(&head);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDef, EntityDef, RelationDef, ScalarType};

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
                    .relation(RelationDef::one("owner", "Person").reciprocal("owned_cars"))
                    .relation(RelationDef::many("drivers", "Person"))
                    .build(),
            )
            .build()
            .unwrap();
        StoreState::new(Arc::new(schema))
    }

    #[test]
    fn ids_are_monotonic_per_type() {
        let mut state = test_state();
        let (a, _) = state.create(0);
        let (b, _) = state.create(0);
        let (c, _) = state.create(1);
        assert_eq!(a.as_u64(), 0);
        assert_eq!(b.as_u64(), 1);
        assert_eq!(c.as_u64(), 0);
    }

    #[test]
    fn ids_not_reused_after_delete() {
        let mut state = test_state();
        let (a, _) = state.create(0);
        state.delete(0, a).unwrap();
        let (b, _) = state.create(0);
        assert_eq!(b.as_u64(), 1);
    }

    #[test]
    fn unique_index_lookup() {
        let mut state = test_state();
        let (id, _) = state.create(0);
        state
            .set_attribute(0, id, 0, Value::from("john"))
            .unwrap();

        assert_eq!(state.get_by_unique(0, 0, &Value::from("john")), Some(id));
        assert_eq!(state.get_by_unique(0, 0, &Value::from("jane")), None);
    }

    #[test]
    fn unique_conflict_changes_nothing() {
        let mut state = test_state();
        let (a, _) = state.create(0);
        let (b, _) = state.create(0);
        state.set_attribute(0, a, 0, Value::from("john")).unwrap();
        state.set_attribute(0, b, 0, Value::from("jane")).unwrap();

        let err = state
            .set_attribute(0, b, 0, Value::from("john"))
            .unwrap_err();
        assert!(matches!(err, CoreError::UniqueConstraint { .. }));

        // b keeps its old value and index entry.
        assert_eq!(state.get(0, b).unwrap().attribute(0), &Value::from("jane"));
        assert_eq!(state.get_by_unique(0, 0, &Value::from("jane")), Some(b));
    }

    #[test]
    fn resetting_same_unique_value_is_allowed() {
        let mut state = test_state();
        let (a, _) = state.create(0);
        state.set_attribute(0, a, 0, Value::from("john")).unwrap();
        state.set_attribute(0, a, 0, Value::from("john")).unwrap();
        assert_eq!(state.get_by_unique(0, 0, &Value::from("john")), Some(a));
    }

    #[test]
    fn null_unique_values_never_collide() {
        let mut state = test_state();
        let (a, _) = state.create(0);
        let (b, _) = state.create(0);
        state.set_attribute(0, a, 0, Value::Null).unwrap();
        state.set_attribute(0, b, 0, Value::Null).unwrap();
        assert_eq!(state.get_by_unique(0, 0, &Value::Null), None);
    }

    #[test]
    fn reciprocal_view_tracks_forward_relation() {
        let mut state = test_state();
        let (john, _) = state.create(0);
        let (car, _) = state.create(1);

        state.set_relation(1, car, 0, Some(john)).unwrap();
        assert_eq!(state.reciprocal(0, 0, john), vec![car]);

        state.set_relation(1, car, 0, None).unwrap();
        assert!(state.reciprocal(0, 0, john).is_empty());
    }

    #[test]
    fn deleting_tail_updates_view_atomically() {
        let mut state = test_state();
        let (john, _) = state.create(0);
        let (car, _) = state.create(1);
        state.set_relation(1, car, 0, Some(john)).unwrap();

        state.delete(1, car).unwrap();
        assert!(state.reciprocal(0, 0, john).is_empty());
    }

    #[test]
    fn delete_does_not_cascade_forward_relations() {
        let mut state = test_state();
        let (john, _) = state.create(0);
        let (car, _) = state.create(1);
        state.set_relation(1, car, 0, Some(john)).unwrap();

        // Deleting the head leaves the car's forward reference dangling.
        state.delete(0, john).unwrap();
        match state.get(1, car).unwrap().relation(0) {
            RelationValue::One(target) => assert_eq!(*target, Some(john)),
            RelationValue::Many(_) => panic!("wrong cardinality"),
        }
    }

    #[test]
    fn relation_target_must_be_live() {
        let mut state = test_state();
        let (car, _) = state.create(1);
        let err = state
            .set_relation(1, car, 0, Some(InstanceId::new(9)))
            .unwrap_err();
        assert!(matches!(err, CoreError::ObjectNotFound { .. }));
    }

    #[test]
    fn many_relation_add_remove_clear() {
        let mut state = test_state();
        let (john, _) = state.create(0);
        let (jane, _) = state.create(0);
        let (car, _) = state.create(1);

        state.add_to_relation(1, car, 1, john).unwrap();
        state.add_to_relation(1, car, 1, jane).unwrap();
        // Re-adding is a no-op.
        assert!(state.add_to_relation(1, car, 1, john).unwrap().is_none());

        state.remove_from_relation(1, car, 1, john).unwrap();
        match state.get(1, car).unwrap().relation(1) {
            RelationValue::Many(set) => assert_eq!(set.len(), 1),
            RelationValue::One(_) => panic!("wrong cardinality"),
        }

        state.clear_relation(1, car, 1).unwrap();
        assert!(state.get(1, car).unwrap().relation(1).is_empty());
    }

    #[test]
    fn undo_restores_exact_state() {
        let mut state = test_state();
        let (john, _) = state.create(0);
        state.set_attribute(0, john, 0, Value::from("john")).unwrap();

        let mut undo = Vec::new();
        let (car, op) = state.create(1);
        undo.push(op);
        undo.push(state.set_attribute(1, car, 0, Value::from("X-1")).unwrap());
        undo.push(state.set_relation(1, car, 0, Some(john)).unwrap());
        undo.push(state.set_attribute(0, john, 0, Value::from("johnny")).unwrap());
        undo.push(state.delete(0, john).unwrap());

        for op in undo.into_iter().rev() {
            state.undo(op);
        }

        assert_eq!(state.get(0, john).unwrap().attribute(0), &Value::from("john"));
        assert_eq!(state.get_by_unique(0, 0, &Value::from("john")), Some(john));
        assert_eq!(state.get_by_unique(0, 0, &Value::from("johnny")), None);
        assert!(state.get(1, car).is_none());
        assert_eq!(state.tables[1].next_id, 0);
        assert!(state.reciprocal(0, 0, john).is_empty());
        assert!(state.get_by_unique(1, 0, &Value::from("X-1")).is_none());
    }

    #[test]
    fn undo_delete_restores_views_and_indices() {
        let mut state = test_state();
        let (john, _) = state.create(0);
        let (car, _) = state.create(1);
        state.set_attribute(1, car, 0, Value::from("X-1")).unwrap();
        state.set_relation(1, car, 0, Some(john)).unwrap();

        let op = state.delete(1, car).unwrap();
        assert!(state.reciprocal(0, 0, john).is_empty());

        state.undo(op);
        assert_eq!(state.reciprocal(0, 0, john), vec![car]);
        assert_eq!(state.get_by_unique(1, 0, &Value::from("X-1")), Some(car));
    }

    #[test]
    fn undo_delete_restores_self_referential_views() {
        let schema = Schema::builder()
            .entity(
                EntityDef::builder("Person")
                    .attribute(AttributeDef::new("name", ScalarType::Text).unique())
                    .relation(RelationDef::many("likes", "Person").reciprocal("liked_by"))
                    .build(),
            )
            .build()
            .unwrap();
        let mut state = StoreState::new(Arc::new(schema));

        let (x, _) = state.create(0);
        let (y, _) = state.create(0);
        state.add_to_relation(0, x, 0, x).unwrap();
        state.add_to_relation(0, y, 0, x).unwrap();
        assert_eq!(state.reciprocal(0, 0, x), vec![x, y]);

        let op = state.delete(0, x).unwrap();
        state.undo(op);

        // The self-edge and the other tail both survive the round trip.
        assert_eq!(state.reciprocal(0, 0, x), vec![x, y]);
        match state.get(0, x).unwrap().relation(0) {
            RelationValue::Many(set) => assert!(set.contains(&x)),
            RelationValue::One(_) => panic!("wrong cardinality"),
        }
    }

    #[test]
    fn type_mismatch_is_malformed() {
        let mut state = test_state();
        let (john, _) = state.create(0);
        let err = state
            .set_attribute(0, john, 0, Value::Integer(3))
            .unwrap_err();
        assert!(matches!(err, CoreError::MalformedCommand { .. }));
    }
}
