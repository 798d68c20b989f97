//! Consuming mutation builders.
//!
//! Both builders funnel every change through the state's undo-recording
//! mutations, so a transaction that fails after a half-finished builder
//! still unwinds cleanly. Nonnull validation runs once, in `done()`,
//! which lets a command set fields in any order.

use crate::error::{CoreError, CoreResult};
use crate::schema::Cardinality;
use crate::txn::{ObjectRef, WriteTransaction};
use crate::types::InstanceId;
use loomdb_codec::Value;

fn attribute_slot(txn: &WriteTransaction<'_>, obj: &ObjectRef, name: &str) -> CoreResult<usize> {
    let def = txn.state().schema().entity(obj.entity);
    def.attribute_slot(name).ok_or_else(|| {
        CoreError::malformed(format!("unknown attribute {}.{name}", def.name))
    })
}

fn relation_slot(txn: &WriteTransaction<'_>, obj: &ObjectRef, name: &str) -> CoreResult<usize> {
    let def = txn.state().schema().entity(obj.entity);
    def.relation_slot(name).ok_or_else(|| {
        CoreError::malformed(format!("unknown relation {}.{name}", def.name))
    })
}

fn check_member(txn: &WriteTransaction<'_>, obj: &ObjectRef, slot: usize, member: &ObjectRef) -> CoreResult<()> {
    let def = txn.state().schema().entity(obj.entity);
    if def.relation_target[slot] != member.entity {
        return Err(CoreError::malformed(format!(
            "relation {}.{} targets {}, got an instance of {}",
            def.name,
            def.relations[slot].name,
            def.relations[slot].target,
            txn.state().schema().entity(member.entity).name
        )));
    }
    Ok(())
}

/// Validates that every non-nullable attribute is set and every
/// non-nullable to-one relation points somewhere.
fn validate_nonnull(txn: &WriteTransaction<'_>, obj: &ObjectRef) -> CoreResult<()> {
    let def = txn.state().schema().entity(obj.entity);
    let inst = txn
        .state()
        .get(obj.entity, obj.id)
        .ok_or_else(|| CoreError::not_found(&def.name, "id", obj.id))?;

    for (slot, attr) in def.attributes.iter().enumerate() {
        if !attr.nullable && inst.attribute(slot).is_null() {
            return Err(CoreError::nonnull_violation(&def.name, &attr.name));
        }
    }
    for (slot, rel) in def.relations.iter().enumerate() {
        if rel.cardinality == Cardinality::One && !rel.nullable && inst.relation(slot).is_empty() {
            return Err(CoreError::nonnull_violation(&def.name, &rel.name));
        }
    }
    Ok(())
}

/// Populates a freshly created instance.
///
/// Returned by [`WriteTransaction::insert`]; the instance exists in the
/// store from the moment of creation, but `done()` must pass before the
/// command can commit it.
#[must_use = "call done() to validate the new instance"]
pub struct InsertBuilder<'t, 'a> {
    txn: &'t mut WriteTransaction<'a>,
    obj: ObjectRef,
}

impl<'t, 'a> InsertBuilder<'t, 'a> {
    pub(crate) fn create(txn: &'t mut WriteTransaction<'a>, entity: usize) -> Self {
        let (id, op) = txn.state_mut().create(entity);
        txn.record(op);
        Self {
            txn,
            obj: ObjectRef { entity, id },
        }
    }

    /// Sets an attribute.
    pub fn set(self, attribute: &str, value: impl Into<Value>) -> CoreResult<Self> {
        let slot = attribute_slot(self.txn, &self.obj, attribute)?;
        let op = self
            .txn
            .state_mut()
            .set_attribute(self.obj.entity, self.obj.id, slot, value.into())?;
        self.txn.record(op);
        Ok(self)
    }

    /// Sets a to-one relation.
    pub fn relate(self, relation: &str, target: &ObjectRef) -> CoreResult<Self> {
        let slot = relation_slot(self.txn, &self.obj, relation)?;
        check_member(self.txn, &self.obj, slot, target)?;
        let op = self.txn.state_mut().set_relation(
            self.obj.entity,
            self.obj.id,
            slot,
            Some(target.id),
        )?;
        self.txn.record(op);
        Ok(self)
    }

    /// Adds members to a to-many relation.
    pub fn relate_many<'m>(
        self,
        relation: &str,
        members: impl IntoIterator<Item = &'m ObjectRef>,
    ) -> CoreResult<Self> {
        let slot = relation_slot(self.txn, &self.obj, relation)?;
        for member in members {
            check_member(self.txn, &self.obj, slot, member)?;
            if let Some(op) =
                self.txn
                    .state_mut()
                    .add_to_relation(self.obj.entity, self.obj.id, slot, member.id)?
            {
                self.txn.record(op);
            }
        }
        Ok(self)
    }

    /// Validates nonnull constraints and returns a ref to the instance.
    pub fn done(self) -> CoreResult<ObjectRef> {
        validate_nonnull(self.txn, &self.obj)?;
        Ok(self.obj)
    }

    /// The id allocated for the new instance.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.obj.id
    }
}

/// Modifies an existing instance.
///
/// Returned by [`WriteTransaction::update`]. Like inserts, the final
/// state must still satisfy nonnull constraints when `done()` runs.
#[must_use = "call done() to validate the updated instance"]
pub struct UpdateBuilder<'t, 'a> {
    txn: &'t mut WriteTransaction<'a>,
    obj: ObjectRef,
}

impl<'t, 'a> UpdateBuilder<'t, 'a> {
    pub(crate) fn open(txn: &'t mut WriteTransaction<'a>, obj: ObjectRef) -> Self {
        Self { txn, obj }
    }

    /// Sets an attribute.
    pub fn set(self, attribute: &str, value: impl Into<Value>) -> CoreResult<Self> {
        let slot = attribute_slot(self.txn, &self.obj, attribute)?;
        let op = self
            .txn
            .state_mut()
            .set_attribute(self.obj.entity, self.obj.id, slot, value.into())?;
        self.txn.record(op);
        Ok(self)
    }

    /// Sets a to-one relation.
    pub fn relate(self, relation: &str, target: &ObjectRef) -> CoreResult<Self> {
        let slot = relation_slot(self.txn, &self.obj, relation)?;
        check_member(self.txn, &self.obj, slot, target)?;
        let op = self.txn.state_mut().set_relation(
            self.obj.entity,
            self.obj.id,
            slot,
            Some(target.id),
        )?;
        self.txn.record(op);
        Ok(self)
    }

    /// Unsets a to-one relation.
    pub fn unrelate(self, relation: &str) -> CoreResult<Self> {
        let slot = relation_slot(self.txn, &self.obj, relation)?;
        let op = self
            .txn
            .state_mut()
            .set_relation(self.obj.entity, self.obj.id, slot, None)?;
        self.txn.record(op);
        Ok(self)
    }

    /// Adds a member to a to-many relation. Adding an existing member is
    /// a no-op.
    pub fn add(self, relation: &str, member: &ObjectRef) -> CoreResult<Self> {
        let slot = relation_slot(self.txn, &self.obj, relation)?;
        check_member(self.txn, &self.obj, slot, member)?;
        if let Some(op) =
            self.txn
                .state_mut()
                .add_to_relation(self.obj.entity, self.obj.id, slot, member.id)?
        {
            self.txn.record(op);
        }
        Ok(self)
    }

    /// Adds several members to a to-many relation.
    pub fn add_all<'m>(
        mut self,
        relation: &str,
        members: impl IntoIterator<Item = &'m ObjectRef>,
    ) -> CoreResult<Self> {
        for member in members {
            self = self.add(relation, member)?;
        }
        Ok(self)
    }

    /// Removes a member from a to-many relation. Removing an absent
    /// member is a no-op.
    pub fn remove(self, relation: &str, member: &ObjectRef) -> CoreResult<Self> {
        let slot = relation_slot(self.txn, &self.obj, relation)?;
        if let Some(op) =
            self.txn
                .state_mut()
                .remove_from_relation(self.obj.entity, self.obj.id, slot, member.id)?
        {
            self.txn.record(op);
        }
        Ok(self)
    }

    /// Removes several members from a to-many relation.
    pub fn remove_all<'m>(
        mut self,
        relation: &str,
        members: impl IntoIterator<Item = &'m ObjectRef>,
    ) -> CoreResult<Self> {
        for member in members {
            self = self.remove(relation, member)?;
        }
        Ok(self)
    }

    /// Empties a relation: a to-many loses all members, a to-one is unset.
    pub fn clear(self, relation: &str) -> CoreResult<Self> {
        let slot = relation_slot(self.txn, &self.obj, relation)?;
        let op = self
            .txn
            .state_mut()
            .clear_relation(self.obj.entity, self.obj.id, slot)?;
        self.txn.record(op);
        Ok(self)
    }

    /// Validates nonnull constraints and returns a ref to the instance.
    pub fn done(self) -> CoreResult<ObjectRef> {
        validate_nonnull(self.txn, &self.obj)?;
        Ok(self.obj)
    }
}
