//! Snapshot materialization and crash recovery.
//!
//! Opening a store loads the newest snapshot (if any), rebuilds the
//! in-memory state and all derived indices from it, then replays every
//! log record past the snapshot's transaction id. Replay reruns the
//! recorded commands through the normal executor, so the recovered state
//! is exactly the state the original commands produced.
//!
//! Anything that breaks determinism here is fatal: a model version newer
//! than the one being opened, a snapshot whose instance ids contradict
//! its own next-id counters, or a recorded command that no longer
//! executes cleanly. Such a store refuses to open rather than continue
//! from a state it cannot trust.

use crate::command;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::schema::{Cardinality, Schema};
use crate::state::{RelationValue, StoreState};
use crate::txn::WriteTransaction;
use crate::types::{InstanceId, ModelVersion, TransactionId};
use loomdb_codec::{
    deserialize_snapshot, deserialize_transaction, serialize_snapshot, EntitySnapshot,
    InstanceSnapshot, RelationSnapshot, Snapshot,
};
use loomdb_storage::{SnapshotStore, TransactionLog};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Serializes the committed state into a wire snapshot.
pub(crate) fn encode_state(
    state: &StoreState,
    last: TransactionId,
    model_version: ModelVersion,
) -> CoreResult<Vec<u8>> {
    let schema = state.schema();
    let mut entities = Vec::with_capacity(schema.entities().len());
    for (index, def) in schema.entities().iter().enumerate() {
        let mut instances = Vec::new();
        for id in state.list(index) {
            let inst = state
                .get(index, id)
                .ok_or_else(|| CoreError::store("instance vanished during snapshot"))?;

            let mut attributes = BTreeMap::new();
            for (slot, attr) in def.attributes.iter().enumerate() {
                let value = inst.attribute(slot);
                if !value.is_null() {
                    attributes.insert(attr.name.clone(), value.clone());
                }
            }

            let mut relations = BTreeMap::new();
            for (slot, rel) in def.relations.iter().enumerate() {
                match inst.relation(slot) {
                    RelationValue::One(Some(target)) => {
                        relations.insert(rel.name.clone(), RelationSnapshot::One(Some(target.as_u64())));
                    }
                    RelationValue::One(None) => {}
                    RelationValue::Many(members) if !members.is_empty() => {
                        relations.insert(
                            rel.name.clone(),
                            RelationSnapshot::Many(members.iter().map(|m| m.as_u64()).collect()),
                        );
                    }
                    RelationValue::Many(_) => {}
                }
            }

            instances.push(InstanceSnapshot {
                id: id.as_u64(),
                attributes,
                relations,
            });
        }

        entities.push(EntitySnapshot {
            name: def.name.clone(),
            next_id: state.tables[index].next_id,
            instances,
        });
    }

    let snapshot = Snapshot {
        transaction_id: last.as_u64(),
        model_version: Some(model_version.as_u64()),
        readonly: state.readonly(),
        entities,
    };
    Ok(serialize_snapshot(&snapshot)?)
}

/// Rebuilds store state from a wire snapshot, derived indices included.
pub(crate) fn decode_state(
    schema: &Arc<Schema>,
    config: &StoreConfig,
    bytes: &[u8],
) -> CoreResult<(StoreState, TransactionId)> {
    let snapshot = deserialize_snapshot(bytes)?;

    if let Some(recorded) = snapshot.model_version {
        if recorded > config.model_version.as_u64() {
            return Err(CoreError::unrecoverable(format!(
                "snapshot was written by model version {recorded}, opening with {}",
                config.model_version
            )));
        }
    }

    let mut state = StoreState::new(Arc::clone(schema));
    state.readonly = snapshot.readonly;

    // First pass: instances, attributes, unique indices, next-id checks.
    for entity_snap in &snapshot.entities {
        let index = schema.entity_index(&entity_snap.name).ok_or_else(|| {
            CoreError::unrecoverable(format!(
                "snapshot contains unknown entity {}",
                entity_snap.name
            ))
        })?;
        let def = schema.entity(index);
        state.tables[index].next_id = entity_snap.next_id;

        for inst_snap in &entity_snap.instances {
            if inst_snap.id >= entity_snap.next_id {
                return Err(CoreError::unrecoverable(format!(
                    "snapshot instance {}#{} at or past its next id {}",
                    entity_snap.name, inst_snap.id, entity_snap.next_id
                )));
            }
            let id = InstanceId::new(inst_snap.id);
            let many: Vec<bool> = def
                .relations
                .iter()
                .map(|r| r.cardinality == Cardinality::Many)
                .collect();
            let mut instance = crate::state::Instance::pristine(id, def.attributes.len(), &many);

            for (name, value) in &inst_snap.attributes {
                let slot = def.attribute_slot(name).ok_or_else(|| {
                    CoreError::unrecoverable(format!(
                        "snapshot references unknown attribute {}.{name}",
                        entity_snap.name
                    ))
                })?;
                let attr = &def.attributes[slot];
                let value = attr.ty.convert(value).ok_or_else(|| {
                    CoreError::unrecoverable(format!(
                        "snapshot value for {}.{name} is not {}",
                        entity_snap.name,
                        attr.ty.name()
                    ))
                })?;
                if attr.unique {
                    let displaced = state.tables[index].unique[slot].insert(value.clone(), id);
                    if displaced.is_some() {
                        return Err(CoreError::unrecoverable(format!(
                            "snapshot has duplicate unique value for {}.{name}",
                            entity_snap.name
                        )));
                    }
                }
                instance.attributes[slot] = value;
            }

            for (name, rel_snap) in &inst_snap.relations {
                let slot = def.relation_slot(name).ok_or_else(|| {
                    CoreError::unrecoverable(format!(
                        "snapshot references unknown relation {}.{name}",
                        entity_snap.name
                    ))
                })?;
                let rel = &def.relations[slot];
                instance.relations[slot] = match (rel.cardinality, rel_snap) {
                    (Cardinality::One, RelationSnapshot::One(target)) => {
                        RelationValue::One(target.map(InstanceId::new))
                    }
                    (Cardinality::Many, RelationSnapshot::Many(members)) => RelationValue::Many(
                        members.iter().copied().map(InstanceId::new).collect(),
                    ),
                    _ => {
                        return Err(CoreError::unrecoverable(format!(
                            "snapshot relation {}.{name} has the wrong cardinality",
                            entity_snap.name
                        )));
                    }
                };
            }

            state.tables[index].instances.insert(id, instance);
        }
    }

    // Second pass: reciprocal views, now that liveness of every target is
    // known. Dangling forward references contribute nothing, matching
    // live deletion semantics.
    for index in 0..schema.entities().len() {
        let def = schema.entity(index);
        for slot in 0..def.relations.len() {
            let Some(view) = def.relation_view[slot] else {
                continue;
            };
            let head_entity = def.relation_target[slot];
            let edges: Vec<(InstanceId, InstanceId)> = state.tables[index]
                .instances
                .iter()
                .flat_map(|(tail, inst)| {
                    inst.relation(slot).targets().map(move |head| (*tail, head))
                })
                .collect();
            for (tail, head) in edges {
                if state.tables[head_entity].instances.contains_key(&head) {
                    state.tables[head_entity].views[view]
                        .entry(head)
                        .or_default()
                        .insert(tail);
                }
            }
        }
    }

    Ok((state, TransactionId::new(snapshot.transaction_id)))
}

/// Loads the newest snapshot and replays the log tail.
///
/// Returns the recovered state and the id of the last applied
/// transaction; the writer resumes numbering right after it.
pub(crate) fn recover(
    schema: &Arc<Schema>,
    config: &StoreConfig,
    log: &mut dyn TransactionLog,
    snapshots: &dyn SnapshotStore,
) -> CoreResult<(StoreState, TransactionId)> {
    let (mut state, mut last) = match snapshots.list()?.into_iter().max() {
        Some(newest) => {
            debug!(store = %config.name, snapshot = newest, "loading snapshot");
            let bytes = snapshots.read(newest)?;
            decode_state(schema, config, &bytes)?
        }
        None => (StoreState::new(Arc::clone(schema)), TransactionId::ZERO),
    };

    log.seek(last.as_u64())?;
    let mut replayed = 0u64;
    while let Some((id, bytes)) = log.poll_next(config.replay_poll_timeout)? {
        let record = deserialize_transaction(&bytes)?;
        if record.id != id {
            return Err(CoreError::unrecoverable(format!(
                "log frame {id} carries record id {}",
                record.id
            )));
        }
        if record.model_version > config.model_version.as_u64() {
            return Err(CoreError::unrecoverable(format!(
                "transaction {id} was written by model version {}, opening with {}",
                record.model_version, config.model_version
            )));
        }

        let mut txn = WriteTransaction::new(&mut state);
        for call in &record.commands {
            if let Err(err) = command::execute(&mut txn, call) {
                return Err(CoreError::unrecoverable(format!(
                    "replay of transaction {id} failed at command {}: {err}",
                    call.name
                )));
            }
        }
        txn.commit();
        last = TransactionId::new(id);
        replayed += 1;
    }

    info!(
        store = %config.name,
        last = %last,
        replayed,
        "recovery complete"
    );
    Ok((state, last))
}
