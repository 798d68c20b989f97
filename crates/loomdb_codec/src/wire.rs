//! Wire structs for transaction records and snapshots.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One command inside a transaction record: type name plus parameter map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandCall {
    /// Command type name, resolved against the registry.
    pub name: String,
    /// Named parameter values.
    pub params: BTreeMap<String, Value>,
}

impl CommandCall {
    /// Creates a call with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a parameter value.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// An ordered batch of commands: the unit of atomicity and log appension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction id, equal to the record's position in the log order.
    pub id: u64,
    /// Caller-supplied correlation id.
    pub sync_id: String,
    /// Application model version in effect when the batch committed.
    pub model_version: u64,
    /// Commands in submission order.
    pub commands: Vec<CommandCall>,
}

/// The relation values of one instance as persisted in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationSnapshot {
    /// A to-one relation: target instance id, if set.
    One(Option<u64>),
    /// A to-many relation: target instance ids in ascending order.
    Many(Vec<u64>),
}

/// One live instance in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    /// Immutable instance id.
    pub id: u64,
    /// Attribute values by attribute name; nulls are omitted.
    pub attributes: BTreeMap<String, Value>,
    /// Relation values by relation name.
    pub relations: BTreeMap<String, RelationSnapshot>,
}

/// All state of one entity type in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity type name.
    pub name: String,
    /// The id the next created instance would receive.
    pub next_id: u64,
    /// Every live instance.
    pub instances: Vec<InstanceSnapshot>,
}

/// A full point-in-time dump of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The transaction id this snapshot was taken at.
    pub transaction_id: u64,
    /// Application model version recorded when the snapshot was written.
    ///
    /// `None` on snapshots written before versioning was recorded; loading
    /// such a snapshot adopts the opening store's version as baseline.
    pub model_version: Option<u64>,
    /// Whether the store was in readonly mode at snapshot time.
    pub readonly: bool,
    /// Per-entity-type state.
    pub entities: Vec<EntitySnapshot>,
}

/// Serializes a transaction record to CBOR bytes.
pub fn serialize_transaction(record: &TransactionRecord) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(record, &mut buf).map_err(CodecError::encode)?;
    Ok(buf)
}

/// Deserializes a transaction record from CBOR bytes.
pub fn deserialize_transaction(bytes: &[u8]) -> CodecResult<TransactionRecord> {
    ciborium::from_reader(bytes).map_err(CodecError::decode)
}

/// Serializes a snapshot to CBOR bytes.
pub fn serialize_snapshot(snapshot: &Snapshot) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(snapshot, &mut buf).map_err(CodecError::encode)?;
    Ok(buf)
}

/// Deserializes a snapshot from CBOR bytes.
pub fn deserialize_snapshot(bytes: &[u8]) -> CodecResult<Snapshot> {
    ciborium::from_reader(bytes).map_err(CodecError::decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_roundtrip() {
        let record = TransactionRecord {
            id: 3,
            sync_id: "client-17".to_string(),
            model_version: 2,
            commands: vec![
                CommandCall::new("create_person").param("name", "john"),
                CommandCall::new("create_car")
                    .param("plate", "X-1")
                    .param("owner", 0i64),
            ],
        };

        let bytes = serialize_transaction(&record).unwrap();
        assert_eq!(deserialize_transaction(&bytes).unwrap(), record);
    }

    #[test]
    fn snapshot_roundtrip() {
        let snapshot = Snapshot {
            transaction_id: 9,
            model_version: Some(4),
            readonly: false,
            entities: vec![EntitySnapshot {
                name: "Person".to_string(),
                next_id: 2,
                instances: vec![InstanceSnapshot {
                    id: 0,
                    attributes: [("name".to_string(), Value::from("john"))].into(),
                    relations: [
                        ("spouse".to_string(), RelationSnapshot::One(Some(1))),
                        ("pets".to_string(), RelationSnapshot::Many(vec![0, 3])),
                    ]
                    .into(),
                }],
            }],
        };

        let bytes = serialize_snapshot(&snapshot).unwrap();
        assert_eq!(deserialize_snapshot(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(deserialize_transaction(b"not cbor").is_err());
        assert!(deserialize_snapshot(&[0xff, 0x00]).is_err());
    }
}
