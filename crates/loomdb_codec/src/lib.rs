//! # LoomDB Codec
//!
//! Wire serialization for LoomDB.
//!
//! This crate owns the byte format of the two payloads a store persists:
//! committed [`TransactionRecord`]s (units of the log) and full state
//! [`Snapshot`]s. The core treats both as opaque bytes; storage channels
//! carry them without interpretation.
//!
//! The format is CBOR via `ciborium` over serde-derived structs.
//!
//! ## Example
//!
//! ```
//! use loomdb_codec::{serialize_transaction, deserialize_transaction, TransactionRecord};
//!
//! let record = TransactionRecord {
//!     id: 7,
//!     sync_id: "req-42".to_string(),
//!     model_version: 1,
//!     commands: Vec::new(),
//! };
//! let bytes = serialize_transaction(&record).unwrap();
//! let decoded = deserialize_transaction(&bytes).unwrap();
//! assert_eq!(decoded, record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod value;
mod wire;

pub use error::{CodecError, CodecResult};
pub use value::Value;
pub use wire::{
    deserialize_snapshot, deserialize_transaction, serialize_snapshot, serialize_transaction,
    CommandCall, EntitySnapshot, InstanceSnapshot, RelationSnapshot, Snapshot, TransactionRecord,
};
