//! # LoomDB Storage
//!
//! Persistence channels for LoomDB stores.
//!
//! A store persists through two independent channels, both of which treat
//! payloads as **opaque bytes** - serialization lives in `loomdb_codec` and
//! the channels never interpret what they carry:
//!
//! - [`TransactionLog`] - the append-only, ordered history of committed
//!   transactions, read back during recovery replay.
//! - [`SnapshotStore`] - full point-in-time state dumps, keyed by the
//!   transaction id they were taken at.
//!
//! ## Available implementations
//!
//! - [`InMemoryLog`] / [`InMemorySnapshotStore`] - for testing and ephemeral
//!   stores
//! - [`FileLog`] / [`FileSnapshotStore`] - persistent, single-directory
//!   layout managed by [`StoreDir`]
//!
//! ## Example
//!
//! ```rust
//! use loomdb_storage::{InMemoryLog, TransactionLog};
//! use std::time::Duration;
//!
//! let mut log = InMemoryLog::new();
//! log.append(1, b"first").unwrap();
//! log.append(2, b"second").unwrap();
//!
//! log.seek(1).unwrap();
//! let (id, bytes) = log.poll_next(Duration::ZERO).unwrap().unwrap();
//! assert_eq!(id, 2);
//! assert_eq!(bytes, b"second");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod dir;
mod error;
mod file_log;
mod file_snapshot;
mod memory;

pub use channel::{SnapshotStore, TransactionLog};
pub use dir::StoreDir;
pub use error::{StorageError, StorageResult};
pub use file_log::FileLog;
pub use file_snapshot::FileSnapshotStore;
pub use memory::{InMemoryLog, InMemorySnapshotStore};
