//! Persistence channel traits.

use crate::error::StorageResult;
use std::time::Duration;

/// The append-only transaction history of one store.
///
/// Logs are **opaque byte channels**. The core serializes transaction
/// records through `loomdb_codec` and hands the channel `(id, bytes)` pairs;
/// the channel never interprets payloads.
///
/// # Invariants
///
/// - `append` is durable once it returns: the entry survives process
///   termination.
/// - Entries are totally ordered by transaction id; `append` must reject ids
///   that do not advance the log.
/// - `poll_next` yields entries strictly in id order relative to the current
///   cursor.
///
/// # Implementors
///
/// - [`crate::InMemoryLog`] - for testing
/// - [`crate::FileLog`] - persistent, CRC-framed file
pub trait TransactionLog: Send {
    /// Appends an entry and makes it durable.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` does not advance the log or on I/O failure.
    fn append(&mut self, id: u64, bytes: &[u8]) -> StorageResult<()>;

    /// Positions the read cursor immediately after `after`.
    ///
    /// A subsequent [`TransactionLog::poll_next`] returns the first entry
    /// with id greater than `after`. Passing `0` rewinds to the start.
    fn seek(&mut self, after: u64) -> StorageResult<()>;

    /// Reads the next entry at the cursor, waiting up to `timeout`.
    ///
    /// Returns `None` when the cursor is at the log head and no entry
    /// arrives within the timeout.
    fn poll_next(&mut self, timeout: Duration) -> StorageResult<Option<(u64, Vec<u8>)>>;

    /// Returns the id of the last appended entry, if any.
    fn last_id(&self) -> StorageResult<Option<u64>>;
}

/// Snapshot storage for one store.
///
/// Each snapshot is a full state dump keyed by the transaction id it was
/// taken at. Payloads are opaque bytes.
pub trait SnapshotStore: Send {
    /// Durably writes a snapshot for the given transaction id.
    ///
    /// Overwrites any existing snapshot with the same id.
    fn write(&mut self, transaction_id: u64, bytes: &[u8]) -> StorageResult<()>;

    /// Reads the snapshot taken at `transaction_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::SnapshotNotFound`] if absent.
    fn read(&self, transaction_id: u64) -> StorageResult<Vec<u8>>;

    /// Lists available snapshot ids in ascending order.
    fn list(&self) -> StorageResult<Vec<u64>>;

    /// Deletes the snapshot taken at `transaction_id`.
    ///
    /// Deleting a missing snapshot is not an error.
    fn delete(&mut self, transaction_id: u64) -> StorageResult<()>;
}
