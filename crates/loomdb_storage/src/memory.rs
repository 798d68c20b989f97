//! In-memory channel implementations for testing.

use crate::channel::{SnapshotStore, TransactionLog};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// An in-memory transaction log.
///
/// Suitable for unit tests, integration tests, and ephemeral stores that do
/// not need persistence. Entries live in a shared `Vec`, so a log can be
/// cloned via [`InMemoryLog::handle`] to simulate "reopening" the same
/// durable history from a second store instance.
///
/// # Example
///
/// ```rust
/// use loomdb_storage::{InMemoryLog, TransactionLog};
///
/// let mut log = InMemoryLog::new();
/// log.append(1, b"payload").unwrap();
/// assert_eq!(log.last_id().unwrap(), Some(1));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryLog {
    entries: Arc<RwLock<Vec<(u64, Vec<u8>)>>>,
    cursor: usize,
}

impl InMemoryLog {
    /// Creates a new empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a second handle over the same entries with its own cursor.
    ///
    /// Useful for testing recovery: the "reopened" store reads the history
    /// the first instance wrote.
    #[must_use]
    pub fn handle(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            cursor: 0,
        }
    }

    /// Returns the number of entries in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl TransactionLog for InMemoryLog {
    fn append(&mut self, id: u64, bytes: &[u8]) -> StorageResult<()> {
        let mut entries = self.entries.write();
        if let Some(&(head, _)) = entries.last() {
            if id <= head {
                return Err(StorageError::NonMonotonicAppend { id, head });
            }
        }
        entries.push((id, bytes.to_vec()));
        Ok(())
    }

    fn seek(&mut self, after: u64) -> StorageResult<()> {
        let entries = self.entries.read();
        self.cursor = entries.partition_point(|&(id, _)| id <= after);
        Ok(())
    }

    fn poll_next(&mut self, _timeout: Duration) -> StorageResult<Option<(u64, Vec<u8>)>> {
        let entries = self.entries.read();
        match entries.get(self.cursor) {
            Some((id, bytes)) => {
                self.cursor += 1;
                Ok(Some((*id, bytes.clone())))
            }
            None => Ok(None),
        }
    }

    fn last_id(&self) -> StorageResult<Option<u64>> {
        Ok(self.entries.read().last().map(|&(id, _)| id))
    }
}

/// An in-memory snapshot store.
///
/// Like [`InMemoryLog`], the backing map is shared so [`InMemorySnapshotStore::handle`]
/// lets a second store instance see snapshots the first one wrote.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<RwLock<BTreeMap<u64, Vec<u8>>>>,
}

impl InMemorySnapshotStore {
    /// Creates a new empty snapshot store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a second handle over the same snapshots.
    #[must_use]
    pub fn handle(&self) -> Self {
        Self {
            snapshots: Arc::clone(&self.snapshots),
        }
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn write(&mut self, transaction_id: u64, bytes: &[u8]) -> StorageResult<()> {
        self.snapshots.write().insert(transaction_id, bytes.to_vec());
        Ok(())
    }

    fn read(&self, transaction_id: u64) -> StorageResult<Vec<u8>> {
        self.snapshots
            .read()
            .get(&transaction_id)
            .cloned()
            .ok_or(StorageError::SnapshotNotFound { transaction_id })
    }

    fn list(&self) -> StorageResult<Vec<u64>> {
        Ok(self.snapshots.read().keys().copied().collect())
    }

    fn delete(&mut self, transaction_id: u64) -> StorageResult<()> {
        self.snapshots.write().remove(&transaction_id);
        Ok(())
    }
}
