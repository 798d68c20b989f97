//! Store directory layout and locking.
//!
//! A persistent LoomDB store lives in one directory:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK          # Advisory lock for single-opener
//! ├─ txn.log       # Transaction log (FileLog)
//! └─ snapshots/    # Snapshot files (FileSnapshotStore)
//! ```
//!
//! The LOCK file ensures only one process opens the store at a time; the
//! single-logical-writer guarantee starts here.

use crate::error::{StorageError, StorageResult};
use crate::file_log::FileLog;
use crate::file_snapshot::FileSnapshotStore;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "txn.log";
const SNAPSHOT_DIR: &str = "snapshots";

/// Manages a store directory and holds its exclusive lock.
///
/// # Thread Safety
///
/// Only one `StoreDir` instance can exist per directory at a time, across
/// processes. The lock is released when the `StoreDir` is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory and acquires its lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the lock,
    /// or an I/O error.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(StorageError::corrupted(format!(
                "store path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the transaction log for this store.
    pub fn open_log(&self) -> StorageResult<FileLog> {
        FileLog::open(&self.path.join(LOG_FILE))
    }

    /// Opens the snapshot store for this store.
    pub fn open_snapshots(&self) -> StorageResult<FileSnapshotStore> {
        FileSnapshotStore::open(&self.path.join(SNAPSHOT_DIR))
    }
}
