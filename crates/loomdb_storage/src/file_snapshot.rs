//! File-backed snapshot store.

use crate::channel::SnapshotStore;
use crate::error::{StorageError, StorageResult};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name prefix and extension for snapshot files.
const SNAPSHOT_PREFIX: &str = "snapshot-";
const SNAPSHOT_EXT: &str = "loom";

/// A persistent snapshot store keeping one file per snapshot.
///
/// Snapshots are written as `snapshot-<transaction id>.loom` inside the
/// store directory. Writes go through a temporary file and an atomic rename
/// so a crash mid-write never leaves a half snapshot behind; `list` only
/// ever sees completed files.
#[derive(Debug)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Opens a snapshot store rooted at `dir`, creating it if needed.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Returns the directory snapshots are stored in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, transaction_id: u64) -> PathBuf {
        self.dir
            .join(format!("{SNAPSHOT_PREFIX}{transaction_id}.{SNAPSHOT_EXT}"))
    }

    /// Parses a snapshot file name back to its transaction id.
    fn parse_name(name: &str) -> Option<u64> {
        let rest = name.strip_prefix(SNAPSHOT_PREFIX)?;
        let id = rest.strip_suffix(&format!(".{SNAPSHOT_EXT}"))?;
        id.parse().ok()
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn write(&mut self, transaction_id: u64, bytes: &[u8]) -> StorageResult<()> {
        let final_path = self.path_for(transaction_id);
        let tmp_path = final_path.with_extension("tmp");

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;

        // Durably record the rename itself.
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    fn read(&self, transaction_id: u64) -> StorageResult<Vec<u8>> {
        let path = self.path_for(transaction_id);
        if !path.exists() {
            return Err(StorageError::SnapshotNotFound { transaction_id });
        }
        Ok(fs::read(&path)?)
    }

    fn list(&self) -> StorageResult<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = Self::parse_name(name) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn delete(&mut self, transaction_id: u64) -> StorageResult<()> {
        let path = self.path_for(transaction_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
