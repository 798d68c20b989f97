//! The store facade.
//!
//! [`Store`] ties the pieces together: recovery at open, the writer
//! thread for mutations, lock-protected committed state for reads, and
//! snapshot maintenance. It is `Send + Sync`; clones of the submitted
//! futures are the only per-caller state.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::pipeline::{Committed, CommandFuture, QueuedBatch, Shared, TransactionBatch, Writer};
use crate::recovery;
use crate::schema::{self, Schema};
use crate::txn::ReadTransaction;
use crate::types::{ModelVersion, TransactionId};
use loomdb_storage::{
    InMemoryLog, InMemorySnapshotStore, SnapshotStore, StoreDir, TransactionLog,
};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::info;

/// An embedded, command-sourced object store.
///
/// All mutations go through [`submit`](Self::submit) as command batches;
/// reads run against the latest committed state and never wait on the
/// writer.
pub struct Store {
    shared: Arc<Shared>,
    snapshots: Mutex<Box<dyn SnapshotStore>>,
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedBatch>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    schema: Arc<Schema>,
    name: String,
    model_version: ModelVersion,
    // Held for its exclusive directory lock.
    _dir: Option<StoreDir>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("model_version", &self.model_version)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Opens a store over the given persistence channels, recovering
    /// state from the newest snapshot plus the log tail.
    pub fn open(
        schema: Schema,
        config: StoreConfig,
        mut log: Box<dyn TransactionLog>,
        snapshots: Box<dyn SnapshotStore>,
    ) -> CoreResult<Self> {
        let mut store = Self::open_inner(schema, config, &mut log, snapshots, None)?;
        store.spawn_writer(log)?;
        Ok(store)
    }

    /// Opens a purely in-memory store. State is lost on drop; useful for
    /// tests and caches.
    pub fn open_in_memory(schema: Schema, config: StoreConfig) -> CoreResult<Self> {
        Self::open(
            schema,
            config,
            Box::new(InMemoryLog::new()),
            Box::new(InMemorySnapshotStore::new()),
        )
    }

    /// Opens a store in a directory, taking its exclusive lock.
    pub fn open_dir(
        schema: Schema,
        config: StoreConfig,
        path: impl AsRef<Path>,
    ) -> CoreResult<Self> {
        let dir = StoreDir::open(path.as_ref())?;
        let mut log: Box<dyn TransactionLog> = Box::new(dir.open_log()?);
        let snapshots: Box<dyn SnapshotStore> = Box::new(dir.open_snapshots()?);
        let mut store = Self::open_inner(schema, config, &mut log, snapshots, Some(dir))?;
        store.spawn_writer(log)?;
        Ok(store)
    }

    fn open_inner(
        schema: Schema,
        config: StoreConfig,
        log: &mut Box<dyn TransactionLog>,
        snapshots: Box<dyn SnapshotStore>,
        dir: Option<StoreDir>,
    ) -> CoreResult<Self> {
        let schema = Arc::new(schema);
        let (state, last) = recovery::recover(&schema, &config, log.as_mut(), snapshots.as_ref())?;

        let shared = Arc::new(Shared {
            readonly: AtomicBool::new(state.readonly()),
            committed: RwLock::new(Committed { state, last }),
        });

        info!(store = %config.name, last = %last, "store opened");
        Ok(Self {
            shared,
            snapshots: Mutex::new(snapshots),
            sender: Mutex::new(None),
            writer: Mutex::new(None),
            schema,
            name: config.name,
            model_version: config.model_version,
            _dir: dir,
        })
    }

    fn spawn_writer(&mut self, log: Box<dyn TransactionLog>) -> CoreResult<()> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let committed = self.shared.committed.read();
        let writer = Writer::new(
            committed.state.clone(),
            log,
            committed.last,
            self.model_version,
            Arc::clone(&self.shared),
            receiver,
        );
        drop(committed);

        let handle = std::thread::Builder::new()
            .name(format!("{}-writer", self.name))
            .spawn(move || writer.run())
            .map_err(|e| CoreError::store(format!("failed to spawn writer thread: {e}")))?;
        *self.sender.lock() = Some(sender);
        *self.writer.lock() = Some(handle);
        Ok(())
    }

    /// The schema this store was opened with.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The id of the last committed transaction, [`TransactionId::ZERO`]
    /// before any commit.
    #[must_use]
    pub fn last_committed(&self) -> TransactionId {
        self.shared.committed.read().last
    }

    /// Whether the store currently rejects mutating submissions.
    #[must_use]
    pub fn readonly(&self) -> bool {
        self.shared.readonly.load(Ordering::Acquire)
    }

    /// Submits a command batch to the write pipeline.
    ///
    /// Returns one future per call, in call order; all of them settle
    /// together when the batch commits or aborts. In readonly mode, only
    /// batches made up of builtin commands are accepted.
    pub fn submit(&self, batch: TransactionBatch) -> CoreResult<Vec<CommandFuture>> {
        if batch.is_empty() {
            return Err(CoreError::malformed("empty transaction batch"));
        }
        if self.readonly() && batch.calls.iter().any(|c| !schema::is_builtin(&c.name)) {
            return Err(CoreError::ReadOnly);
        }

        let (queued, futures) = QueuedBatch::prepare(batch);
        let sender = self.sender.lock();
        sender
            .as_ref()
            .ok_or(CoreError::Closed)?
            .send(queued)
            .map_err(|_| CoreError::Closed)?;
        Ok(futures)
    }

    /// Runs a closure against a read transaction over the latest
    /// committed state.
    pub fn read<R>(&self, f: impl FnOnce(&ReadTransaction<'_>) -> R) -> R {
        let committed = self.shared.committed.read();
        f(&ReadTransaction::new(&committed.state))
    }

    /// Writes a snapshot of the latest committed state and returns the
    /// transaction id it covers.
    ///
    /// The snapshot is a consistent cut: it is taken from the committed
    /// copy, so an in-flight batch is either fully included or fully
    /// absent.
    pub fn snapshot(&self) -> CoreResult<TransactionId> {
        let (bytes, last) = {
            let committed = self.shared.committed.read();
            (
                recovery::encode_state(&committed.state, committed.last, self.model_version)?,
                committed.last,
            )
        };
        self.snapshots.lock().write(last.as_u64(), &bytes)?;
        info!(store = %self.name, transaction = %last, "snapshot written");
        Ok(last)
    }

    /// Deletes all but the `keep` newest snapshots; returns how many
    /// were removed.
    pub fn prune_snapshots(&self, keep: usize) -> CoreResult<usize> {
        let mut snapshots = self.snapshots.lock();
        let mut ids = snapshots.list()?;
        ids.sort_unstable_by(|a, b| b.cmp(a));
        let mut removed = 0;
        for id in ids.into_iter().skip(keep) {
            snapshots.delete(id)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Shuts the write pipeline down, waiting for queued batches to
    /// settle. Reads keep working afterwards; further submissions fail
    /// with [`CoreError::Closed`].
    pub fn close(&self) -> CoreResult<()> {
        drop(self.sender.lock().take());
        if let Some(handle) = self.writer.lock().take() {
            handle
                .join()
                .map_err(|_| CoreError::store("writer thread panicked"))?;
        }
        info!(store = %self.name, "store closed");
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        drop(self.sender.lock().take());
        if let Some(handle) = self.writer.lock().take() {
            let _ = handle.join();
        }
    }
}
