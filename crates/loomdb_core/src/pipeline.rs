//! The serialized write pipeline.
//!
//! All mutations flow through a single writer thread that owns the
//! authoritative [`StoreState`] and the transaction log. Batches are
//! applied strictly in submission order: execute every command, append
//! the record to the log, then publish a committed copy of the state for
//! readers. A failing command rolls the whole batch back and nothing of
//! it reaches the log or the readers. A failed log append shuts the
//! pipeline down: the log's state is unknown at that point, and re-using
//! the transaction id could corrupt it.
//!
//! Each submitted command gets a [`CommandFuture`] that resolves with the
//! command's result once its batch commits, or with the error that
//! aborted the batch.

use crate::command;
use crate::error::{CoreError, CoreResult};
use crate::state::StoreState;
use crate::txn::WriteTransaction;
use crate::types::{ModelVersion, TransactionId};
use loomdb_codec::{serialize_transaction, CommandCall, TransactionRecord, Value};
use loomdb_storage::TransactionLog;
use parking_lot::RwLock;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// An ordered group of command calls committed atomically.
#[derive(Debug, Clone)]
pub struct TransactionBatch {
    pub(crate) sync_id: String,
    pub(crate) calls: Vec<CommandCall>,
}

impl TransactionBatch {
    /// Creates an empty batch tagged with the submitter's sync id.
    #[must_use]
    pub fn new(sync_id: impl Into<String>) -> Self {
        Self {
            sync_id: sync_id.into(),
            calls: Vec::new(),
        }
    }

    /// Appends a command call.
    #[must_use]
    pub fn call(mut self, call: CommandCall) -> Self {
        self.calls.push(call);
        self
    }

    /// Number of calls in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether the batch holds no calls.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// The pending result of one submitted command.
///
/// Resolves once the command's batch commits or aborts. Await it from
/// async code, or block on it with [`wait`](Self::wait).
#[derive(Debug)]
pub struct CommandFuture {
    rx: oneshot::Receiver<CoreResult<Value>>,
}

impl CommandFuture {
    /// Blocks the calling thread until the command's batch settles.
    pub fn wait(self) -> CoreResult<Value> {
        self.rx.blocking_recv().map_err(|_| CoreError::Closed)?
    }
}

impl Future for CommandFuture {
    type Output = CoreResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CoreError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A batch queued for the writer, with one reply slot per call.
pub(crate) struct QueuedBatch {
    pub(crate) sync_id: String,
    pub(crate) calls: Vec<CommandCall>,
    pub(crate) replies: Vec<oneshot::Sender<CoreResult<Value>>>,
}

impl QueuedBatch {
    /// Splits a batch into its queued form and the caller-facing futures.
    pub(crate) fn prepare(batch: TransactionBatch) -> (Self, Vec<CommandFuture>) {
        let mut replies = Vec::with_capacity(batch.calls.len());
        let mut futures = Vec::with_capacity(batch.calls.len());
        for _ in 0..batch.calls.len() {
            let (tx, rx) = oneshot::channel();
            replies.push(tx);
            futures.push(CommandFuture { rx });
        }
        (
            Self {
                sync_id: batch.sync_id,
                calls: batch.calls,
                replies,
            },
            futures,
        )
    }
}

/// Committed state published to readers.
pub(crate) struct Committed {
    pub(crate) state: StoreState,
    pub(crate) last: TransactionId,
}

/// State shared between the facade and the writer thread.
pub(crate) struct Shared {
    pub(crate) committed: RwLock<Committed>,
    /// Mirror of the committed readonly flag, checked at submission
    /// without taking the state lock.
    pub(crate) readonly: AtomicBool,
}

/// The single writer: owns the authoritative state and the log.
pub(crate) struct Writer {
    state: StoreState,
    log: Box<dyn TransactionLog>,
    next: TransactionId,
    model_version: ModelVersion,
    shared: Arc<Shared>,
    receiver: mpsc::UnboundedReceiver<QueuedBatch>,
}

impl Writer {
    pub(crate) fn new(
        state: StoreState,
        log: Box<dyn TransactionLog>,
        last: TransactionId,
        model_version: ModelVersion,
        shared: Arc<Shared>,
        receiver: mpsc::UnboundedReceiver<QueuedBatch>,
    ) -> Self {
        Self {
            state,
            log,
            next: last.next(),
            model_version,
            shared,
            receiver,
        }
    }

    /// Drains batches until every sender is gone, or until a failed log
    /// append forces a shutdown.
    pub(crate) fn run(mut self) {
        while let Some(batch) = self.receiver.blocking_recv() {
            if !self.apply(batch) {
                // Dropping the receiver settles queued and future
                // submissions as `Closed`.
                break;
            }
        }
        debug!("writer stopped");
    }

    /// Applies one batch. Returns `false` when the writer must stop.
    fn apply(&mut self, batch: QueuedBatch) -> bool {
        let QueuedBatch {
            sync_id,
            calls,
            replies,
        } = batch;

        // The submission-side readonly gate is only a cached flag; the
        // authoritative check happens here, after earlier batches in the
        // queue have settled.
        if self.state.readonly() && calls.iter().any(|c| !crate::schema::is_builtin(&c.name)) {
            for reply in replies {
                let _ = reply.send(Err(CoreError::ReadOnly));
            }
            return true;
        }

        let mut txn = WriteTransaction::new(&mut self.state);
        let mut results = Vec::with_capacity(calls.len());
        let mut failure: Option<(usize, CoreError)> = None;
        for (index, call) in calls.iter().enumerate() {
            match command::execute(&mut txn, call) {
                Ok(value) => results.push(value),
                Err(err) => {
                    failure = Some((index, err));
                    break;
                }
            }
        }

        if let Some((index, err)) = failure {
            txn.rollback();
            warn!(
                sync_id = %sync_id,
                command = %calls[index].name,
                error = %err,
                "transaction aborted, batch rolled back"
            );
            let aborted = format!("transaction aborted by command {}: {err}", calls[index].name);
            let mut original = Some(err);
            for (slot, reply) in replies.into_iter().enumerate() {
                let outcome = if slot == index {
                    Err(original
                        .take()
                        .unwrap_or_else(|| CoreError::store(aborted.clone())))
                } else {
                    Err(CoreError::store(aborted.clone()))
                };
                let _ = reply.send(outcome);
            }
            return true;
        }

        let id = self.next;
        let record = TransactionRecord {
            id: id.as_u64(),
            sync_id: sync_id.clone(),
            model_version: self.model_version.as_u64(),
            commands: calls,
        };
        let bytes = match serialize_transaction(&record) {
            Ok(bytes) => bytes,
            Err(err) => {
                // Nothing reached the log; rolling back is enough.
                txn.rollback();
                let err = CoreError::from(err);
                warn!(sync_id = %sync_id, error = %err, "record serialization failed, batch rolled back");
                let message = format!("transaction not persisted: {err}");
                let mut original = Some(err);
                for reply in replies {
                    let outcome = match original.take() {
                        Some(err) => Err(err),
                        None => Err(CoreError::store(message.clone())),
                    };
                    let _ = reply.send(outcome);
                }
                return true;
            }
        };
        if let Err(err) = self.log.append(id.as_u64(), &bytes) {
            // The frame may have become durable before the failure
            // surfaced; appending id `next` again could leave a duplicate
            // id on disk and make the log unopenable. The channel is in
            // an unknown state, so the writer stops here.
            txn.rollback();
            let err = CoreError::from(err);
            error!(sync_id = %sync_id, error = %err, "log append failed, writer shutting down");
            let message = format!("transaction not persisted: {err}");
            let mut original = Some(err);
            for reply in replies {
                let outcome = match original.take() {
                    Some(err) => Err(err),
                    None => Err(CoreError::store(message.clone())),
                };
                let _ = reply.send(outcome);
            }
            return false;
        }

        txn.commit();
        self.next = id.next();

        {
            let snapshot = self.state.clone();
            let mut committed = self.shared.committed.write();
            committed.state = snapshot;
            committed.last = id;
        }
        self.shared
            .readonly
            .store(self.state.readonly(), Ordering::Release);

        debug!(
            transaction = %id,
            sync_id = %sync_id,
            commands = results.len(),
            "transaction committed"
        );
        for (reply, value) in replies.into_iter().zip(results) {
            let _ = reply.send(Ok(value));
        }
        true
    }
}
