//! Error types for storage channels.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in a persistence channel.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A log or snapshot payload failed its integrity check.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The requested snapshot does not exist.
    #[error("snapshot not found for transaction {transaction_id}")]
    SnapshotNotFound {
        /// Transaction id the snapshot was requested for.
        transaction_id: u64,
    },

    /// An append used a transaction id that does not advance the log.
    #[error("transaction id {id} is not after the log head {head}")]
    NonMonotonicAppend {
        /// The rejected id.
        id: u64,
        /// The current last id in the log.
        head: u64,
    },

    /// Another process holds the store directory lock.
    #[error("store directory locked: another process has exclusive access")]
    Locked,
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
