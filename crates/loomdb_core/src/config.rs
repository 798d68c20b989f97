//! Store configuration.

use crate::types::ModelVersion;
use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store name, used in logging and diagnostics.
    pub name: String,

    /// Application model version of the schema being opened.
    ///
    /// Compared against the version recorded in the loaded snapshot; a
    /// decrease refuses to open the store.
    pub model_version: ModelVersion,

    /// How long replay waits for the next log entry before concluding the
    /// log head has been reached.
    pub replay_poll_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            model_version: ModelVersion::new(1),
            replay_poll_timeout: Duration::from_millis(10),
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with the given store name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the application model version.
    #[must_use]
    pub const fn model_version(mut self, version: u64) -> Self {
        self.model_version = ModelVersion::new(version);
        self
    }

    /// Sets the replay poll timeout.
    #[must_use]
    pub const fn replay_poll_timeout(mut self, timeout: Duration) -> Self {
        self.replay_poll_timeout = timeout;
        self
    }
}
