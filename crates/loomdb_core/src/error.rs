//! Error types for LoomDB core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in LoomDB core operations.
///
/// The variants fall into three severity bands:
///
/// - **Construction-fatal**: [`CoreError::Config`] and
///   [`CoreError::InvalidModel`] are raised once, while a store or schema is
///   being built, and fail that construction call.
/// - **Transaction-scoped**: [`CoreError::MalformedCommand`],
///   [`CoreError::ObjectNotFound`], [`CoreError::UniqueConstraint`],
///   [`CoreError::NonnullConstraint`], [`CoreError::Store`] and
///   [`CoreError::ReadOnly`] fail one transaction after a full rollback; the
///   store stays usable.
/// - **Fatal**: [`CoreError::Unrecoverable`] aborts recovery; the store must
///   not be used.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad setup detected before store construction.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The schema author violated a modeling rule.
    #[error("invalid model: {message}")]
    InvalidModel {
        /// Description of the violated rule.
        message: String,
    },

    /// Bad command or builder usage, independent of business logic.
    #[error("malformed command: {message}")]
    MalformedCommand {
        /// Description of the misuse.
        message: String,
    },

    /// A mandatory unique lookup found no instance.
    #[error("object not found: {entity} with {attribute} = {value}")]
    ObjectNotFound {
        /// Entity type searched.
        entity: String,
        /// Unique attribute used for the lookup.
        attribute: String,
        /// The value that missed, rendered for display.
        value: String,
    },

    /// A unique attribute was set to a value another instance already holds.
    #[error("unique constraint violated: {entity}.{attribute} = {value}")]
    UniqueConstraint {
        /// Entity type of the conflicting instance.
        entity: String,
        /// The unique attribute.
        attribute: String,
        /// The duplicate value, rendered for display.
        value: String,
    },

    /// A non-nullable attribute or relation was left unset at commit.
    #[error("nonnull constraint violated: {entity}.{field} must be set")]
    NonnullConstraint {
        /// Entity type being validated.
        entity: String,
        /// The attribute or relation left null.
        field: String,
    },

    /// Business logic raised a failure during command execution.
    #[error("store error: {message}")]
    Store {
        /// Description of the failure.
        message: String,
    },

    /// The store is in readonly mode; the mutation was rejected before
    /// entering the writer queue.
    #[error("store is readonly")]
    ReadOnly,

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// Fatal: version regression, id inconsistency, or failed replay.
    ///
    /// A store that produced this error never reached a usable state.
    #[error("unrecoverable store error: {message}")]
    Unrecoverable {
        /// Description of the fatal condition.
        message: String,
    },

    /// Persistence channel error.
    #[error("storage error: {0}")]
    Storage(#[from] loomdb_storage::StorageError),

    /// Wire serialization error.
    #[error("codec error: {0}")]
    Codec(#[from] loomdb_codec::CodecError),
}

impl CoreError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid model error.
    pub fn invalid_model(message: impl Into<String>) -> Self {
        Self::InvalidModel {
            message: message.into(),
        }
    }

    /// Creates a malformed command error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedCommand {
            message: message.into(),
        }
    }

    /// Creates an object-not-found error.
    pub fn not_found(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        value: impl std::fmt::Display,
    ) -> Self {
        Self::ObjectNotFound {
            entity: entity.into(),
            attribute: attribute.into(),
            value: value.to_string(),
        }
    }

    /// Creates a unique constraint violation.
    pub fn unique_violation(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        value: impl std::fmt::Display,
    ) -> Self {
        Self::UniqueConstraint {
            entity: entity.into(),
            attribute: attribute.into(),
            value: value.to_string(),
        }
    }

    /// Creates a nonnull constraint violation.
    pub fn nonnull_violation(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self::NonnullConstraint {
            entity: entity.into(),
            field: field.into(),
        }
    }

    /// Creates a generic store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates an unrecoverable store error.
    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::Unrecoverable {
            message: message.into(),
        }
    }

    /// Returns `true` when the error only fails the current transaction and
    /// leaves the store usable.
    #[must_use]
    pub fn is_transaction_scoped(&self) -> bool {
        matches!(
            self,
            Self::MalformedCommand { .. }
                | Self::ObjectNotFound { .. }
                | Self::UniqueConstraint { .. }
                | Self::NonnullConstraint { .. }
                | Self::Store { .. }
                | Self::ReadOnly
        )
    }
}
