//! Core type definitions for LoomDB.

use std::fmt;

/// Unique identifier for a committed transaction.
///
/// Transaction ids are monotonically increasing per store and equal the
/// record's position in log order; replay order is transaction id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// The id before the first transaction; seeking here replays the
    /// whole log.
    pub const ZERO: Self = Self(0);

    /// Creates a new transaction id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next transaction id.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Identifier of one instance within its entity type.
///
/// Ids start at 0 per entity type, increase strictly in creation order, and
/// are never reused even after the instance is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u64);

impl InstanceId {
    /// Creates a new instance id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Application-defined schema-evolution counter.
///
/// Checked for monotonicity when a snapshot is loaded: a store may never
/// open with a version lower than the one recorded in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelVersion(pub u64);

impl ModelVersion {
    /// Creates a new model version.
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    /// Returns the raw version value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        assert!(TransactionId::new(1) < TransactionId::new(2));
        assert_eq!(TransactionId::ZERO.next(), TransactionId::new(1));
    }

    #[test]
    fn display_forms() {
        assert_eq!(TransactionId::new(7).to_string(), "txn:7");
        assert_eq!(InstanceId::new(0).to_string(), "#0");
        assert_eq!(ModelVersion::new(3).to_string(), "v3");
    }
}
