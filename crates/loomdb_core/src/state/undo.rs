//! Typed undo operations.
//!
//! Every mutation of the entity store yields one of these; a transaction
//! accumulates them and unwinds the list in reverse to restore the exact
//! pre-transaction state. Typed variants instead of captured closures keep
//! the rollback log a plain data structure.

use crate::state::instance::Instance;
use crate::types::InstanceId;
use loomdb_codec::Value;
use std::collections::BTreeSet;

/// The inverse of one entity store mutation.
#[derive(Debug, Clone)]
pub enum UndoOp {
    /// An attribute was set; restore the previous value.
    AttributeSet {
        /// Entity type index.
        entity: usize,
        /// Mutated instance.
        id: InstanceId,
        /// Attribute slot.
        slot: usize,
        /// Value before the mutation.
        previous: Value,
    },

    /// A to-one relation was set; restore the previous target.
    RelationSet {
        /// Entity type index.
        entity: usize,
        /// Mutated instance.
        id: InstanceId,
        /// Relation slot.
        slot: usize,
        /// Target before the mutation.
        previous: Option<InstanceId>,
    },

    /// A member was added to a to-many relation; remove it again.
    RelationAdded {
        /// Entity type index.
        entity: usize,
        /// Mutated instance.
        id: InstanceId,
        /// Relation slot.
        slot: usize,
        /// The added member.
        member: InstanceId,
    },

    /// A member was removed from a to-many relation; add it back.
    RelationRemoved {
        /// Entity type index.
        entity: usize,
        /// Mutated instance.
        id: InstanceId,
        /// Relation slot.
        slot: usize,
        /// The removed member.
        member: InstanceId,
    },

    /// A to-many relation was cleared; restore the previous member set.
    RelationCleared {
        /// Entity type index.
        entity: usize,
        /// Mutated instance.
        id: InstanceId,
        /// Relation slot.
        slot: usize,
        /// Members before the clear.
        previous: BTreeSet<InstanceId>,
    },

    /// An instance was created; remove it and roll the id counter back.
    ///
    /// Safe only in LIFO order: by the time this unwinds, every later
    /// mutation of the instance has already been reverted, so the instance
    /// is pristine and holds no index entries.
    Created {
        /// Entity type index.
        entity: usize,
        /// The created instance.
        id: InstanceId,
    },

    /// An instance was deleted; reinsert it and repair all indices.
    Deleted {
        /// Entity type index.
        entity: usize,
        /// The deleted instance, as it was.
        instance: Box<Instance>,
        /// Reciprocal view entries keyed by this instance as head,
        /// dropped by the delete: `(view index, tail ids)`.
        head_views: Vec<(usize, BTreeSet<InstanceId>)>,
    },

    /// The readonly flag was toggled; restore the previous setting.
    ReadonlySet {
        /// Flag value before the toggle.
        previous: bool,
    },
}
