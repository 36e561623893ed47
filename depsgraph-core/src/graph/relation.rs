//! Relations between operations.

use bitflags::bitflags;

use super::node::OperationIndex;

/// Handle of a [`Relation`] in the graph's relation pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationIndex(pub(crate) u32);

impl RelationIndex {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct RelationFlags: u32 {
        /// Part of a dependency cycle and ignored for ordering.
        const CYCLIC = 1 << 0;
        /// Tags never travel along this relation.
        const NO_FLUSH = 1 << 1;
        /// Tags travel along this relation only for user edits.
        const FLUSH_USER_EDIT_ONLY = 1 << 2;
        /// Flushing stops at this relation.
        const FLUSH_BLOCKED = 1 << 3;
    }
}

/// A directed dependency: `to` is evaluated after `from`.
#[derive(Debug, Clone)]
pub struct Relation {
    pub(crate) from: OperationIndex,
    pub(crate) to: OperationIndex,
    pub(crate) description: String,
    pub(crate) flags: RelationFlags,
}

impl Relation {
    pub fn from(&self) -> OperationIndex {
        self.from
    }

    pub fn to(&self) -> OperationIndex {
        self.to
    }

    /// Description of the first insertion.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn flags(&self) -> RelationFlags {
        self.flags
    }

    pub fn is_cyclic(&self) -> bool {
        self.flags.contains(RelationFlags::CYCLIC)
    }

    /// Whether a tag from a flush of the given kind crosses this relation.
    pub fn propagates(&self, user_edit: bool) -> bool {
        if self.flags.intersects(RelationFlags::NO_FLUSH | RelationFlags::FLUSH_BLOCKED) {
            return false;
        }
        if self.flags.contains(RelationFlags::FLUSH_USER_EDIT_ONLY) {
            return user_edit;
        }
        true
    }
}
