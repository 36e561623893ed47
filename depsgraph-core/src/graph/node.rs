//! Graph Nodes
//!
//! This module defines the three node classes that live in the dependency
//! graph and the index handles that address them.
//!
//! Ownership points downwards: an [`IdNode`] lists its components, a
//! [`ComponentNode`] lists its operations. Upward `owner` fields are plain
//! indices into the owning [`Graph`](super::Graph)'s arenas.

use bitflags::bitflags;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::eval::EvalCallback;
use crate::host::{CustomDataMask, IdHandle, IdKind};
use crate::tag::RecalcFlags;

use super::relation::RelationIndex;
use super::types::{NodeType, OperationCode};

macro_rules! arena_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Position in the owning arena.
            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_index!(
    /// Handle of an [`IdNode`] within its graph.
    IdNodeIndex
);
arena_index!(
    /// Handle of a [`ComponentNode`] within its graph.
    ComponentIndex
);
arena_index!(
    /// Handle of an [`OperationNode`] within its graph.
    OperationIndex
);

bitflags! {
    /// Evaluation hints requested by the users of a data-block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct SpecialEvalFlags: u32 {
        /// Curve objects must compute their path for a curve deform.
        const NEED_CURVE_PATH = 1 << 0;
        /// Keep the boundary data a shrinkwrap target projects onto.
        const NEED_SHRINKWRAP_BOUNDARY = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OperationFlags: u32 {
        /// The operation must run on the next evaluation.
        const NEEDS_UPDATE = 1 << 0;
        /// Tagged by a tag request rather than through a flush.
        const DIRECTLY_MODIFIED = 1 << 1;
        /// Tagged because of a user edit.
        const USER_MODIFIED = 1 << 2;
        /// Created by the relation builder to satisfy an unresolved key.
        const PLACEHOLDER = 1 << 3;
    }
}

/// The node of one data-block.
#[derive(Debug)]
pub struct IdNode {
    pub(crate) id_orig: IdHandle,
    pub(crate) name: String,
    pub(crate) kind: IdKind,
    pub(crate) components: IndexMap<(NodeType, String), ComponentIndex>,
    pub(crate) recalc: RecalcFlags,
    pub(crate) special_eval_flags: SpecialEvalFlags,
    pub(crate) customdata_mask: CustomDataMask,
    pub(crate) is_directly_visible: bool,
}

impl IdNode {
    pub(crate) fn new(id_orig: IdHandle, name: String, kind: IdKind) -> Self {
        Self {
            id_orig,
            name,
            kind,
            components: IndexMap::new(),
            recalc: RecalcFlags::empty(),
            special_eval_flags: SpecialEvalFlags::empty(),
            customdata_mask: CustomDataMask::empty(),
            is_directly_visible: false,
        }
    }

    /// Handle of the original data-block.
    pub fn id_orig(&self) -> IdHandle {
        self.id_orig
    }

    /// Diagnostic name, e.g. `OBCube`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> IdKind {
        self.kind
    }

    pub fn components(&self) -> impl Iterator<Item = ComponentIndex> + '_ {
        self.components.values().copied()
    }

    /// Reasons this data-block was tagged or flushed since its last evaluation.
    pub fn recalc(&self) -> RecalcFlags {
        self.recalc
    }

    pub fn special_eval_flags(&self) -> SpecialEvalFlags {
        self.special_eval_flags
    }

    /// Attribute layers the evaluated geometry must keep.
    pub fn customdata_mask(&self) -> CustomDataMask {
        self.customdata_mask
    }

    /// Built because it is in the evaluated view layer, not only because
    /// something else references it.
    pub fn is_directly_visible(&self) -> bool {
        self.is_directly_visible
    }
}

/// One facet of a data-block's evaluation.
#[derive(Debug)]
pub struct ComponentNode {
    pub(crate) owner: IdNodeIndex,
    pub(crate) kind: NodeType,
    pub(crate) name: String,
    pub(crate) operations: IndexMap<(OperationCode, String, i32), OperationIndex>,
    pub(crate) entry: Option<OperationIndex>,
    pub(crate) exit: Option<OperationIndex>,
}

impl ComponentNode {
    pub(crate) fn new(owner: IdNodeIndex, kind: NodeType, name: String) -> Self {
        Self {
            owner,
            kind,
            name,
            operations: IndexMap::new(),
            entry: None,
            exit: None,
        }
    }

    pub fn owner(&self) -> IdNodeIndex {
        self.owner
    }

    pub fn kind(&self) -> NodeType {
        self.kind
    }

    /// Bone name for bone components, empty otherwise.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operations(&self) -> impl Iterator<Item = OperationIndex> + '_ {
        self.operations.values().copied()
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub fn entry(&self) -> Option<OperationIndex> {
        self.entry
    }

    pub fn exit(&self) -> Option<OperationIndex> {
        self.exit
    }
}

/// A unit of evaluation work: the node the scheduler orders.
#[derive(Debug)]
pub struct OperationNode {
    pub(crate) owner: ComponentIndex,
    pub(crate) code: OperationCode,
    pub(crate) name: String,
    pub(crate) name_tag: i32,
    pub(crate) callback: Option<EvalCallback>,
    pub(crate) flags: OperationFlags,
    pub(crate) inlinks: SmallVec<[RelationIndex; 4]>,
    pub(crate) outlinks: SmallVec<[RelationIndex; 4]>,
}

impl OperationNode {
    pub(crate) fn new(owner: ComponentIndex, code: OperationCode, name: String, name_tag: i32) -> Self {
        Self {
            owner,
            code,
            name,
            name_tag,
            callback: None,
            flags: OperationFlags::empty(),
            inlinks: SmallVec::new(),
            outlinks: SmallVec::new(),
        }
    }

    pub fn owner(&self) -> ComponentIndex {
        self.owner
    }

    pub fn code(&self) -> OperationCode {
        self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_tag(&self) -> i32 {
        self.name_tag
    }

    pub fn flags(&self) -> OperationFlags {
        self.flags
    }

    pub fn needs_update(&self) -> bool {
        self.flags.contains(OperationFlags::NEEDS_UPDATE)
    }

    pub fn is_placeholder(&self) -> bool {
        self.flags.contains(OperationFlags::PLACEHOLDER)
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Relations ending at this operation.
    pub fn inlinks(&self) -> &[RelationIndex] {
        &self.inlinks
    }

    /// Relations starting at this operation.
    pub fn outlinks(&self) -> &[RelationIndex] {
        &self.outlinks
    }

    pub(crate) fn mark_needs_update(&mut self) -> bool {
        let newly = !self.needs_update();
        self.flags.insert(OperationFlags::NEEDS_UPDATE);
        newly
    }

    pub(crate) fn clear_update_flags(&mut self) {
        self.flags
            .remove(OperationFlags::NEEDS_UPDATE | OperationFlags::DIRECTLY_MODIFIED | OperationFlags::USER_MODIFIED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_starts_clean() {
        let op = OperationNode::new(ComponentIndex(0), OperationCode::GeometryEval, String::new(), -1);
        assert!(!op.needs_update());
        assert!(!op.is_placeholder());
        assert!(op.inlinks().is_empty());
        assert!(op.outlinks().is_empty());
    }

    #[test]
    fn needs_update_transitions() {
        let mut op = OperationNode::new(ComponentIndex(0), OperationCode::TransformFinal, String::new(), -1);

        assert!(op.mark_needs_update());
        // Marking again reports nothing new
        assert!(!op.mark_needs_update());
        assert!(op.needs_update());

        op.flags.insert(OperationFlags::USER_MODIFIED | OperationFlags::PLACEHOLDER);
        op.clear_update_flags();
        assert!(!op.needs_update());
        assert!(!op.flags().contains(OperationFlags::USER_MODIFIED));
        // Placeholders stay placeholders
        assert!(op.is_placeholder());
    }

    #[test]
    fn id_node_starts_without_tags() {
        let node = IdNode::new(IdHandle::from_raw(2), "OBCube".into(), IdKind::Object);
        assert_eq!(node.name(), "OBCube");
        assert!(node.recalc().is_empty());
        assert!(node.customdata_mask().is_empty());
        assert!(!node.is_directly_visible());
    }
}
