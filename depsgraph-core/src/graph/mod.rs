//! Dependency Graph
//!
//! The operation-level dependency graph of one scene/view layer.
//!
//! # Overview
//!
//! The graph has three node classes nested by ownership:
//!
//! - an [`IdNode`] per data-block that participates in evaluation
//! - [`ComponentNode`]s, one per facet of a data-block (transform, geometry, ...)
//! - [`OperationNode`]s, the units of work the scheduler orders
//!
//! [`Relation`]s connect operations: `to` is evaluated after `from`.
//!
//! # Design Decisions
//!
//! 1. Nodes are stored in arenas owned by [`Graph`] and addressed with index
//!    handles. Upward references are plain indices, so there is no ownership
//!    cycle between a node and its owner.
//!
//! 2. Everything outside this module addresses nodes through keys
//!    ([`IdKey`], [`ComponentKey`], [`OperationKey`]), never through indices
//!    kept across builds.
//!
//! 3. A relation is unique per `(from, to)` pair. Inserting it twice merges
//!    the flags.

mod keys;
mod node;
pub mod order;
mod relation;
mod store;
mod types;

pub use keys::{ComponentKey, IdKey, OperationKey, RelationKey};
pub use node::{
    ComponentIndex, ComponentNode, IdNode, IdNodeIndex, OperationFlags, OperationIndex, OperationNode,
    SpecialEvalFlags,
};
pub use order::CycleReport;
pub use relation::{Relation, RelationFlags, RelationIndex};
pub use store::{EvaluationMode, Graph};
pub use types::{NodeType, ObjectComponent, OperationCode, OperationPhase, SceneComponent};
