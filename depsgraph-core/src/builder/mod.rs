//! Graph Builders
//!
//! Construction of a [`Graph`](crate::graph::Graph) from the main database.
//!
//! # Overview
//!
//! A build runs two passes over the same set of data-blocks:
//!
//! 1. The [`NodeBuilder`] creates id, component and operation nodes.
//! 2. The [`RelationBuilder`] connects operations. External code (modifiers,
//!    host callbacks) takes part through a [`DepsNodeHandle`].
//!
//! Which data-blocks are visited is decided by a pipeline (see
//! [`pipeline`]). After both passes the pipeline breaks cycles, computes the
//! evaluation order and re-applies tags that were pending before the build.
//!
//! # Design Decisions
//!
//! 1. Data-block visitors are a closed set dispatched on [`IdKind`]; only
//!    modifiers reach out through a trait.
//!
//! 2. A relation that cannot be resolved is not an error. It is reported as
//!    a [`Diagnostic`] in the [`BuildReport`] and the graph is flagged
//!    possibly incomplete.
//!
//! 3. Exhausting an arena aborts the build and leaves the graph empty.
//!
//! [`IdKind`]: crate::host::IdKind

pub mod context;
mod handle;
mod nodes;
pub mod pipeline;
mod relations;

use std::collections::HashSet;

use serde::Serialize;

use crate::graph::CycleReport;
use crate::host::IdHandle;

pub use handle::DepsNodeHandle;
pub use nodes::NodeBuilder;
pub use relations::RelationBuilder;

/// A relation the build had to skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub from: String,
    pub to: String,
    pub description: String,
    pub reason: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} ('{}'): {}",
            self.from, self.to, self.description, self.reason
        )
    }
}

/// Summary of a completed build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub pipeline: &'static str,
    pub id_nodes: usize,
    pub operations: usize,
    pub relations: usize,
    /// Nodes created to stand in for keys that did not resolve.
    pub placeholders: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub cycles: Vec<CycleReport>,
    /// Ids whose pending tags were re-applied after the rebuild.
    pub retagged: usize,
}

impl BuildReport {
    /// Some relation was skipped.
    pub fn possibly_incomplete(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Data-blocks already visited by one builder pass.
#[derive(Debug, Default)]
pub struct BuilderMap {
    built: HashSet<IdHandle>,
}

impl BuilderMap {
    /// Mark `id` as built. Returns `true` if it was not built before.
    pub fn check_and_mark(&mut self, id: IdHandle) -> bool {
        self.built.insert(id)
    }

    pub fn is_built(&self, id: IdHandle) -> bool {
        self.built.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.built.len()
    }

    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_map_marks_once() {
        let mut map = BuilderMap::default();
        let id = IdHandle::from_raw(3);
        assert!(map.check_and_mark(id));
        assert!(!map.check_and_mark(id));
        assert!(map.is_built(id));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn diagnostic_display_names_both_ends() {
        let diagnostic = Diagnostic {
            from: "OBTarget/TRANSFORM".into(),
            to: "OBCube/TRANSFORM/TRANSFORM_CONSTRAINTS".into(),
            description: "Track To".into(),
            reason: "source does not resolve".into(),
        };
        assert_eq!(
            diagnostic.to_string(),
            "OBTarget/TRANSFORM -> OBCube/TRANSFORM/TRANSFORM_CONSTRAINTS ('Track To'): source does not resolve"
        );
    }
}
