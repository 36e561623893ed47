//! Graph Registry
//!
//! Process-wide map from a main database to the graphs built from it, used
//! to broadcast "relations are stale" after the host changed data-blocks.
//!
//! Entries hold weak references: the registry never keeps a graph alive.
//! [`Depsgraph`](crate::api::Depsgraph) registers on creation and
//! unregisters on drop. Readers get a snapshot; the registry lock is
//! released before any graph is locked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};

use crate::graph::Graph;
use crate::host::MainId;

/// Process-unique identifier of a registered graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl GraphId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

pub type SharedGraph = Arc<Mutex<Graph>>;

type Entries = HashMap<MainId, Vec<(GraphId, Weak<Mutex<Graph>>)>>;

fn registry() -> &'static RwLock<Entries> {
    static REGISTRY: OnceLock<RwLock<Entries>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register `graph` as built from `main`.
pub fn register(main: MainId, id: GraphId, graph: &SharedGraph) {
    let mut entries = registry().write();
    let graphs = entries.entry(main).or_default();
    graphs.retain(|(_, weak)| weak.strong_count() > 0);
    graphs.push((id, Arc::downgrade(graph)));
}

/// Remove a graph. Unknown ids are ignored.
pub fn unregister(main: MainId, id: GraphId) {
    let mut entries = registry().write();
    if let Some(graphs) = entries.get_mut(&main) {
        graphs.retain(|(graph, _)| *graph != id);
        if graphs.is_empty() {
            entries.remove(&main);
        }
    }
}

/// Live graphs of `main`, in registration order.
pub fn all_for(main: MainId) -> Vec<SharedGraph> {
    let entries = registry().read();
    entries
        .get(&main)
        .map(|graphs| graphs.iter().filter_map(|(_, weak)| weak.upgrade()).collect())
        .unwrap_or_default()
}

/// Number of live graphs of `main`.
pub fn count_for(main: MainId) -> usize {
    let entries = registry().read();
    entries
        .get(&main)
        .map(|graphs| graphs.iter().filter(|(_, weak)| weak.strong_count() > 0).count())
        .unwrap_or(0)
}
