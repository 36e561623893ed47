//! Evaluation Driver
//!
//! Runs the callbacks of tagged operations in evaluation order.
//!
//! The graph does not know what an operation computes. Other subsystems
//! register an [`EvalCallback`] per [`OperationCode`] in the graph's
//! [`CallbackTable`]; operations pick up the callback of their code when
//! they are created. Evaluation is single threaded.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::DebugFlags;
use crate::graph::{Graph, NodeType, OperationCode, OperationIndex};
use crate::host::{IdHandle, Main};
use crate::tag::RecalcFlags;

/// What a callback sees of the operation it runs for.
pub struct EvaluationContext<'a> {
    pub graph: &'a Graph,
    pub main: &'a Main,
    pub operation: OperationIndex,
    pub id: IdHandle,
    pub component: NodeType,
    /// Bone name for bone components.
    pub component_name: &'a str,
    pub code: OperationCode,
    pub name: &'a str,
    /// Accumulated recalc reasons of the owning data-block.
    pub recalc: RecalcFlags,
}

type EvalFn = dyn Fn(&EvaluationContext<'_>) + Send + Sync;

/// Shared evaluation function of an operation.
#[derive(Clone)]
pub struct EvalCallback(Arc<EvalFn>);

impl EvalCallback {
    pub fn new(f: impl Fn(&EvaluationContext<'_>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, context: &EvaluationContext<'_>) {
        (self.0)(context)
    }
}

impl fmt::Debug for EvalCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EvalCallback")
    }
}

/// Callbacks by operation code.
#[derive(Debug, Clone, Default)]
pub struct CallbackTable {
    callbacks: HashMap<OperationCode, EvalCallback>,
}

impl CallbackTable {
    pub fn set(&mut self, code: OperationCode, callback: EvalCallback) {
        self.callbacks.insert(code, callback);
    }

    pub fn remove(&mut self, code: OperationCode) -> Option<EvalCallback> {
        self.callbacks.remove(&code)
    }

    pub fn get(&self, code: OperationCode) -> Option<EvalCallback> {
        self.callbacks.get(&code).cloned()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// Outcome of one [`evaluate`] call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
    /// Paths of the operations that were due, in the order they ran.
    pub evaluated: Vec<String>,
    /// How many of them had a callback.
    pub callbacks_run: usize,
}

/// Run every operation tagged NEEDS_UPDATE in evaluation order, then clear
/// the operation tags and the recalc flags of all id nodes.
#[tracing::instrument(level = "debug", skip_all, fields(operations = graph.operation_count()))]
pub fn evaluate(graph: &mut Graph) -> EvaluationReport {
    let mut report = EvaluationReport::default();
    let log = graph.config().debug_enabled(DebugFlags::EVAL);
    let database = Arc::clone(graph.main_database());

    {
        let main = database.read();
        let graph: &Graph = graph;
        for &index in graph.evaluation_order() {
            let operation = graph.operation(index);
            if !operation.needs_update() {
                continue;
            }
            report.evaluated.push(graph.describe_operation(index));

            let Some(callback) = operation.callback.as_ref() else {
                continue;
            };
            let component = graph.component(operation.owner());
            let id_node = graph.id_node(component.owner());
            let context = EvaluationContext {
                graph,
                main: &main,
                operation: index,
                id: id_node.id_orig(),
                component: component.kind(),
                component_name: component.name(),
                code: operation.code(),
                name: operation.name(),
                recalc: id_node.recalc(),
            };
            if log {
                tracing::debug!(operation = %graph.describe_operation(index), "evaluating");
            }
            callback.call(&context);
            report.callbacks_run += 1;
        }
    }

    let indices: Vec<OperationIndex> = graph.operations().map(|(index, _)| index).collect();
    for index in indices {
        graph.operation_mut(index).clear_update_flags();
    }
    let ids: Vec<_> = graph.id_nodes().map(|(index, _)| index).collect();
    for index in ids {
        graph.id_node_mut(index).recalc = RecalcFlags::empty();
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn table_hands_out_shared_callbacks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let mut table = CallbackTable::default();
        table.set(
            OperationCode::GeometryEval,
            EvalCallback::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(table.get(OperationCode::GeometryEval).is_some());
        assert!(table.get(OperationCode::TransformFinal).is_none());
        assert_eq!(table.len(), 1);
        assert!(table.remove(OperationCode::GeometryEval).is_some());
        assert!(table.is_empty());
    }
}
