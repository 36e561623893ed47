//! Evaluation Ordering
//!
//! Post-build passes over the operation graph: breaking dependency cycles
//! and computing the order in which operations are evaluated.
//!
//! # Algorithm
//!
//! 1. Depth-first search with node colours over the relations that are not
//!    yet flagged [`RelationFlags::CYCLIC`]. A back edge closes a cycle.
//! 2. Among the relations of that cycle, the weakest one is flagged CYCLIC:
//!    the relation whose target operation has the highest
//!    [`OperationCode::index`](super::OperationCode::index), then the one
//!    whose description sorts last, then the most recently added one.
//! 3. Repeat until no cycle remains.
//! 4. Kahn's algorithm over the remaining relations yields the evaluation
//!    order. Operations that become ready together are ordered by index.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use serde::Serialize;

use super::node::OperationIndex;
use super::relation::{RelationFlags, RelationIndex};
use super::store::Graph;

/// A cycle the build had to break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Operations on the cycle, as `id/component/operation` paths.
    pub operations: Vec<String>,
    /// Description of the relation flagged CYCLIC.
    pub broken_relation: String,
    pub from: String,
    pub to: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

struct Frame {
    op: OperationIndex,
    next_link: usize,
    /// Relation followed to reach `op`.
    via: Option<RelationIndex>,
}

/// Find one cycle among non-cyclic relations, returned as its relations in
/// path order.
fn find_cycle(graph: &Graph) -> Option<Vec<RelationIndex>> {
    let count = graph.operation_count();
    let mut colour = vec![Colour::White; count];
    let mut stack: Vec<Frame> = Vec::new();

    for start in 0..count {
        if colour[start] != Colour::White {
            continue;
        }
        colour[start] = Colour::Grey;
        stack.push(Frame {
            op: OperationIndex(start as u32),
            next_link: 0,
            via: None,
        });

        while let Some(frame) = stack.last_mut() {
            let outlinks = graph.operation(frame.op).outlinks();
            let Some(&relation_index) = outlinks.get(frame.next_link) else {
                colour[frame.op.index()] = Colour::Black;
                stack.pop();
                continue;
            };
            frame.next_link += 1;

            let relation = graph.relation(relation_index);
            if relation.is_cyclic() {
                continue;
            }
            let target = relation.to();
            match colour[target.index()] {
                Colour::White => {
                    colour[target.index()] = Colour::Grey;
                    stack.push(Frame {
                        op: target,
                        next_link: 0,
                        via: Some(relation_index),
                    });
                }
                Colour::Grey => {
                    // Back edge: the cycle runs from `target` on the stack to the top
                    let position = stack.iter().position(|f| f.op == target).unwrap_or(0);
                    let mut cycle: Vec<RelationIndex> =
                        stack[position + 1..].iter().filter_map(|f| f.via).collect();
                    cycle.push(relation_index);
                    return Some(cycle);
                }
                Colour::Black => {}
            }
        }
    }
    None
}

fn weakest_relation(graph: &Graph, cycle: &[RelationIndex]) -> RelationIndex {
    let mut weakest = cycle[0];
    for &candidate in &cycle[1..] {
        let current = graph.relation(weakest);
        let other = graph.relation(candidate);
        let current_rank = (
            graph.operation(current.to()).code().index(),
            current.description(),
            weakest,
        );
        let other_rank = (
            graph.operation(other.to()).code().index(),
            other.description(),
            candidate,
        );
        if other_rank > current_rank {
            weakest = candidate;
        }
    }
    weakest
}

/// Flag relations CYCLIC until the remaining relations form a DAG.
pub fn break_cycles(graph: &mut Graph) -> Vec<CycleReport> {
    let mut reports = Vec::new();

    while let Some(cycle) = find_cycle(graph) {
        let weakest = weakest_relation(graph, &cycle);

        let operations: Vec<String> = cycle
            .iter()
            .map(|r| graph.describe_operation(graph.relation(*r).from()))
            .collect();
        let relation = graph.relation(weakest);
        let report = CycleReport {
            operations,
            broken_relation: relation.description().to_string(),
            from: graph.describe_operation(relation.from()),
            to: graph.describe_operation(relation.to()),
        };
        tracing::warn!(
            cycle = %report.operations.join(" -> "),
            broken = %report.broken_relation,
            "dependency cycle detected, ignoring '{}' -> '{}'",
            report.from,
            report.to
        );

        graph.relation_mut(weakest).flags.insert(RelationFlags::CYCLIC);
        reports.push(report);
    }

    reports
}

/// Topological order of every operation over non-cyclic relations.
///
/// With `sort_by_index` simultaneously ready operations are taken in index
/// order, otherwise in the order they became ready.
pub fn evaluation_order(graph: &Graph, sort_by_index: bool) -> Vec<OperationIndex> {
    let count = graph.operation_count();
    let mut in_degree = vec![0usize; count];
    for (_, relation) in graph.relations() {
        if !relation.is_cyclic() {
            in_degree[relation.to().index()] += 1;
        }
    }

    let mut order = Vec::with_capacity(count);
    let mut heap = BinaryHeap::new();
    let mut queue = VecDeque::new();
    for (index, degree) in in_degree.iter().enumerate() {
        if *degree == 0 {
            if sort_by_index {
                heap.push(Reverse(OperationIndex(index as u32)));
            } else {
                queue.push_back(OperationIndex(index as u32));
            }
        }
    }

    loop {
        let next = if sort_by_index {
            heap.pop().map(|Reverse(op)| op)
        } else {
            queue.pop_front()
        };
        let Some(op) = next else { break };
        order.push(op);

        for &relation_index in graph.operation(op).outlinks() {
            let relation = graph.relation(relation_index);
            if relation.is_cyclic() {
                continue;
            }
            let target = relation.to().index();
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                if sort_by_index {
                    heap.push(Reverse(relation.to()));
                } else {
                    queue.push_back(relation.to());
                }
            }
        }
    }

    order
}

/// Whether the relations not flagged CYCLIC form a DAG.
pub fn is_acyclic(graph: &Graph) -> bool {
    find_cycle(graph).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DepsgraphConfig;
    use crate::graph::{EvaluationMode, NodeType, OperationCode};
    use crate::host::{IdHandle, IdKind, Main, MainDatabase};

    fn graph() -> Graph {
        Graph::new(
            MainDatabase::new(Main::new()),
            IdHandle::from_raw(0),
            "ViewLayer",
            EvaluationMode::Viewport,
            DepsgraphConfig::default(),
        )
    }

    fn op(graph: &mut Graph, id: u32, kind: NodeType, code: OperationCode) -> OperationIndex {
        let node = graph
            .ensure_id_node(IdHandle::from_raw(id), &format!("OB{id}"), IdKind::Object)
            .unwrap();
        let component = graph.ensure_component(node, kind, "").unwrap();
        graph.ensure_operation(component, code, "", -1).unwrap()
    }

    #[test]
    fn chain_orders_sources_first() {
        let mut g = graph();
        let c = op(&mut g, 1, NodeType::Transform, OperationCode::TransformFinal);
        let b = op(&mut g, 1, NodeType::Transform, OperationCode::TransformLocal);
        let a = op(&mut g, 1, NodeType::Transform, OperationCode::TransformInit);
        g.add_relation(a, b, "a -> b", RelationFlags::empty()).unwrap();
        g.add_relation(b, c, "b -> c", RelationFlags::empty()).unwrap();

        assert!(break_cycles(&mut g).is_empty());
        assert_eq!(evaluation_order(&g, true), vec![a, b, c]);
    }

    #[test]
    fn breaks_relation_into_the_latest_operation() {
        let mut g = graph();
        let parent = op(&mut g, 1, NodeType::Transform, OperationCode::TransformParent);
        let final_ = op(&mut g, 2, NodeType::Transform, OperationCode::TransformFinal);
        let into_final = g.add_relation(parent, final_, "Parent", RelationFlags::empty()).unwrap();
        let into_parent = g.add_relation(final_, parent, "Backwards", RelationFlags::empty()).unwrap();

        let reports = break_cycles(&mut g);

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].broken_relation, "Parent");
        assert_eq!(reports[0].operations.len(), 2);
        assert!(g.relation(into_final).is_cyclic());
        assert!(!g.relation(into_parent).is_cyclic());
        assert!(is_acyclic(&g));
        assert_eq!(evaluation_order(&g, true), vec![final_, parent]);
    }

    #[test]
    fn ties_break_on_description() {
        let mut g = graph();
        let a = op(&mut g, 1, NodeType::Geometry, OperationCode::GeometryEval);
        let b = op(&mut g, 2, NodeType::Geometry, OperationCode::GeometryEval);
        g.add_relation(a, b, "alpha", RelationFlags::empty()).unwrap();
        let zulu = g.add_relation(b, a, "zulu", RelationFlags::empty()).unwrap();

        break_cycles(&mut g);
        assert!(g.relation(zulu).is_cyclic());
    }

    #[test]
    fn self_relation_is_a_cycle() {
        let mut g = graph();
        let a = op(&mut g, 1, NodeType::Geometry, OperationCode::GeometryEval);
        let relation = g.add_relation(a, a, "self", RelationFlags::empty()).unwrap();

        assert_eq!(break_cycles(&mut g).len(), 1);
        assert!(g.relation(relation).is_cyclic());
        assert_eq!(evaluation_order(&g, true), vec![a]);
    }

    #[test]
    fn every_operation_is_ordered() {
        let mut g = graph();
        let ops: Vec<_> = [
            OperationCode::TransformInit,
            OperationCode::TransformLocal,
            OperationCode::TransformParent,
            OperationCode::TransformFinal,
        ]
        .into_iter()
        .map(|code| op(&mut g, 1, NodeType::Transform, code))
        .collect();
        // Two interleaved cycles
        g.add_relation(ops[0], ops[1], "0-1", RelationFlags::empty()).unwrap();
        g.add_relation(ops[1], ops[0], "1-0", RelationFlags::empty()).unwrap();
        g.add_relation(ops[2], ops[3], "2-3", RelationFlags::empty()).unwrap();
        g.add_relation(ops[3], ops[2], "3-2", RelationFlags::empty()).unwrap();

        assert_eq!(break_cycles(&mut g).len(), 2);
        let order = evaluation_order(&g, false);
        assert_eq!(order.len(), ops.len());
    }
}
