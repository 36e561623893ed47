//! Debug Output
//!
//! Statistics and dumps of a built graph: a JSON document for tooling and a
//! graphviz rendering with one cluster per data-block.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::error::Result;
use crate::graph::{Graph, OperationIndex, RelationFlags};

/// Node and relation counts of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub id_nodes: usize,
    pub components: usize,
    pub operations: usize,
    pub relations: usize,
    pub cyclic_relations: usize,
    pub placeholders: usize,
    pub needs_update: usize,
    /// Component count per component kind.
    pub components_by_kind: BTreeMap<String, usize>,
}

impl GraphStats {
    pub fn collect(graph: &Graph) -> Self {
        let mut stats = GraphStats {
            id_nodes: graph.id_node_count(),
            components: graph.component_count(),
            operations: graph.operation_count(),
            relations: graph.relation_count(),
            ..GraphStats::default()
        };
        for (_, node) in graph.id_nodes() {
            for component in node.components() {
                let kind = graph.component(component).kind().name().to_string();
                *stats.components_by_kind.entry(kind).or_default() += 1;
            }
        }
        for (_, operation) in graph.operations() {
            stats.placeholders += usize::from(operation.is_placeholder());
            stats.needs_update += usize::from(operation.needs_update());
        }
        stats.cyclic_relations = graph.relations().filter(|(_, relation)| relation.is_cyclic()).count();
        stats
    }
}

#[derive(Serialize)]
struct OperationDump {
    index: usize,
    path: String,
    needs_update: bool,
    placeholder: bool,
}

#[derive(Serialize)]
struct RelationDump<'g> {
    from: usize,
    to: usize,
    description: &'g str,
    flags: RelationFlags,
}

#[derive(Serialize)]
struct GraphDump<'g> {
    scene: String,
    view_layer: &'g str,
    stats: GraphStats,
    operations: Vec<OperationDump>,
    relations: Vec<RelationDump<'g>>,
}

/// Pretty-printed JSON of every operation and relation.
pub fn to_json(graph: &Graph) -> Result<String> {
    let dump = GraphDump {
        scene: graph.main_database().read().id_name(graph.scene()),
        view_layer: graph.view_layer(),
        stats: GraphStats::collect(graph),
        operations: graph
            .operations()
            .map(|(index, operation)| OperationDump {
                index: index.index(),
                path: graph.describe_operation(index),
                needs_update: operation.needs_update(),
                placeholder: operation.is_placeholder(),
            })
            .collect(),
        relations: graph
            .relations()
            .map(|(_, relation)| RelationDump {
                from: relation.from().index(),
                to: relation.to().index(),
                description: relation.description(),
                flags: relation.flags(),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&dump)?)
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

fn node_name(index: OperationIndex) -> String {
    format!("op{}", index.index())
}

/// Graphviz `digraph` with one cluster per id node and one nested cluster
/// per component. Cyclic relations are drawn red, non-flushing ones dashed.
pub fn to_graphviz(graph: &Graph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph depsgraph {{");
    let _ = writeln!(out, "  rankdir=LR;");
    let _ = writeln!(out, "  node [shape=box, fontsize=10];");

    for (id_index, node) in graph.id_nodes() {
        let _ = writeln!(out, "  subgraph cluster_id{} {{", id_index.index());
        let _ = writeln!(out, "    label=\"{}\";", escape(node.name()));
        for component_index in node.components() {
            let component = graph.component(component_index);
            let mut label = component.kind().name().to_string();
            if !component.name().is_empty() {
                label.push_str(&format!(" [{}]", component.name()));
            }
            let _ = writeln!(out, "    subgraph cluster_c{} {{", component_index.index());
            let _ = writeln!(out, "      label=\"{}\";", escape(&label));
            for op in component.operations() {
                let operation = graph.operation(op);
                let mut label = operation.code().name().to_string();
                if !operation.name().is_empty() {
                    label.push_str(&format!("\\n{}", escape(operation.name())));
                }
                let style = if operation.needs_update() {
                    ", style=filled, fillcolor=\"#ffd27f\""
                } else {
                    ""
                };
                let _ = writeln!(out, "      {} [label=\"{}\"{}];", node_name(op), label, style);
            }
            let _ = writeln!(out, "    }}");
        }
        let _ = writeln!(out, "  }}");
    }

    for (_, relation) in graph.relations() {
        let mut attributes = vec![format!("tooltip=\"{}\"", escape(relation.description()))];
        if relation.is_cyclic() {
            attributes.push("color=red".to_string());
        }
        if relation.flags().intersects(RelationFlags::NO_FLUSH | RelationFlags::FLUSH_BLOCKED) {
            attributes.push("style=dashed".to_string());
        } else if relation.flags().contains(RelationFlags::FLUSH_USER_EDIT_ONLY) {
            attributes.push("style=dotted".to_string());
        }
        let _ = writeln!(
            out,
            "  {} -> {} [{}];",
            node_name(relation.from()),
            node_name(relation.to()),
            attributes.join(", ")
        );
    }
    let _ = writeln!(out, "}}");
    out
}
