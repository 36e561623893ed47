//! Builder Pipelines
//!
//! A pipeline decides which data-blocks a graph is built from. Every
//! pipeline runs through the same sequence in [`build`]:
//!
//! 1. Sanity check: the scene, view layer and seeds exist.
//! 2. Remember the tags pending on the current graph.
//! 3. Clear the graph.
//! 4. Node pass, then relation pass.
//! 5. Break cycles and compute the evaluation order.
//! 6. Re-apply the pending tags. The very first build tags everything.
//!
//! A failing pass leaves the graph cleared and returns the error.

mod seeded;
mod view_layer;

use std::sync::Arc;

use crate::config::DebugFlags;
use crate::error::{DepsgraphError, Result};
use crate::graph::{order, Graph, OperationIndex};
use crate::host::{IdHandle, IdKind, Main, Scene};
use crate::tag::{self, RecalcFlags, UpdateSource};

use super::context::BuildContext;
use super::relations::RelationPassOutcome;
use super::{BuildReport, NodeBuilder, RelationBuilder};

pub(crate) use seeded::collection_closure;
pub use seeded::{CompositorPreviewPipeline, FromCollectionPipeline, FromIdsPipeline};
pub use view_layer::{AllObjectsPipeline, RenderPipeline, ViewLayerPipeline};

/// Seeds and traversal of one flavour of graph.
pub trait BuilderPipeline {
    fn name(&self) -> &'static str;

    /// Reject the build before the graph is touched.
    fn sanity_check(&self, graph: &Graph, main: &Main) -> Result<()> {
        check_scene(graph, main).map(|_| ())
    }

    fn build_nodes(&self, nodes: &mut NodeBuilder<'_>) -> Result<()>;

    fn build_relations(&self, relations: &mut RelationBuilder<'_>);
}

/// The graph's scene and view layer, or why they are unusable.
pub(crate) fn check_scene<'m>(graph: &Graph, main: &'m Main) -> Result<&'m Scene> {
    let scene = main
        .scene(graph.scene())
        .ok_or(DepsgraphError::UnknownScene(graph.scene()))?;
    if scene.view_layer(graph.view_layer()).is_none() {
        return Err(DepsgraphError::UnknownViewLayer(graph.view_layer().to_string()));
    }
    Ok(scene)
}

pub(crate) fn check_kind(main: &Main, id: IdHandle, expected: IdKind) -> Result<()> {
    match main.kind(id) {
        None => Err(DepsgraphError::unknown_data_block(id)),
        Some(found) if found != expected => Err(DepsgraphError::unexpected_data_block(id, expected, found)),
        Some(_) => Ok(()),
    }
}

fn run_passes(graph: &mut Graph, main: &Main, pipeline: &dyn BuilderPipeline) -> Result<RelationPassOutcome> {
    {
        let mut nodes = NodeBuilder::new(graph, main);
        pipeline.build_nodes(&mut nodes)?;
    }
    let mut relations = RelationBuilder::new(graph, main);
    pipeline.build_relations(&mut relations);
    relations.finish()
}

/// Rebuild `graph` from scratch with `pipeline`.
#[tracing::instrument(level = "debug", skip_all, fields(pipeline = pipeline.name()))]
pub fn build(graph: &mut Graph, pipeline: &dyn BuilderPipeline) -> Result<BuildReport> {
    let database = Arc::clone(graph.main_database());
    let main = database.read();
    pipeline.sanity_check(graph, &main)?;

    let pending: Vec<(IdHandle, RecalcFlags)> = graph
        .id_nodes()
        .filter(|(_, node)| !node.recalc().is_empty())
        .map(|(_, node)| (node.id_orig(), node.recalc()))
        .collect();
    let first_build = graph.build_count() == 0;

    graph.clear();
    let label = format!("{}/{}", main.id_name(graph.scene()), graph.view_layer());
    let outcome = {
        let _build = BuildContext::enter(label);
        run_passes(graph, &main, pipeline)
    };
    drop(main);
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(error) => {
            tracing::warn!(pipeline = pipeline.name(), %error, "graph build failed");
            graph.clear();
            return Err(error);
        }
    };

    let cycles = order::break_cycles(graph);
    let sort = graph.config().sort_evaluation_order;
    graph.evaluation_order = order::evaluation_order(graph, sort);
    graph.need_update_relations = false;
    graph.build_count += 1;

    let mut retagged = 0;
    if first_build {
        let operations: Vec<OperationIndex> = graph.operations().map(|(index, _)| index).collect();
        for index in operations {
            graph.operation_mut(index).mark_needs_update();
        }
    } else {
        for (id, recalc) in pending {
            if graph.find_id_node(id).is_none() {
                continue;
            }
            tag::tag_id(graph, id, recalc, UpdateSource::Relations);
            retagged += 1;
        }
    }

    let report = BuildReport {
        pipeline: pipeline.name(),
        id_nodes: graph.id_node_count(),
        operations: graph.operation_count(),
        relations: graph.relation_count(),
        placeholders: outcome.placeholders,
        diagnostics: outcome.diagnostics,
        cycles,
        retagged,
    };
    if graph.config().debug_enabled(DebugFlags::BUILD) {
        tracing::debug!(
            pipeline = report.pipeline,
            id_nodes = report.id_nodes,
            operations = report.operations,
            relations = report.relations,
            skipped = report.diagnostics.len(),
            cycles = report.cycles.len(),
            "graph built"
        );
    }
    Ok(report)
}
