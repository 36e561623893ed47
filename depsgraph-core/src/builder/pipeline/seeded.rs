//! Pipelines seeded by the caller: a compositor tree, a list of
//! data-blocks, or a collection.

use std::collections::HashSet;

use crate::error::{DepsgraphError, Result};
use crate::graph::Graph;
use crate::host::{IdHandle, IdKind, Main, ObjectType};

use super::super::{NodeBuilder, RelationBuilder};
use super::{check_kind, check_scene, BuilderPipeline};

/// A compositor node tree and what it references, for previews.
#[derive(Debug, Clone, Copy)]
pub struct CompositorPreviewPipeline {
    node_tree: IdHandle,
}

impl CompositorPreviewPipeline {
    pub fn new(node_tree: IdHandle) -> Self {
        Self { node_tree }
    }
}

impl BuilderPipeline for CompositorPreviewPipeline {
    fn name(&self) -> &'static str {
        "compositor_preview"
    }

    fn sanity_check(&self, graph: &Graph, main: &Main) -> Result<()> {
        check_scene(graph, main)?;
        check_kind(main, self.node_tree, IdKind::NodeTree)
    }

    fn build_nodes(&self, nodes: &mut NodeBuilder<'_>) -> Result<()> {
        nodes.build_scene(false)?;
        nodes.build_node_tree(self.node_tree)
    }

    fn build_relations(&self, relations: &mut RelationBuilder<'_>) {
        relations.build_scene(false);
        relations.build_node_tree(self.node_tree);
    }
}

/// An explicit list of data-blocks.
#[derive(Debug, Clone, Default)]
pub struct FromIdsPipeline {
    ids: Vec<IdHandle>,
}

impl FromIdsPipeline {
    pub fn new(ids: impl IntoIterator<Item = IdHandle>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    fn objects<'i>(&'i self, main: &'i Main) -> impl Iterator<Item = IdHandle> + 'i {
        self.ids.iter().copied().filter(|id| main.kind(*id) == Some(IdKind::Object))
    }
}

impl BuilderPipeline for FromIdsPipeline {
    fn name(&self) -> &'static str {
        "from_ids"
    }

    fn sanity_check(&self, graph: &Graph, main: &Main) -> Result<()> {
        check_scene(graph, main)?;
        match self.ids.iter().find(|id| !main.contains(**id)) {
            Some(id) => Err(DepsgraphError::unknown_data_block(*id)),
            None => Ok(()),
        }
    }

    fn build_nodes(&self, nodes: &mut NodeBuilder<'_>) -> Result<()> {
        nodes.build_scene(false)?;
        let objects: Vec<IdHandle> = self.objects(nodes.main()).collect();
        for object in objects {
            nodes.build_object(object, true)?;
        }
        for id in &self.ids {
            nodes.build_id(*id)?;
        }
        Ok(())
    }

    fn build_relations(&self, relations: &mut RelationBuilder<'_>) {
        relations.build_scene(false);
        for id in &self.ids {
            relations.build_id(*id);
        }
        let objects: Vec<IdHandle> = self.objects(relations.main()).collect();
        relations.build_view_layer_bases(&objects);
    }
}

/// Objects of `collection`, its children and, through instancing empties,
/// every collection nested in it. Each collection is visited once.
pub(crate) fn collection_closure(main: &Main, collection: IdHandle) -> Vec<IdHandle> {
    let mut objects = Vec::new();
    let mut seen_objects = HashSet::new();
    let mut visited = HashSet::new();
    let mut pending = vec![collection];

    while let Some(current) = pending.pop() {
        if !visited.insert(current) {
            continue;
        }
        let Some(collection) = main.collection(current) else {
            continue;
        };
        for id in &collection.objects {
            let Some(object) = main.object(*id) else {
                continue;
            };
            if seen_objects.insert(*id) {
                objects.push(*id);
            }
            if object.object_type == ObjectType::Empty {
                pending.extend(object.instance_collection);
            }
        }
        pending.extend(collection.children.iter().rev().copied());
    }
    objects
}

/// A collection with everything it instances.
#[derive(Debug, Clone, Copy)]
pub struct FromCollectionPipeline {
    collection: IdHandle,
}

impl FromCollectionPipeline {
    pub fn new(collection: IdHandle) -> Self {
        Self { collection }
    }
}

impl BuilderPipeline for FromCollectionPipeline {
    fn name(&self) -> &'static str {
        "from_collection"
    }

    fn sanity_check(&self, graph: &Graph, main: &Main) -> Result<()> {
        check_scene(graph, main)?;
        check_kind(main, self.collection, IdKind::Collection)
    }

    fn build_nodes(&self, nodes: &mut NodeBuilder<'_>) -> Result<()> {
        nodes.build_scene(false)?;
        for object in collection_closure(nodes.main(), self.collection) {
            nodes.build_object(object, true)?;
        }
        nodes.build_collection(self.collection)
    }

    fn build_relations(&self, relations: &mut RelationBuilder<'_>) {
        relations.build_scene(false);
        relations.build_collection(self.collection);
        let objects = collection_closure(relations.main(), self.collection);
        relations.build_view_layer_bases(&objects);
    }
}
