//! Pipelines over the objects of a scene: the active view layer, a render
//! of it, and every object of the main database.

use std::collections::HashSet;

use crate::error::Result;
use crate::graph::{EvaluationMode, Graph};
use crate::host::{IdHandle, Main, ViewLayer};

use super::super::{NodeBuilder, RelationBuilder};
use super::BuilderPipeline;

/// Objects reachable from the view layer's collections, in hierarchy order.
///
/// Excluded collections are skipped with their children, and so are
/// collections and objects hidden for the given mode.
pub(crate) fn view_layer_objects(main: &Main, scene: IdHandle, view_layer: &ViewLayer, render: bool) -> Vec<IdHandle> {
    let Some(scene) = main.scene(scene) else {
        return Vec::new();
    };
    let mut objects = Vec::new();
    let mut seen_objects = HashSet::new();
    let mut visited = HashSet::new();
    let mut pending: Vec<IdHandle> = scene.master_collection.into_iter().collect();

    while let Some(current) = pending.pop() {
        if !visited.insert(current) || view_layer.excludes(current) {
            continue;
        }
        let Some(collection) = main.collection(current) else {
            continue;
        };
        let hidden = if render {
            collection.hide_render
        } else {
            collection.hide_viewport
        };
        if hidden {
            continue;
        }
        for object in &collection.objects {
            let visible = main.object(*object).is_some_and(|object| object.is_visible(render));
            if visible && seen_objects.insert(*object) {
                objects.push(*object);
            }
        }
        // Reverse so children are visited in declaration order.
        pending.extend(collection.children.iter().rev().copied());
    }
    objects
}

fn layer_objects(graph: &Graph, main: &Main, render: bool) -> Vec<IdHandle> {
    main.scene(graph.scene())
        .and_then(|scene| scene.view_layer(graph.view_layer()))
        .map(|layer| view_layer_objects(main, graph.scene(), layer, render))
        .unwrap_or_default()
}

/// The objects of the graph's view layer plus the scene. The compositor
/// is included when the graph is evaluated for rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewLayerPipeline;

impl BuilderPipeline for ViewLayerPipeline {
    fn name(&self) -> &'static str {
        "view_layer"
    }

    fn build_nodes(&self, nodes: &mut NodeBuilder<'_>) -> Result<()> {
        let render = nodes.graph().mode() == EvaluationMode::Render;
        nodes.build_scene(render)?;
        for object in layer_objects(nodes.graph(), nodes.main(), render) {
            nodes.build_object(object, true)?;
        }
        Ok(())
    }

    fn build_relations(&self, relations: &mut RelationBuilder<'_>) {
        let render = relations.graph().mode() == EvaluationMode::Render;
        relations.build_scene(render);
        let objects = layer_objects(relations.graph(), relations.main(), render);
        for object in &objects {
            relations.build_object(*object);
        }
        relations.build_view_layer_bases(&objects);
    }
}

/// The render scene: objects visible for rendering, the active and marker
/// cameras, the world and the compositor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderPipeline;

impl BuilderPipeline for RenderPipeline {
    fn name(&self) -> &'static str {
        "render"
    }

    fn build_nodes(&self, nodes: &mut NodeBuilder<'_>) -> Result<()> {
        nodes.build_scene(true)?;
        for object in layer_objects(nodes.graph(), nodes.main(), true) {
            nodes.build_object(object, true)?;
        }
        Ok(())
    }

    fn build_relations(&self, relations: &mut RelationBuilder<'_>) {
        relations.build_scene(true);
        let objects = layer_objects(relations.graph(), relations.main(), true);
        for object in &objects {
            relations.build_object(*object);
        }
        relations.build_view_layer_bases(&objects);
    }
}

/// Every object of the main database, regardless of view layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllObjectsPipeline;

impl AllObjectsPipeline {
    fn objects(main: &Main) -> Vec<IdHandle> {
        main.objects().map(|(id, _)| id).collect()
    }
}

impl BuilderPipeline for AllObjectsPipeline {
    fn name(&self) -> &'static str {
        "all_objects"
    }

    fn build_nodes(&self, nodes: &mut NodeBuilder<'_>) -> Result<()> {
        nodes.build_scene(false)?;
        for object in Self::objects(nodes.main()) {
            nodes.build_object(object, true)?;
        }
        Ok(())
    }

    fn build_relations(&self, relations: &mut RelationBuilder<'_>) {
        relations.build_scene(false);
        let objects = Self::objects(relations.main());
        for object in &objects {
            relations.build_object(*object);
        }
        relations.build_view_layer_bases(&objects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Collection, Object, ObjectType, Scene};

    #[test]
    fn excluded_and_hidden_collections_are_skipped() {
        let mut main = Main::new();
        let a = main.add_object("A", Object::new(ObjectType::Empty));
        let b = main.add_object("B", Object::new(ObjectType::Empty));
        let c = main.add_object("C", Object::new(ObjectType::Empty));
        let mut hidden = Object::new(ObjectType::Empty);
        hidden.hide_viewport = true;
        let hidden = main.add_object("Hidden", hidden);

        let excluded = main.add_collection("Excluded", Collection::with_objects([b]));
        let mut render_only = Collection::with_objects([c]);
        render_only.hide_viewport = true;
        let render_only = main.add_collection("RenderOnly", render_only);
        let master = main.add_collection(
            "Master",
            Collection::with_objects([a, hidden, a])
                .with_child(excluded)
                .with_child(render_only),
        );
        let scene = main.add_scene("Scene", Scene::new(master));

        let mut layer = ViewLayer::new("ViewLayer");
        layer.excluded_collections.push(excluded);

        assert_eq!(view_layer_objects(&main, scene, &layer, false), vec![a]);
        assert_eq!(view_layer_objects(&main, scene, &layer, true), vec![a, hidden, c]);
    }

    #[test]
    fn collection_loops_terminate() {
        let mut main = Main::new();
        let a = main.add_object("A", Object::new(ObjectType::Empty));
        let master = main.add_collection("Master", Collection::with_objects([a]));
        main.collection_mut(master).unwrap().children.push(master);
        let scene = main.add_scene("Scene", Scene::new(master));

        let layer = ViewLayer::new("ViewLayer");
        assert_eq!(view_layer_objects(&main, scene, &layer, false), vec![a]);
    }
}
