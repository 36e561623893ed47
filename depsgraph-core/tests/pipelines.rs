//! Integration Tests for Builder Pipelines
//!
//! Each pipeline seeds the graph differently. These tests check which
//! data-blocks end up in the graph, that rebuilds are deterministic, and
//! how unresolved references are handled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use depsgraph_core::api::{self, Depsgraph};
use depsgraph_core::debug::GraphStats;
use depsgraph_core::eval::EvalCallback;
use depsgraph_core::graph::{ComponentKey, NodeType, OperationCode, OperationKey, RelationFlags};
use depsgraph_core::host::{
    Action, AnimData, Collection, IdHandle, Main, MainDatabase, Mesh, Modifier, NodeTree, NodeTreeType, Object,
    ObjectType, Scene,
};
use depsgraph_core::{DepsgraphConfig, DepsgraphError, EvaluationMode, Graph, PlaceholderPolicy};

fn graph_for(main: Main, scene: IdHandle, mode: EvaluationMode, config: DepsgraphConfig) -> Depsgraph {
    let database = MainDatabase::new(main);
    api::graph_new_with_config(&database, scene, "ViewLayer", mode, config).unwrap()
}

fn viewport(main: Main, scene: IdHandle) -> Depsgraph {
    graph_for(main, scene, EvaluationMode::Viewport, DepsgraphConfig::default())
}

fn mesh_object(main: &mut Main, name: &str) -> IdHandle {
    let mesh = main.add_mesh(format!("{name}Mesh"), Mesh::default());
    main.add_object(name, Object::new(ObjectType::Mesh).with_data(mesh))
}

/// Operation paths and relations of a graph, sorted, for comparing builds.
fn snapshot(graph: &Graph) -> (Vec<String>, Vec<(String, String, String, RelationFlags)>) {
    let mut operations: Vec<String> = graph
        .operations()
        .map(|(index, _)| graph.describe_operation(index))
        .collect();
    operations.sort();
    let mut relations: Vec<_> = graph
        .relations()
        .map(|(_, relation)| {
            (
                graph.describe_operation(relation.from()),
                graph.describe_operation(relation.to()),
                relation.description().to_string(),
                relation.flags(),
            )
        })
        .collect();
    relations.sort_by(|a, b| (&a.0, &a.1, &a.2).cmp(&(&b.0, &b.1, &b.2)));
    (operations, relations)
}

/// A scene with a small parent hierarchy, a modifier and an animated object.
fn busy_scene() -> (Main, IdHandle) {
    let mut main = Main::new();
    let root = main.add_object("Root", Object::new(ObjectType::Empty));
    let target = main.add_object("Target", Object::new(ObjectType::Empty).with_parent(root));
    let cube = mesh_object(&mut main, "Cube");
    main.object_mut(cube).unwrap().modifiers.push(Modifier::Shrinkwrap { target: Some(target) });
    let action = main.add_action("Spin", Action::default());
    let spinner = main.add_object(
        "Spinner",
        Object::new(ObjectType::Empty).with_anim(AnimData {
            action: Some(action),
            drivers: Vec::new(),
        }),
    );
    let child = main.add_collection("Props", Collection::with_objects([spinner]));
    let master = main.add_collection("Master", Collection::with_objects([root, target, cube]).with_child(child));
    let scene = main.add_scene("Scene", Scene::new(master));
    (main, scene)
}

/// Test that an empty view layer yields a graph with only the scene.
#[test]
fn empty_view_layer_builds_scene_only() {
    let mut main = Main::new();
    let master = main.add_collection("Master", Collection::default());
    let scene = main.add_scene("Scene", Scene::new(master));
    let graph = viewport(main, scene);

    let report = api::graph_build_view_layer(&graph).unwrap();
    assert_eq!(report.id_nodes, 1);
    let graph = graph.lock();
    assert_eq!(graph.id_node_count(), 1);
    assert!(graph.id_node_for(scene).is_some());
    assert!(graph.validate().is_empty());
}

/// Test that a graph can only be created for an existing view layer.
#[test]
fn unknown_view_layer_is_rejected() {
    let mut main = Main::new();
    let master = main.add_collection("Master", Collection::default());
    let scene = main.add_scene("Scene", Scene::new(master));
    let database = MainDatabase::new(main);

    let result = api::graph_new_with_config(
        &database,
        scene,
        "Nope",
        EvaluationMode::Viewport,
        DepsgraphConfig::default(),
    );
    assert!(matches!(result, Err(DepsgraphError::UnknownViewLayer(_))));
}

/// Test that building twice from the same data gives the same graph and
/// leaves nothing stale.
#[test]
fn rebuild_is_deterministic() {
    let (main, scene) = busy_scene();
    let graph = viewport(main, scene);

    api::graph_build_view_layer(&graph).unwrap();
    let first = snapshot(&graph.lock());
    api::graph_build_view_layer(&graph).unwrap();
    let second = snapshot(&graph.lock());

    assert_eq!(first, second);
    assert!(graph.lock().validate().is_empty());
    assert!(!api::graph_relations_update(&graph).unwrap());
}

/// Test that every operation is evaluated after the execution order puts
/// each relation source before its target.
#[test]
fn evaluation_order_respects_relations() {
    let (main, scene) = busy_scene();
    let graph = viewport(main, scene);
    api::graph_build_view_layer(&graph).unwrap();

    let graph = graph.lock();
    let order = graph.evaluation_order();
    assert_eq!(order.len(), graph.operation_count());
    let mut position = vec![0; graph.operation_count()];
    for (rank, op) in order.iter().enumerate() {
        position[op.index()] = rank;
    }
    for (_, relation) in graph.relations() {
        if !relation.is_cyclic() {
            assert!(position[relation.from().index()] < position[relation.to().index()]);
        }
    }
}

/// Test that evaluation runs the registered callbacks and clears all tags.
#[test]
fn evaluation_runs_callbacks() {
    let (main, scene) = busy_scene();
    let graph = viewport(main, scene);
    let runs = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&runs);
    graph.lock().callbacks_mut().set(
        OperationCode::TransformFinal,
        EvalCallback::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    );
    api::graph_build_view_layer(&graph).unwrap();

    let report = api::graph_evaluate(&graph).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 4);
    assert_eq!(report.callbacks_run, 4);
    assert_eq!(GraphStats::collect(&graph.lock()).needs_update, 0);

    let report = api::graph_evaluate(&graph).unwrap();
    assert!(report.evaluated.is_empty());
}

/// Test that a frame change only reaches animated data-blocks.
#[test]
fn time_change_reaches_animated_objects() {
    let (main, scene) = busy_scene();
    let (spinner, root) = {
        let spinner = main.iter().find(|(_, block)| block.name == "Spinner").map(|(id, _)| id);
        let root = main.iter().find(|(_, block)| block.name == "Root").map(|(id, _)| id);
        (spinner.unwrap(), root.unwrap())
    };
    let graph = viewport(main, scene);
    api::graph_build_view_layer(&graph).unwrap();
    api::graph_evaluate(&graph).unwrap();

    assert!(api::graph_time_tag_update(&graph) > 0);
    let graph = graph.lock();
    let animated = OperationKey::new(spinner, NodeType::Transform, OperationCode::TransformFinal);
    let still = OperationKey::new(root, NodeType::Transform, OperationCode::TransformFinal);
    assert!(graph.operation(graph.find_operation(&animated).unwrap()).needs_update());
    assert!(!graph.operation(graph.find_operation(&still).unwrap()).needs_update());
}

/// Test that the render pipeline skips objects hidden for rendering and
/// builds the compositor with its render layers.
#[test]
fn render_builds_compositor_without_hidden_objects() {
    let mut main = Main::new();
    let visible = main.add_object("Visible", Object::new(ObjectType::Empty));
    let mut helper = Object::new(ObjectType::Empty);
    helper.hide_render = true;
    let helper = main.add_object("Helper", helper);
    let master = main.add_collection("Master", Collection::with_objects([visible, helper]));
    let scene = main.add_scene("Scene", Scene::new(master));
    let mut compositor = NodeTree::new(NodeTreeType::Compositor);
    compositor.render_layer_scenes.push(scene);
    let compositor = main.add_node_tree("Compositing", compositor);
    main.scene_mut(scene).unwrap().compositor_tree = Some(compositor);

    let graph = graph_for(main, scene, EvaluationMode::Render, DepsgraphConfig::default());
    api::graph_build_render(&graph).unwrap();
    {
        let graph = graph.lock();
        assert!(graph.id_node_for(visible).is_some());
        assert!(graph.id_node_for(helper).is_none());
        let scene_eval = OperationKey::new(scene, NodeType::Parameters, OperationCode::SceneEval);
        let output = OperationKey::new(compositor, NodeType::NtreeOutput, OperationCode::NtreeOutput);
        let relation = graph
            .find_relation(graph.find_operation(&scene_eval).unwrap(), graph.find_operation(&output).unwrap())
            .unwrap();
        assert_eq!(graph.relation(relation).description(), "Render Layer");
    }

    api::graph_build_view_layer(&graph).unwrap();
    let graph = graph.lock();
    assert!(graph.id_node_for(helper).is_none());
    assert!(graph.id_node_for(compositor).is_some());
}

/// Test that the viewport skips the compositor.
#[test]
fn viewport_skips_compositor() {
    let mut main = Main::new();
    let master = main.add_collection("Master", Collection::default());
    let scene = main.add_scene("Scene", Scene::new(master));
    let compositor = main.add_node_tree("Compositing", NodeTree::new(NodeTreeType::Compositor));
    main.scene_mut(scene).unwrap().compositor_tree = Some(compositor);
    let graph = viewport(main, scene);

    api::graph_build_view_layer(&graph).unwrap();
    assert!(graph.lock().id_node_for(compositor).is_none());
}

/// Test that the compositor preview builds the tree and what it reads.
#[test]
fn compositor_preview_builds_tree() {
    let mut main = Main::new();
    let master = main.add_collection("Master", Collection::default());
    let scene = main.add_scene("Scene", Scene::new(master));
    let watched = main.add_object("Watched", Object::new(ObjectType::Empty));
    let mut tree = NodeTree::new(NodeTreeType::Compositor);
    tree.objects.push(watched);
    let tree = main.add_node_tree("Preview", tree);
    let graph = viewport(main, scene);

    api::graph_build_compositor_preview(&graph, tree).unwrap();
    let graph = graph.lock();
    assert!(graph.id_node_for(tree).is_some());
    let from = graph
        .find_operation(&OperationKey::new(watched, NodeType::Transform, OperationCode::TransformFinal))
        .unwrap();
    let to = graph
        .find_operation(&OperationKey::new(tree, NodeType::NtreeOutput, OperationCode::NtreeOutput))
        .unwrap();
    assert!(graph.find_relation(from, to).is_some());
}

/// Test that the compositor preview rejects seeds that are not node trees
/// and leaves the previous graph alone.
#[test]
fn compositor_preview_rejects_objects() {
    let (main, scene) = busy_scene();
    let object = main.iter().find(|(_, block)| block.name == "Root").map(|(id, _)| id).unwrap();
    let graph = viewport(main, scene);
    api::graph_build_view_layer(&graph).unwrap();
    let operations = graph.lock().operation_count();

    let result = api::graph_build_compositor_preview(&graph, object);
    assert!(matches!(result, Err(DepsgraphError::UnexpectedDataBlock { .. })));
    assert_eq!(graph.lock().operation_count(), operations);
}

/// Test that an explicit id list builds those ids and their dependencies
/// and nothing else from the view layer.
#[test]
fn from_ids_builds_requested_ids() {
    let mut main = Main::new();
    let anchor = main.add_object("Anchor", Object::new(ObjectType::Empty));
    let loose = main.add_object("Loose", Object::new(ObjectType::Empty).with_parent(anchor));
    let unrelated = main.add_object("Unrelated", Object::new(ObjectType::Empty));
    let master = main.add_collection("Master", Collection::with_objects([unrelated]));
    let scene = main.add_scene("Scene", Scene::new(master));
    let graph = viewport(main, scene);

    api::graph_build_from_ids(&graph, &[loose]).unwrap();
    let graph = graph.lock();
    assert!(graph.id_node_for(loose).is_some());
    assert!(graph.id_node_for(anchor).is_some());
    assert!(graph.id_node_for(unrelated).is_none());
    assert!(graph.id_node_for(loose).unwrap().is_directly_visible());
    assert!(!graph.id_node_for(anchor).unwrap().is_directly_visible());
}

/// Test that the all-objects pipeline ignores view layer membership.
#[test]
fn all_objects_includes_unlinked_objects() {
    let mut main = Main::new();
    let linked = main.add_object("Linked", Object::new(ObjectType::Empty));
    let orphan = main.add_object("Orphan", Object::new(ObjectType::Empty));
    let master = main.add_collection("Master", Collection::with_objects([linked]));
    let scene = main.add_scene("Scene", Scene::new(master));
    let graph = viewport(main, scene);

    api::graph_build_all_objects(&graph).unwrap();
    let graph = graph.lock();
    assert!(graph.id_node_for(linked).is_some());
    assert!(graph.id_node_for(orphan).is_some());
}

/// Test that a collection instancing itself builds without looping.
#[test]
fn self_instancing_collection_terminates() {
    let mut main = Main::new();
    let looped = main.add_collection("Loop", Collection::default());
    let instancer = main.add_object("Instancer", Object::instancer(looped));
    main.collection_mut(looped).unwrap().objects.push(instancer);
    let master = main.add_collection("Master", Collection::default());
    let scene = main.add_scene("Scene", Scene::new(master));
    let graph = viewport(main, scene);

    let report = api::graph_build_from_collection(&graph, looped).unwrap();
    assert!(report.cycles.is_empty());
    let graph = graph.lock();
    assert!(graph.id_node_for(instancer).is_some());
    assert!(graph.id_node_for(looped).is_some());
    assert!(graph.validate().is_empty());
}

fn hooked_to_missing_bone() -> (Main, IdHandle, IdHandle) {
    let mut main = Main::new();
    let rig = main.add_object("Rig", Object::new(ObjectType::Armature));
    let cube = mesh_object(&mut main, "Cube");
    main.object_mut(cube).unwrap().modifiers.push(Modifier::Hook {
        object: Some(rig),
        subtarget: Some("Missing".to_string()),
    });
    let master = main.add_collection("Master", Collection::with_objects([rig, cube]));
    let scene = main.add_scene("Scene", Scene::new(master));
    (main, scene, rig)
}

/// Test that a reference to a bone that does not exist gets a placeholder
/// under the default policy.
#[test]
fn missing_bone_gets_placeholder() {
    let (main, scene, rig) = hooked_to_missing_bone();
    let graph = viewport(main, scene);

    let report = api::graph_build_view_layer(&graph).unwrap();
    assert!(report.placeholders > 0);
    assert!(!report.possibly_incomplete());
    let graph = graph.lock();
    let component = graph.find_component(&ComponentKey::bone(rig, "Missing")).unwrap();
    let operation = graph.component(component).operations().next().unwrap();
    assert!(graph.operation(operation).is_placeholder());
    assert_eq!(GraphStats::collect(&graph).placeholders, report.placeholders);
}

/// Test that without placeholders the same reference is reported.
#[test]
fn missing_bone_is_reported_without_placeholders() {
    let (main, scene, rig) = hooked_to_missing_bone();
    let config = DepsgraphConfig {
        placeholder_policy: PlaceholderPolicy::Never,
        ..DepsgraphConfig::default()
    };
    let graph = graph_for(main, scene, EvaluationMode::Viewport, config);

    let report = api::graph_build_view_layer(&graph).unwrap();
    assert_eq!(report.placeholders, 0);
    assert!(report.possibly_incomplete());
    assert!(report.diagnostics.iter().any(|diagnostic| diagnostic.description == "Hook Modifier"));
    assert!(graph.lock().find_component(&ComponentKey::bone(rig, "Missing")).is_none());
}
