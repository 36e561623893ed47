//! Integration Tests for Graph Construction and Tagging
//!
//! These tests build graphs through the public API and check the relations
//! they end up with and how tags flush along them.

use std::collections::BTreeSet;
use std::sync::Arc;

use depsgraph_core::api::{self, Depsgraph};
use depsgraph_core::builder::DepsNodeHandle;
use depsgraph_core::graph::{NodeType, ObjectComponent, OperationCode, OperationIndex, OperationKey, RelationFlags};
use depsgraph_core::host::{
    Camera, Collection, Constraint, ConstraintTarget, CustomDataMask, ExternalModifier, IdHandle, Main, MainDatabase, Mesh, Modifier, NodeTree,
    NodeTreeType, Object, ObjectType, Parent, ParentKind, Scene, TimeMarker, UpdateDepsgraph, UpdateDepsgraphContext,
};
use depsgraph_core::tag;
use depsgraph_core::{DepsgraphConfig, EvaluationMode, Graph, RecalcFlags, UpdateSource};

fn new_graph(main: &Arc<MainDatabase>, scene: IdHandle) -> Depsgraph {
    api::graph_new_with_config(
        main,
        scene,
        "ViewLayer",
        EvaluationMode::Viewport,
        DepsgraphConfig::default(),
    )
    .unwrap()
}

/// Build, then evaluate once so every tag of the first build is cleared.
fn built(main: Main, scene: IdHandle) -> Depsgraph {
    let database = MainDatabase::new(main);
    let graph = new_graph(&database, scene);
    api::graph_build_view_layer(&graph).unwrap();
    api::graph_evaluate(&graph).unwrap();
    graph
}

fn op(graph: &Graph, id: IdHandle, component: NodeType, code: OperationCode) -> OperationIndex {
    graph
        .find_operation(&OperationKey::new(id, component, code))
        .unwrap_or_else(|| panic!("missing {component}/{code}"))
}

fn needs_update(graph: &Graph, id: IdHandle, component: NodeType, code: OperationCode) -> bool {
    graph.operation(op(graph, id, component, code)).needs_update()
}

/// Scene whose master collection holds `objects`.
fn scene_with(main: &mut Main, objects: &[IdHandle]) -> IdHandle {
    let master = main.add_collection("Master", Collection::with_objects(objects.iter().copied()));
    main.add_scene("Scene", Scene::new(master))
}

fn mesh_object(main: &mut Main, name: &str) -> Object {
    let mesh = main.add_mesh(format!("{name}Mesh"), Mesh::default());
    Object::new(ObjectType::Mesh).with_data(mesh)
}

/// Test that a parent's final transform feeds the child's parent step and
/// that moving the parent flushes into the child.
#[test]
fn transform_dependency_on_parent() {
    let mut main = Main::new();
    let b = main.add_object("B", Object::new(ObjectType::Empty));
    let a = main.add_object("A", Object::new(ObjectType::Empty).with_parent(b));
    let scene = scene_with(&mut main, &[a, b]);
    let graph = built(main, scene);

    {
        let graph = graph.lock();
        let from = op(&graph, b, NodeType::Transform, OperationCode::TransformFinal);
        let to = op(&graph, a, NodeType::Transform, OperationCode::TransformParent);
        let relation = graph.find_relation(from, to).expect("parent relation");
        assert_eq!(graph.relation(relation).description(), "Parent Relation");
        assert!(!needs_update(&graph, a, NodeType::Transform, OperationCode::TransformFinal));
    }

    api::graph_id_tag_update(&graph, b, RecalcFlags::TRANSFORM, UpdateSource::UserEdit);

    let graph = graph.lock();
    assert!(needs_update(&graph, a, NodeType::Transform, OperationCode::TransformFinal));
    assert!(graph.id_node_for(a).unwrap().recalc().contains(RecalcFlags::TRANSFORM));
}

/// Test that the geometry preprocess of a node tree is ordered before the
/// modifier but does not flush into it, while the tree output does.
#[test]
fn node_tree_preprocess_does_not_flush() {
    let mut main = Main::new();
    let tree = main.add_node_tree("Nodes", NodeTree::new(NodeTreeType::Geometry));
    let object = mesh_object(&mut main, "Cube").with_modifier(Modifier::Nodes { node_tree: Some(tree) });
    let object = main.add_object("Cube", object);
    let scene = scene_with(&mut main, &[object]);
    let graph = built(main, scene);

    {
        let mut graph = graph.lock();
        let preprocess = op(&graph, tree, NodeType::NtreeGeometryPreprocess, OperationCode::NtreeGeometryPreprocess);
        let eval = op(&graph, object, NodeType::Geometry, OperationCode::GeometryEval);
        let relation = graph.find_relation(preprocess, eval).expect("preprocess relation");
        assert!(graph.relation(relation).flags().contains(RelationFlags::NO_FLUSH));

        let key = OperationKey::new(tree, NodeType::NtreeGeometryPreprocess, OperationCode::NtreeGeometryPreprocess);
        tag::tag_operation(&mut graph, &key, UpdateSource::UserEdit).unwrap();
        assert!(!graph.operation(eval).needs_update());
    }

    let mut graph = graph.lock();
    let key = OperationKey::new(tree, NodeType::NtreeOutput, OperationCode::NtreeOutput);
    tag::tag_operation(&mut graph, &key, UpdateSource::UserEdit).unwrap();
    assert!(needs_update(&graph, object, NodeType::Geometry, OperationCode::GeometryEval));
}

/// Test that a point cache is reset by user edits of an effector but not
/// by time changes.
#[test]
fn point_cache_flushes_on_user_edit_only() {
    let mut main = Main::new();
    let effector = main.add_object("Wind", Object::new(ObjectType::Empty));
    let cloth = mesh_object(&mut main, "Cloth").with_modifier(Modifier::Cloth {
        collision_collection: None,
        effectors: vec![effector],
    });
    let cloth = main.add_object("Cloth", cloth);
    let scene = scene_with(&mut main, &[effector, cloth]);
    let graph = built(main, scene);

    {
        let graph = graph.lock();
        let from = op(&graph, effector, NodeType::Transform, OperationCode::TransformFinal);
        let to = op(&graph, cloth, NodeType::PointCache, OperationCode::PointCacheReset);
        let relation = graph.find_relation(from, to).expect("point cache relation");
        assert!(graph
            .relation(relation)
            .flags()
            .contains(RelationFlags::FLUSH_USER_EDIT_ONLY));
    }

    api::graph_id_tag_update(&graph, effector, RecalcFlags::TRANSFORM, UpdateSource::Time);
    {
        let graph = graph.lock();
        assert!(needs_update(&graph, cloth, NodeType::Geometry, OperationCode::GeometryEval));
        assert!(!needs_update(&graph, cloth, NodeType::PointCache, OperationCode::PointCacheReset));
    }

    api::graph_id_tag_update(&graph, effector, RecalcFlags::TRANSFORM, UpdateSource::UserEdit);
    let graph = graph.lock();
    assert!(needs_update(&graph, cloth, NodeType::PointCache, OperationCode::PointCacheReset));
}

/// Test that a collection mask reaches objects inside instanced
/// collections.
#[test]
fn collection_mask_reaches_instanced_objects() {
    let mut main = Main::new();
    let rock = mesh_object(&mut main, "Rock");
    let rock = main.add_object("Rock", rock);
    let rocks = main.add_collection("Rocks", Collection::with_objects([rock]));
    let instancer = main.add_object("Instancer", Object::instancer(rocks));
    let set = main.add_collection("Set", Collection::with_objects([instancer]));

    let mut tree = NodeTree::new(NodeTreeType::Geometry);
    tree.collections.push(set);
    tree.required_customdata = CustomDataMask::UV | CustomDataMask::COLOR;
    let tree = main.add_node_tree("Scatter", tree);
    let ground = mesh_object(&mut main, "Ground").with_modifier(Modifier::Nodes { node_tree: Some(tree) });
    let ground = main.add_object("Ground", ground);
    let scene = scene_with(&mut main, &[ground]);
    let graph = built(main, scene);

    let graph = graph.lock();
    let rock_node = graph.id_node_for(rock).expect("rock is built through the instancer");
    assert_eq!(rock_node.customdata_mask(), CustomDataMask::UV | CustomDataMask::COLOR);

    let done = op(&graph, set, NodeType::Geometry, OperationCode::GeometryEvalDone);
    let eval = op(&graph, ground, NodeType::Geometry, OperationCode::GeometryEval);
    assert!(graph.find_relation(done, eval).is_some());
    let rocks_done = op(&graph, rocks, NodeType::Geometry, OperationCode::GeometryEvalDone);
    assert!(graph.find_relation(rocks_done, done).is_some());
}

/// A modifier that reads the scene camera, the way a follow-track user does.
#[derive(Debug)]
struct CameraUser;

impl UpdateDepsgraph for CameraUser {
    fn name(&self) -> &str {
        "Camera User"
    }

    fn update_depsgraph(&self, ctx: &UpdateDepsgraphContext, node: &mut DepsNodeHandle<'_, '_>) {
        api::add_scene_camera_relation(node, ctx.scene, ObjectComponent::Transform, "Scene Camera");
    }
}

fn camera_scene(active: bool) -> (Main, IdHandle, IdHandle, Vec<(IdHandle, IdHandle)>) {
    let mut main = Main::new();
    let mut cameras = Vec::new();
    for name in ["C0", "C1", "C2"] {
        let data = main.add_camera(name, Camera::default());
        let object = main.add_object(name, Object::new(ObjectType::Camera).with_data(data));
        cameras.push((object, data));
    }
    let user = mesh_object(&mut main, "User")
        .with_modifier(Modifier::External(ExternalModifier(Arc::new(CameraUser))));
    let user = main.add_object("User", user);
    let scene = scene_with(&mut main, &[user]);
    {
        let scene = main.scene_mut(scene).unwrap();
        if active {
            scene.camera = Some(cameras[0].0);
        }
        scene.markers = vec![
            TimeMarker::new(1, "F_01").with_camera(cameras[0].0),
            TimeMarker::new(20, "F_20").with_camera(cameras[1].0),
            TimeMarker::new(40, "F_40").with_camera(cameras[2].0),
        ];
    }
    (main, scene, user, cameras)
}

/// Test that the active camera and every marker camera are relation
/// sources, each with its camera parameters, without duplicates.
#[test]
fn marker_cameras_are_covered() {
    let (main, scene, user, cameras) = camera_scene(true);
    let graph = built(main, scene);
    let graph = graph.lock();

    let eval = op(&graph, user, NodeType::Geometry, OperationCode::GeometryEval);
    let sources: Vec<_> = graph
        .operation(eval)
        .inlinks()
        .iter()
        .map(|relation| graph.relation(*relation))
        .filter(|relation| relation.description() == "Scene Camera")
        .map(|relation| relation.from())
        .collect();
    assert_eq!(sources.len(), 6);
    let distinct: BTreeSet<_> = sources.iter().copied().collect();
    assert_eq!(distinct.len(), 6);

    for (object, data) in cameras {
        let transform = op(&graph, object, NodeType::Transform, OperationCode::TransformFinal);
        let parameters = op(&graph, data, NodeType::Parameters, OperationCode::ParametersEval);
        assert!(sources.contains(&transform));
        assert!(sources.contains(&parameters));
    }
    assert!(graph.validate().is_empty());
}

/// Test that marker cameras are used when the scene has no active camera.
#[test]
fn marker_cameras_without_active_camera() {
    let (main, scene, user, cameras) = camera_scene(false);
    let graph = built(main, scene);
    let graph = graph.lock();

    let eval = op(&graph, user, NodeType::Geometry, OperationCode::GeometryEval);
    for (object, data) in cameras {
        let transform = op(&graph, object, NodeType::Transform, OperationCode::TransformFinal);
        let parameters = op(&graph, data, NodeType::Parameters, OperationCode::ParametersEval);
        assert!(graph.find_relation(transform, eval).is_some());
        assert!(graph.find_relation(parameters, eval).is_some());
    }
}

/// Test that a stale broadcast reaches every graph of a main database,
/// re-evaluates the scene's bases and hierarchy, and that each graph
/// rebuilds exactly once.
#[test]
fn stale_broadcast_rebuilds_each_graph_once() {
    let mut main = Main::new();
    let cube = main.add_object("Cube", Object::new(ObjectType::Empty));
    let scene = scene_with(&mut main, &[cube]);
    let database = MainDatabase::new(main);

    let graphs: Vec<Depsgraph> = (0..3).map(|_| new_graph(&database, scene)).collect();
    for graph in &graphs {
        api::graph_build_view_layer(graph).unwrap();
        api::graph_evaluate(graph).unwrap();
        assert!(!graph.lock().need_update_relations());
    }

    assert_eq!(api::tag_all_relations_stale(&database), 3);

    for graph in &graphs {
        {
            let graph = graph.lock();
            assert!(graph.need_update_relations());
            let recalc = graph.id_node_for(scene).unwrap().recalc();
            assert!(recalc.contains(RecalcFlags::BASE_FLAGS | RecalcFlags::HIERARCHY));
            assert!(needs_update(&graph, scene, NodeType::Parameters, OperationCode::ViewLayerEval));
        }
        assert!(api::graph_relations_update(graph).unwrap());
        assert!(!api::graph_relations_update(graph).unwrap());
        let graph = graph.lock();
        assert_eq!(graph.build_count(), 2);
        assert!(needs_update(&graph, scene, NodeType::Parameters, OperationCode::ViewLayerEval));
        assert!(needs_update(&graph, scene, NodeType::Parameters, OperationCode::Hierarchy));
    }
}

/// Test that relations to data-blocks that no longer exist are reported
/// instead of failing the build.
#[test]
fn dangling_constraint_target_is_reported() {
    let mut main = Main::new();
    let gone = main.add_object("Gone", Object::new(ObjectType::Empty));
    let tracker = Object::new(ObjectType::Empty).with_constraint(Constraint::TrackTo(ConstraintTarget::object(gone)));
    let tracker = main.add_object("Tracker", tracker);
    let scene = scene_with(&mut main, &[tracker]);
    main.remove(gone);

    let database = MainDatabase::new(main);
    let graph = new_graph(&database, scene);
    let report = api::graph_build_view_layer(&graph).unwrap();

    assert!(report.possibly_incomplete());
    assert!(graph.lock().possibly_incomplete());
    let diagnostic = &report.diagnostics[0];
    assert_eq!(diagnostic.description, "Track To");
    assert!(diagnostic.from.starts_with("<missing"));
    assert_eq!(diagnostic.to, "OBTracker/TRANSFORM/TRANSFORM_CONSTRAINTS");
}

/// Test that a parenting loop is broken and reported.
#[test]
fn parent_loop_is_broken() {
    let mut main = Main::new();
    let a = main.add_object("A", Object::new(ObjectType::Empty));
    let b = main.add_object("B", Object::new(ObjectType::Empty).with_parent(a));
    main.object_mut(a).unwrap().parent = Some(Parent {
        object: b,
        kind: ParentKind::Object,
    });
    let scene = scene_with(&mut main, &[a, b]);

    let database = MainDatabase::new(main);
    let graph = new_graph(&database, scene);
    let report = api::graph_build_view_layer(&graph).unwrap();

    assert_eq!(report.cycles.len(), 1);
    let graph = graph.lock();
    assert_eq!(graph.relations().filter(|(_, relation)| relation.is_cyclic()).count(), 1);
    assert_eq!(graph.evaluation_order().len(), graph.operation_count());
}

/// A modifier that records what its handle reports.
#[derive(Debug, Default)]
struct HandleProbe {
    seen: std::sync::Mutex<Vec<(IdHandle, bool)>>,
}

impl UpdateDepsgraph for HandleProbe {
    fn name(&self) -> &str {
        "Handle Probe"
    }

    fn update_depsgraph(&self, _ctx: &UpdateDepsgraphContext, node: &mut DepsNodeHandle<'_, '_>) {
        let id = api::get_id_from_handle(node);
        let built = api::get_graph_from_handle(node).id_node_for(id).is_some();
        self.seen.lock().unwrap().push((id, built));
    }
}

/// Test that a callback handle reports its owner and the graph being built.
#[test]
fn handle_reports_owner_and_graph() {
    let probe = Arc::new(HandleProbe::default());
    let mut main = Main::new();
    let object = mesh_object(&mut main, "Probed")
        .with_modifier(Modifier::External(ExternalModifier(probe.clone())));
    let object = main.add_object("Probed", object);
    let scene = scene_with(&mut main, &[object]);
    let _graph = built(main, scene);

    assert_eq!(*probe.seen.lock().unwrap(), vec![(object, true)]);
}

/// Test that tagging through the main database reaches every graph built
/// from it.
#[test]
fn tag_reaches_every_graph_of_a_main() {
    let mut main = Main::new();
    let cube = main.add_object("Cube", Object::new(ObjectType::Empty));
    let scene = scene_with(&mut main, &[cube]);
    let database = MainDatabase::new(main);
    let graphs: Vec<Depsgraph> = (0..2).map(|_| new_graph(&database, scene)).collect();
    for graph in &graphs {
        api::graph_build_view_layer(graph).unwrap();
        api::graph_evaluate(graph).unwrap();
    }

    assert!(api::id_tag_update_all(&database, cube, RecalcFlags::TRANSFORM, UpdateSource::UserEdit) > 0);
    for graph in &graphs {
        let graph = graph.lock();
        assert!(needs_update(&graph, cube, NodeType::Transform, OperationCode::TransformFinal));
    }
}

/// Test that graphs of different main databases build on separate threads
/// and register only under their own database.
#[test]
fn graphs_of_distinct_mains_build_in_parallel() {
    let results: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..2usize)
            .map(|worker| {
                scope.spawn(move || {
                    let mut main = Main::new();
                    let objects: Vec<IdHandle> = (0..=worker)
                        .map(|i| main.add_object(format!("Object{i}"), Object::new(ObjectType::Empty)))
                        .collect();
                    let scene = scene_with(&mut main, &objects);
                    let database = MainDatabase::new(main);
                    let graphs: Vec<Depsgraph> = (0..worker + 1).map(|_| new_graph(&database, scene)).collect();
                    for graph in &graphs {
                        api::graph_build_view_layer(graph).unwrap();
                        assert!(graph.lock().validate().is_empty());
                    }
                    let registered = depsgraph_core::registry::count_for(database.id());
                    let id_nodes = graphs[0].lock().id_node_count();
                    drop(graphs);
                    (database.id(), registered, id_nodes)
                })
            })
            .collect();
        workers.into_iter().map(|worker| worker.join().unwrap()).collect()
    });

    assert_ne!(results[0].0, results[1].0);
    assert_eq!((results[0].1, results[0].2), (1, 2));
    assert_eq!((results[1].1, results[1].2), (2, 3));
    for (main, _, _) in results {
        assert_eq!(depsgraph_core::registry::count_for(main), 0);
    }
}
