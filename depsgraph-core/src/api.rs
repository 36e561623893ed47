//! Public Boundary
//!
//! Entry points for the rest of the application.
//!
//! - Lifecycle: [`graph_new`], [`graph_free`]
//! - Builds: one `graph_build_*` call per pipeline
//! - Tagging: [`graph_tag_relations_update`], [`graph_relations_update`],
//!   [`tag_all_relations_stale`], [`graph_id_tag_update`], [`id_tag_update_all`]
//! - Callback side: the `add_*` functions, used from modifiers and other
//!   code that declares dependencies through a [`DepsNodeHandle`]
//!
//! # Locking
//!
//! A [`Depsgraph`] owns its graph behind a mutex: one build or tag at a time
//! per graph. Builds take the read lock of the main database, so the host
//! must not hold its write lock while calling into this module.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::builder::pipeline::{
    self, collection_closure, AllObjectsPipeline, BuilderPipeline, CompositorPreviewPipeline,
    FromCollectionPipeline, FromIdsPipeline, RenderPipeline, ViewLayerPipeline,
};
use crate::builder::{BuildReport, DepsNodeHandle};
use crate::config::DepsgraphConfig;
use crate::error::{DepsgraphError, Result};
use crate::eval::{self, EvaluationReport};
use crate::graph::{
    ComponentKey, EvaluationMode, Graph, NodeType, ObjectComponent, OperationCode, OperationKey, RelationFlags,
    SceneComponent, SpecialEvalFlags,
};
use crate::host::{CustomDataMask, IdHandle, Main, MainDatabase, MainId, ObjectType};
use crate::registry::{self, GraphId, SharedGraph};
use crate::tag::{self, RecalcFlags, UpdateSource};

/// A registered dependency graph.
///
/// Dropping the handle unregisters the graph.
#[derive(Debug)]
pub struct Depsgraph {
    id: GraphId,
    main: MainId,
    graph: SharedGraph,
}

impl Depsgraph {
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Exclusive access to the graph.
    pub fn lock(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock()
    }

    pub fn shared(&self) -> &SharedGraph {
        &self.graph
    }
}

impl Drop for Depsgraph {
    fn drop(&mut self) {
        registry::unregister(self.main, self.id);
    }
}

/// Create an empty graph for a view layer of `scene`, configured from the
/// environment.
pub fn graph_new(
    main: &Arc<MainDatabase>,
    scene: IdHandle,
    view_layer: &str,
    mode: EvaluationMode,
) -> Result<Depsgraph> {
    graph_new_with_config(main, scene, view_layer, mode, DepsgraphConfig::from_env())
}

pub fn graph_new_with_config(
    main: &Arc<MainDatabase>,
    scene: IdHandle,
    view_layer: &str,
    mode: EvaluationMode,
    config: DepsgraphConfig,
) -> Result<Depsgraph> {
    {
        let data = main.read();
        let scene_data = data.scene(scene).ok_or(DepsgraphError::UnknownScene(scene))?;
        if scene_data.view_layer(view_layer).is_none() {
            return Err(DepsgraphError::UnknownViewLayer(view_layer.to_string()));
        }
    }
    let graph = Arc::new(Mutex::new(Graph::new(Arc::clone(main), scene, view_layer, mode, config)));
    let id = GraphId::next();
    registry::register(main.id(), id, &graph);
    tracing::debug!(graph = id.raw(), view_layer, ?mode, "created graph");
    Ok(Depsgraph {
        id,
        main: main.id(),
        graph,
    })
}

pub fn graph_free(graph: Depsgraph) {
    drop(graph);
}

// ----------------------------------------------------------------------
// Builds
// ----------------------------------------------------------------------

fn run(graph: &Depsgraph, pipeline: &dyn BuilderPipeline) -> Result<BuildReport> {
    pipeline::build(&mut graph.lock(), pipeline)
}

pub fn graph_build_view_layer(graph: &Depsgraph) -> Result<BuildReport> {
    run(graph, &ViewLayerPipeline)
}

pub fn graph_build_all_objects(graph: &Depsgraph) -> Result<BuildReport> {
    run(graph, &AllObjectsPipeline)
}

pub fn graph_build_render(graph: &Depsgraph) -> Result<BuildReport> {
    run(graph, &RenderPipeline)
}

pub fn graph_build_compositor_preview(graph: &Depsgraph, node_tree: IdHandle) -> Result<BuildReport> {
    run(graph, &CompositorPreviewPipeline::new(node_tree))
}

pub fn graph_build_from_ids(graph: &Depsgraph, ids: &[IdHandle]) -> Result<BuildReport> {
    run(graph, &FromIdsPipeline::new(ids.iter().copied()))
}

pub fn graph_build_from_collection(graph: &Depsgraph, collection: IdHandle) -> Result<BuildReport> {
    run(graph, &FromCollectionPipeline::new(collection))
}

// ----------------------------------------------------------------------
// Tagging
// ----------------------------------------------------------------------

/// Mark the relations stale and re-evaluate the scene's bases and
/// hierarchy.
pub fn graph_tag_relations_update(graph: &Depsgraph) {
    tag_relations_update(&mut graph.lock());
}

fn tag_relations_update(graph: &mut Graph) {
    graph.set_relations_stale(true);
    let scene = graph.scene();
    tag::tag_id(
        graph,
        scene,
        RecalcFlags::BASE_FLAGS | RecalcFlags::HIERARCHY,
        UpdateSource::Relations,
    );
}

/// Rebuild the view layer if the relations are stale. Returns whether a
/// rebuild happened.
pub fn graph_relations_update(graph: &Depsgraph) -> Result<bool> {
    let mut graph = graph.lock();
    if !graph.need_update_relations() {
        return Ok(false);
    }
    pipeline::build(&mut graph, &ViewLayerPipeline)?;
    Ok(true)
}

/// [`graph_tag_relations_update`] for every graph built from `main`.
/// Returns how many graphs were tagged.
pub fn tag_all_relations_stale(main: &MainDatabase) -> usize {
    let graphs = registry::all_for(main.id());
    for graph in &graphs {
        tag_relations_update(&mut graph.lock());
    }
    tracing::debug!(graphs = graphs.len(), "relations tagged stale");
    graphs.len()
}

/// Tag `id` in one graph. Returns how many operations became tagged.
pub fn graph_id_tag_update(graph: &Depsgraph, id: IdHandle, recalc: RecalcFlags, source: UpdateSource) -> usize {
    tag::tag_id(&mut graph.lock(), id, recalc, source)
}

/// Tag `id` in every graph built from `main`.
pub fn id_tag_update_all(main: &MainDatabase, id: IdHandle, recalc: RecalcFlags, source: UpdateSource) -> usize {
    registry::all_for(main.id())
        .iter()
        .map(|graph| tag::tag_id(&mut graph.lock(), id, recalc, source))
        .sum()
}

/// The current frame changed.
pub fn graph_time_tag_update(graph: &Depsgraph) -> usize {
    tag::tag_time_source(&mut graph.lock())
}

/// Bring the relations up to date, then run all tagged operations.
pub fn graph_evaluate(graph: &Depsgraph) -> Result<EvaluationReport> {
    graph_relations_update(graph)?;
    Ok(eval::evaluate(&mut graph.lock()))
}

// ----------------------------------------------------------------------
// Callback side
// ----------------------------------------------------------------------

pub fn object_has_geometry_component(main: &Main, object: IdHandle) -> bool {
    main.object(object).is_some_and(|object| object.has_geometry())
}

pub fn add_scene_relation(node: &mut DepsNodeHandle<'_, '_>, scene: IdHandle, component: SceneComponent, description: &str) {
    node.add_relation(ComponentKey::new(scene, component.into()), description, RelationFlags::empty());
}

pub fn add_object_relation(
    node: &mut DepsNodeHandle<'_, '_>,
    object: IdHandle,
    component: ObjectComponent,
    description: &str,
) {
    node.add_relation(ComponentKey::new(object, component.into()), description, RelationFlags::empty());
}

/// Relation from one bone of an armature object. Components other than
/// [`ObjectComponent::Bone`] address the whole object.
pub fn add_bone_relation(
    node: &mut DepsNodeHandle<'_, '_>,
    object: IdHandle,
    bone: &str,
    component: ObjectComponent,
    description: &str,
) {
    let key = match component {
        ObjectComponent::Bone => ComponentKey::bone(object, bone),
        other => ComponentKey::new(object, other.into()),
    };
    node.add_relation(key, description, RelationFlags::empty());
}

/// Relations from the scene's active camera and from every distinct
/// camera referenced by a timeline marker. Camera objects also contribute
/// the parameters of their camera data.
pub fn add_scene_camera_relation(
    node: &mut DepsNodeHandle<'_, '_>,
    scene: IdHandle,
    component: ObjectComponent,
    description: &str,
) {
    let main = node.main();
    let Some(scene) = main.scene(scene) else {
        return;
    };
    let cameras = scene.camera.into_iter().chain(scene.marker_cameras());
    for camera in cameras {
        add_object_relation(node, camera, component, description);
        let data = main
            .object(camera)
            .filter(|object| object.object_type == ObjectType::Camera)
            .and_then(|object| object.data);
        if let Some(data) = data {
            node.add_relation(
                ComponentKey::new(data, NodeType::Parameters),
                description,
                RelationFlags::empty(),
            );
        }
    }
}

/// Depend on the geometry of a collection and everything in it.
pub fn add_collection_geometry_relation(node: &mut DepsNodeHandle<'_, '_>, collection: IdHandle, description: &str) {
    node.add_relation(
        OperationKey::new(collection, NodeType::Geometry, OperationCode::GeometryEvalDone),
        description,
        RelationFlags::empty(),
    );
}

/// Widen the custom-data mask of every object in `collection`, following
/// child collections and instancing empties. Each object is visited once.
pub fn add_collection_geometry_customdata_mask(
    node: &mut DepsNodeHandle<'_, '_>,
    collection: IdHandle,
    mask: CustomDataMask,
) {
    for object in collection_closure(node.main(), collection) {
        node.add_customdata_mask(object, mask);
    }
}

/// Depend on the output of a node tree. The geometry preprocess of the
/// tree is ordered before the handle but does not flush into it.
pub fn add_node_tree_output_relation(node: &mut DepsNodeHandle<'_, '_>, node_tree: IdHandle, description: &str) {
    node.add_relation(
        OperationKey::new(node_tree, NodeType::NtreeOutput, OperationCode::NtreeOutput),
        description,
        RelationFlags::empty(),
    );
    node.add_relation(
        OperationKey::new(
            node_tree,
            NodeType::NtreeGeometryPreprocess,
            OperationCode::NtreeGeometryPreprocess,
        ),
        description,
        RelationFlags::NO_FLUSH,
    );
}

pub fn add_object_cache_relation(
    node: &mut DepsNodeHandle<'_, '_>,
    cache_file: IdHandle,
    component: ObjectComponent,
    description: &str,
) {
    node.add_relation(ComponentKey::new(cache_file, component.into()), description, RelationFlags::empty());
}

/// Relation from `object` to the handle, plus a relation into the point
/// cache of the handle's owner that only user edits flush through.
pub fn add_object_pointcache_relation(
    node: &mut DepsNodeHandle<'_, '_>,
    object: IdHandle,
    component: ObjectComponent,
    description: &str,
) {
    let source = ComponentKey::new(object, component.into());
    node.add_relation(source.clone(), description, RelationFlags::empty());

    let point_cache = ComponentKey::new(node.id(), NodeType::PointCache);
    if node.graph().find_component(&point_cache).is_none() {
        let from = node.main().id_name(object);
        let to = format!("{}/{}", node.main().id_name(point_cache.id), NodeType::PointCache);
        node.builder()
            .report(from, to, description, "owner has no point cache");
        return;
    }
    node.builder()
        .add_relation(source, point_cache, "Point Cache", RelationFlags::FLUSH_USER_EDIT_ONLY);
}

/// Depend on any change of a data-block.
pub fn add_generic_id_relation(node: &mut DepsNodeHandle<'_, '_>, id: IdHandle, description: &str) {
    node.add_relation(
        OperationKey::new(id, NodeType::GenericDatablock, OperationCode::GenericDatablockUpdate),
        description,
        RelationFlags::empty(),
    );
}

pub fn add_depends_on_transform_relation(node: &mut DepsNodeHandle<'_, '_>, description: &str) {
    node.add_depends_on_transform_relation(description);
}

pub fn add_special_eval_flag(node: &mut DepsNodeHandle<'_, '_>, id: IdHandle, flag: SpecialEvalFlags) {
    node.add_special_eval_flag(id, flag);
}

pub fn add_customdata_mask(node: &mut DepsNodeHandle<'_, '_>, object: IdHandle, mask: CustomDataMask) {
    node.add_customdata_mask(object, mask);
}

/// Data-block owning the handle's operation.
pub fn get_id_from_handle(node: &DepsNodeHandle<'_, '_>) -> IdHandle {
    node.id()
}

pub fn get_graph_from_handle<'n>(node: &'n DepsNodeHandle<'_, '_>) -> &'n Graph {
    node.graph()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Collection, Object, Scene};

    fn database() -> (Arc<MainDatabase>, IdHandle, IdHandle) {
        let mut main = Main::new();
        let cube = main.add_object("Cube", Object::new(ObjectType::Empty));
        let master = main.add_collection("Master", Collection::with_objects([cube]));
        let scene = main.add_scene("Scene", Scene::new(master));
        (MainDatabase::new(main), scene, cube)
    }

    fn quiet(database: &Arc<MainDatabase>, scene: IdHandle) -> Depsgraph {
        graph_new_with_config(
            database,
            scene,
            "ViewLayer",
            EvaluationMode::Viewport,
            DepsgraphConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn graph_new_checks_scene_and_view_layer() {
        let (database, scene, cube) = database();
        assert!(matches!(
            graph_new(&database, cube, "ViewLayer", EvaluationMode::Viewport),
            Err(DepsgraphError::UnknownScene(_))
        ));
        assert!(matches!(
            graph_new(&database, scene, "Nope", EvaluationMode::Viewport),
            Err(DepsgraphError::UnknownViewLayer(_))
        ));
    }

    #[test]
    fn graphs_unregister_on_drop() {
        let (database, scene, _) = database();
        let graph = quiet(&database, scene);
        assert_eq!(registry::count_for(database.id()), 1);
        graph_free(graph);
        assert_eq!(registry::count_for(database.id()), 0);
    }

    #[test]
    fn relations_update_is_a_noop_when_fresh() {
        let (database, scene, _) = database();
        let graph = quiet(&database, scene);
        assert!(graph_relations_update(&graph).unwrap());
        assert!(!graph_relations_update(&graph).unwrap());
        assert_eq!(graph.lock().build_count(), 1);
    }

    #[test]
    fn tag_relations_update_tags_scene_bases() {
        let (database, scene, _) = database();
        let graph = quiet(&database, scene);
        graph_build_view_layer(&graph).unwrap();
        graph_evaluate(&graph).unwrap();

        graph_tag_relations_update(&graph);

        let locked = graph.lock();
        assert!(locked.need_update_relations());
        let recalc = locked.id_node_for(scene).unwrap().recalc();
        assert!(recalc.contains(RecalcFlags::BASE_FLAGS | RecalcFlags::HIERARCHY));
    }
}
