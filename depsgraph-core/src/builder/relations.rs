//! Relation Builder
//!
//! Second build pass: declares the relations between the operations the
//! node pass created.
//!
//! # Key resolution
//!
//! Relations are declared between keys. A component key used as the source
//! resolves to the component's exit operation, as the target to its entry
//! operation (see [`Graph::component_entry_operation`]). An id key resolves
//! to the data-block's copy-on-eval operation.
//!
//! A key that misses is handled by the configured [`PlaceholderPolicy`]:
//! placeholder nodes are created for data-blocks the main database knows
//! about. Otherwise the relation is skipped and a [`Diagnostic`] recorded.
//!
//! Arena exhaustion is remembered and surfaces when the pass finishes, so
//! the relation functions used from callbacks do not return errors.

use crate::config::{DebugFlags, PlaceholderPolicy};
use crate::error::{DepsgraphError, Result};
use crate::graph::{
    ComponentKey, Graph, NodeType, OperationFlags, OperationIndex, OperationKey, RelationFlags, RelationIndex,
    RelationKey, SpecialEvalFlags,
};
use crate::graph::OperationCode as Op;
use crate::host::{
    AnimData, Constraint, CustomDataMask, DriverRead, DriverTarget, IdHandle, IdKind, Main, Object, ObjectType,
    ParentKind, UpdateDepsgraphContext,
};
use crate::api;
use crate::graph::ObjectComponent;

use super::{BuilderMap, DepsNodeHandle, Diagnostic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    From,
    To,
}

/// What the relation pass produced besides relations.
#[derive(Debug, Default)]
pub(crate) struct RelationPassOutcome {
    pub diagnostics: Vec<Diagnostic>,
    pub placeholders: usize,
}

pub struct RelationBuilder<'a> {
    graph: &'a mut Graph,
    main: &'a Main,
    scene: IdHandle,
    built: BuilderMap,
    diagnostics: Vec<Diagnostic>,
    placeholders: usize,
    failure: Option<DepsgraphError>,
}

impl<'a> RelationBuilder<'a> {
    pub fn new(graph: &'a mut Graph, main: &'a Main) -> Self {
        let scene = graph.scene();
        Self {
            graph,
            main,
            scene,
            built: BuilderMap::default(),
            diagnostics: Vec::new(),
            placeholders: 0,
            failure: None,
        }
    }

    pub fn main(&self) -> &'a Main {
        self.main
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    pub fn scene(&self) -> IdHandle {
        self.scene
    }

    pub(crate) fn finish(self) -> Result<RelationPassOutcome> {
        if let Some(failure) = self.failure {
            return Err(failure);
        }
        Ok(RelationPassOutcome {
            diagnostics: self.diagnostics,
            placeholders: self.placeholders,
        })
    }

    fn record_failure(&mut self, error: DepsgraphError) {
        if self.failure.is_none() {
            self.failure = Some(error);
        }
    }

    fn time_source_key(&self) -> OperationKey {
        OperationKey::new(self.scene, NodeType::Animation, Op::TimeSource)
    }

    fn has_component(&self, id: IdHandle, kind: NodeType) -> bool {
        self.graph.find_component(&ComponentKey::new(id, kind)).is_some()
    }

    fn has_operation(&self, key: &OperationKey) -> bool {
        self.graph.find_operation(key).is_some()
    }

    // ------------------------------------------------------------------
    // Key resolution
    // ------------------------------------------------------------------

    fn describe_key(&self, key: &RelationKey) -> String {
        let id = self.main.id_name(key.id());
        match key {
            RelationKey::Id(_) => id,
            RelationKey::Component(key) => {
                let mut path = format!("{id}/{}", key.kind);
                if !key.name.is_empty() {
                    path.push_str(&format!("[{}]", key.name));
                }
                path
            }
            RelationKey::Operation(key) => {
                let mut path = format!("{id}/{}", key.component);
                if !key.component_name.is_empty() {
                    path.push_str(&format!("[{}]", key.component_name));
                }
                path.push_str(&format!("/{}", key.code));
                if !key.name.is_empty() {
                    path.push_str(&format!("({})", key.name));
                }
                path
            }
        }
    }

    fn find(&self, key: &RelationKey, endpoint: Endpoint) -> Option<OperationIndex> {
        match key {
            RelationKey::Id(key) => self
                .graph
                .find_operation(&OperationKey::new(key.id, NodeType::CopyOnEval, Op::CopyOnEval)),
            RelationKey::Component(key) => {
                let component = self.graph.find_component(key)?;
                match endpoint {
                    Endpoint::From => self.graph.component_exit_operation(component),
                    Endpoint::To => self.graph.component_entry_operation(component),
                }
            }
            RelationKey::Operation(key) => self.graph.find_operation(key),
        }
    }

    fn resolve(&mut self, key: &RelationKey, endpoint: Endpoint) -> Option<OperationIndex> {
        self.find(key, endpoint).or_else(|| self.placeholder(key))
    }

    /// Create stand-in nodes for `key` when the policy allows it.
    fn placeholder(&mut self, key: &RelationKey) -> Option<OperationIndex> {
        if self.graph.config().placeholder_policy == PlaceholderPolicy::Never {
            return None;
        }
        let id = key.id();
        let block = self.main.get(id)?;
        let (kind, component_name, code, name, name_tag) = match key {
            RelationKey::Id(_) => (NodeType::CopyOnEval, String::new(), Op::CopyOnEval, String::new(), -1),
            RelationKey::Component(key) => (key.kind, key.name.clone(), Op::Operation, String::new(), -1),
            RelationKey::Operation(key) => (
                key.component,
                key.component_name.clone(),
                key.code,
                key.name.clone(),
                key.name_tag,
            ),
        };

        let created = self
            .graph
            .ensure_id_node(id, &block.full_name(), block.kind())
            .and_then(|node| self.graph.ensure_component(node, kind, &component_name))
            .and_then(|component| self.graph.ensure_operation(component, code, &name, name_tag));
        match created {
            Ok(op) => {
                self.graph.operation_mut(op).flags.insert(OperationFlags::PLACEHOLDER);
                self.placeholders += 1;
                if self.graph.config().debug_enabled(DebugFlags::BUILD) {
                    tracing::debug!(key = %self.describe_key(key), "created placeholder");
                }
                Some(op)
            }
            Err(error) => {
                self.record_failure(error);
                None
            }
        }
    }

    pub(crate) fn report(&mut self, from: String, to: String, description: &str, reason: &str) {
        tracing::warn!(%from, %to, description, reason, "skipping relation");
        self.diagnostics.push(Diagnostic {
            from,
            to,
            description: description.to_string(),
            reason: reason.to_string(),
        });
        self.graph.possibly_incomplete = true;
    }

    // ------------------------------------------------------------------
    // Relation API
    // ------------------------------------------------------------------

    /// Declare that `to` is evaluated after `from`. Returns `None` when one
    /// of the keys could not be resolved.
    pub fn add_relation(
        &mut self,
        from: impl Into<RelationKey>,
        to: impl Into<RelationKey>,
        description: &str,
        flags: RelationFlags,
    ) -> Option<RelationIndex> {
        if self.failure.is_some() {
            return None;
        }
        let from = from.into();
        let to = to.into();
        let from_op = self.resolve(&from, Endpoint::From);
        let to_op = self.resolve(&to, Endpoint::To);
        match (from_op, to_op) {
            (Some(from_op), Some(to_op)) => self.add_operation_relation(from_op, to_op, description, flags),
            (from_op, _) => {
                if self.failure.is_none() {
                    let reason = if from_op.is_none() {
                        "source does not resolve"
                    } else {
                        "target does not resolve"
                    };
                    self.report(self.describe_key(&from), self.describe_key(&to), description, reason);
                }
                None
            }
        }
    }

    pub fn add_operation_relation(
        &mut self,
        from: OperationIndex,
        to: OperationIndex,
        description: &str,
        flags: RelationFlags,
    ) -> Option<RelationIndex> {
        match self.graph.add_relation(from, to, description, flags) {
            Ok(relation) => Some(relation),
            Err(error) => {
                self.record_failure(error);
                None
            }
        }
    }

    /// Relation from `key` to an operation handed out in a node handle.
    pub fn add_node_handle_relation(
        &mut self,
        key: RelationKey,
        to: OperationIndex,
        description: &str,
        flags: RelationFlags,
    ) -> Option<RelationIndex> {
        if self.failure.is_some() {
            return None;
        }
        match self.resolve(&key, Endpoint::From) {
            Some(from) => self.add_operation_relation(from, to, description, flags),
            None => {
                if self.failure.is_none() {
                    let to = self.graph.describe_operation(to);
                    self.report(self.describe_key(&key), to, description, "source does not resolve");
                }
                None
            }
        }
    }

    /// Relation from the final transform of `id` to `to`.
    pub fn add_depends_on_transform_relation(
        &mut self,
        id: IdHandle,
        to: OperationIndex,
        description: &str,
    ) -> Option<RelationIndex> {
        let key = OperationKey::new(id, NodeType::Transform, Op::TransformFinal);
        self.add_node_handle_relation(key.into(), to, description, RelationFlags::empty())
    }

    /// OR `mask` into the custom-data mask of `object`.
    pub fn add_customdata_mask(&mut self, object: IdHandle, mask: CustomDataMask) {
        match self.graph.find_id_node(object) {
            Some(node) => self.graph.id_node_mut(node).customdata_mask |= mask,
            None => tracing::trace!(object = %self.main.id_name(object), "custom-data mask for an unbuilt object"),
        }
    }

    /// OR `flag` into the special evaluation flags of `id`.
    pub fn add_special_eval_flag(&mut self, id: IdHandle, flag: SpecialEvalFlags) {
        match self.graph.find_id_node(id) {
            Some(node) => self.graph.id_node_mut(node).special_eval_flags |= flag,
            None => tracing::trace!(id = %self.main.id_name(id), "special evaluation flag for an unbuilt id"),
        }
    }

    /// Connect the existing operations among `codes` of one component in
    /// that order.
    fn add_chain(&mut self, id: IdHandle, kind: NodeType, component_name: &str, codes: &[Op], description: &str) {
        let component = ComponentKey::named(id, kind, component_name);
        let Some(component) = self.graph.find_component(&component) else {
            return;
        };
        let ops: Vec<OperationIndex> = codes
            .iter()
            .filter_map(|code| {
                self.graph
                    .component(component)
                    .operations()
                    .find(|op| self.graph.operation(*op).code() == *code)
            })
            .collect();
        for pair in ops.windows(2) {
            self.add_operation_relation(pair[0], pair[1], description, RelationFlags::empty());
        }
    }

    // ------------------------------------------------------------------
    // Data-block visitors
    // ------------------------------------------------------------------

    /// Relations of any data-block, dispatching on its kind.
    pub fn build_id(&mut self, id: IdHandle) {
        let Some(kind) = self.main.kind(id) else {
            return;
        };
        match kind {
            IdKind::Scene => self.build_scene_parameters(id),
            IdKind::Object => self.build_object(id),
            IdKind::Collection => self.build_collection(id),
            IdKind::NodeTree => self.build_node_tree(id),
            IdKind::CacheFile => self.build_cache_file(id),
            IdKind::Camera => self.build_camera(id),
            IdKind::Armature | IdKind::Action => self.build_generic(id),
            IdKind::Material => self.build_material(id),
            IdKind::Mesh => self.build_mesh(id),
            IdKind::World => self.build_world(id),
            IdKind::Image => self.build_image(id),
        }
    }

    /// Copy-on-eval of a data-block precedes all of its components. Tags
    /// do not travel along these relations, except into the geometry of
    /// meshes and the cache of cache files.
    fn build_copy_on_eval_relations(&mut self, id: IdHandle) {
        let Some(node) = self.graph.find_id_node(id) else {
            return;
        };
        let Some(copy) = self
            .graph
            .find_operation(&OperationKey::new(id, NodeType::CopyOnEval, Op::CopyOnEval))
        else {
            return;
        };
        let id_kind = self.graph.id_node(node).kind();
        let components: Vec<_> = self.graph.id_node(node).components().collect();
        for component in components {
            let kind = self.graph.component(component).kind();
            if kind == NodeType::CopyOnEval {
                continue;
            }
            let Some(entry) = self.graph.component_entry_operation(component) else {
                continue;
            };
            let flushes = matches!(
                (id_kind, kind),
                (IdKind::Mesh, NodeType::Geometry) | (IdKind::CacheFile, NodeType::Cache)
            );
            let flags = if flushes {
                RelationFlags::empty()
            } else {
                RelationFlags::NO_FLUSH
            };
            self.add_operation_relation(copy, entry, "Copy-on-Eval Relation", flags);
        }
    }

    fn build_generic(&mut self, id: IdHandle) {
        if self.built.check_and_mark(id) {
            self.build_copy_on_eval_relations(id);
        }
    }

    pub fn build_scene_parameters(&mut self, scene: IdHandle) {
        self.add_chain(
            scene,
            NodeType::Parameters,
            "",
            &[Op::Hierarchy, Op::ViewLayerEval, Op::SceneEval],
            "Scene Parameters",
        );
    }

    /// Relations of the graph's scene. Mirrors [`NodeBuilder::build_scene`].
    ///
    /// [`NodeBuilder::build_scene`]: super::NodeBuilder::build_scene
    pub fn build_scene(&mut self, with_compositor: bool) {
        let main = self.main;
        let scene_id = self.scene;
        let Some(scene) = main.scene(scene_id) else {
            return;
        };
        if !self.built.check_and_mark(scene_id) {
            return;
        }
        self.build_scene_parameters(scene_id);
        self.build_copy_on_eval_relations(scene_id);

        if let Some(anim) = &scene.anim {
            self.build_animdata(scene_id, anim);
        }
        if let Some(world) = scene.world {
            self.build_world(world);
        }
        if let Some(camera) = scene.camera {
            self.build_object(camera);
        }
        for camera in scene.marker_cameras() {
            self.build_object(camera);
        }
        if scene.use_sequencer {
            self.add_relation(
                self.time_source_key(),
                OperationKey::new(scene_id, NodeType::Sequencer, Op::SequencesEval),
                "TimeSrc -> Sequencer",
                RelationFlags::empty(),
            );
        }
        if scene.use_audio {
            self.add_relation(
                self.time_source_key(),
                OperationKey::new(scene_id, NodeType::Audio, Op::SoundEval),
                "TimeSrc -> Audio",
                RelationFlags::empty(),
            );
            if scene.use_sequencer {
                self.add_relation(
                    ComponentKey::new(scene_id, NodeType::Sequencer),
                    ComponentKey::new(scene_id, NodeType::Audio),
                    "Sequencer -> Audio",
                    RelationFlags::empty(),
                );
            }
        }
        if with_compositor {
            if let Some(tree) = scene.compositor_tree {
                self.build_node_tree(tree);
            }
        }
    }

    /// Base flags of every object in the view layer follow the view layer
    /// evaluation.
    pub fn build_view_layer_bases(&mut self, objects: &[IdHandle]) {
        let view_layer = OperationKey::new(self.scene, NodeType::Parameters, Op::ViewLayerEval);
        for object in objects {
            self.add_relation(
                view_layer.clone(),
                OperationKey::new(*object, NodeType::Parameters, Op::ObjectBaseFlags),
                "Base Flags",
                RelationFlags::empty(),
            );
        }
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    pub fn build_object(&mut self, id: IdHandle) {
        let main = self.main;
        let Some(object) = main.object(id) else {
            return;
        };
        if !self.built.check_and_mark(id) {
            return;
        }
        self.build_copy_on_eval_relations(id);
        self.add_chain(
            id,
            NodeType::Parameters,
            "",
            &[Op::ParametersEntry, Op::ParametersEval, Op::ParametersExit],
            "Parameters Chain",
        );
        self.add_chain(
            id,
            NodeType::Transform,
            "",
            &[
                Op::TransformInit,
                Op::TransformLocal,
                Op::TransformParent,
                Op::TransformConstraints,
                Op::TransformFinal,
            ],
            "Transform Chain",
        );

        if object.parent.is_some() {
            self.build_object_parent(id, object);
        }
        if !object.constraints.is_empty() {
            let constraints = OperationKey::new(id, NodeType::Transform, Op::TransformConstraints);
            self.build_constraints(id, &object.constraints, constraints);
        }
        if let Some(anim) = &object.anim {
            self.build_animdata(id, anim);
        }
        self.build_object_data(id, object);
        if object.has_geometry() {
            self.build_object_geometry(id, object);
        }
        if object.has_point_cache() {
            self.build_object_pointcache(id);
        }
        for material in &object.materials {
            self.build_id(*material);
            self.add_relation(
                ComponentKey::new(*material, NodeType::Shading),
                OperationKey::new(id, NodeType::Shading, Op::Shading),
                "Material -> Object Shading",
                RelationFlags::empty(),
            );
        }
        if object.object_type == ObjectType::Armature {
            self.build_pose(id, object);
        }
        if let Some(collection) = object.instance_collection {
            self.build_collection(collection);
        }
    }

    fn build_object_parent(&mut self, id: IdHandle, object: &Object) {
        let Some(parent) = &object.parent else {
            return;
        };
        self.build_object(parent.object);
        let parent_transform = OperationKey::new(parent.object, NodeType::Transform, Op::TransformFinal);
        let child_parent = OperationKey::new(id, NodeType::Transform, Op::TransformParent);
        match &parent.kind {
            ParentKind::Object => {
                self.add_relation(parent_transform, child_parent, "Parent Relation", RelationFlags::empty());
            }
            ParentKind::Bone(bone) => {
                self.add_relation(
                    OperationKey::bone(parent.object, bone.clone(), Op::BoneDone),
                    child_parent.clone(),
                    "Bone Parent",
                    RelationFlags::empty(),
                );
                self.add_relation(parent_transform, child_parent, "Armature Parent", RelationFlags::empty());
            }
            ParentKind::Vertex => {
                self.add_relation(
                    ComponentKey::new(parent.object, NodeType::Geometry),
                    child_parent.clone(),
                    "Vertex Parent",
                    RelationFlags::empty(),
                );
                self.add_customdata_mask(parent.object, CustomDataMask::ORIGINDEX);
                self.add_relation(parent_transform, child_parent, "Vertex Parent TFM", RelationFlags::empty());
            }
        }
    }

    /// Relations of object or bone constraints evaluated in `to`.
    fn build_constraints(&mut self, id: IdHandle, constraints: &[Constraint], to: OperationKey) {
        for constraint in constraints {
            match constraint {
                Constraint::TransformCache { cache_file } => {
                    self.build_id(*cache_file);
                    self.add_relation(
                        ComponentKey::new(*cache_file, NodeType::Cache),
                        to.clone(),
                        "Cache File -> Constraint",
                        RelationFlags::empty(),
                    );
                }
                Constraint::FollowTrack { camera } => {
                    let Some(op) = self.graph.find_operation(&to) else {
                        continue;
                    };
                    let scene = self.scene;
                    let mut handle = DepsNodeHandle::new(self, op, constraint.name());
                    match camera {
                        Some(camera) => api::add_object_relation(
                            &mut handle,
                            *camera,
                            ObjectComponent::Transform,
                            "Follow Track Camera",
                        ),
                        None => api::add_scene_camera_relation(
                            &mut handle,
                            scene,
                            ObjectComponent::Transform,
                            "Follow Track Scene Camera",
                        ),
                    }
                }
                _ => {
                    for target in constraint.targets() {
                        let key = match &target.subtarget {
                            Some(bone) => OperationKey::bone(target.object, bone.clone(), Op::BoneDone),
                            None if target.object == id => continue,
                            None => OperationKey::new(target.object, NodeType::Transform, Op::TransformFinal),
                        };
                        self.build_object(target.object);
                        self.add_relation(key, to.clone(), constraint.name(), RelationFlags::empty());
                    }
                }
            }
        }
    }

    fn build_object_data(&mut self, id: IdHandle, object: &Object) {
        let Some(data) = object.data else {
            return;
        };
        self.build_id(data);
        match self.main.kind(data) {
            Some(IdKind::Mesh) if object.has_geometry() => {
                self.add_relation(
                    ComponentKey::new(data, NodeType::Geometry),
                    OperationKey::new(id, NodeType::Geometry, Op::GeometryEvalInit),
                    "Object Geometry Base Data",
                    RelationFlags::empty(),
                );
            }
            Some(IdKind::Camera) => {
                self.add_relation(
                    ComponentKey::new(data, NodeType::Parameters),
                    OperationKey::new(id, NodeType::Parameters, Op::ParametersEval),
                    "Camera Parameters",
                    RelationFlags::empty(),
                );
            }
            Some(IdKind::Armature) => {
                self.add_relation(
                    ComponentKey::new(data, NodeType::Armature),
                    OperationKey::new(id, NodeType::Pose, Op::PoseInit),
                    "Armature -> Pose",
                    RelationFlags::empty(),
                );
            }
            _ => {}
        }
    }

    fn build_object_geometry(&mut self, id: IdHandle, object: &Object) {
        self.add_chain(
            id,
            NodeType::Geometry,
            "",
            &[Op::GeometryEvalInit, Op::GeometryEval, Op::GeometryEvalDone],
            "Geometry Chain",
        );
        self.add_relation(
            OperationKey::new(id, NodeType::Geometry, Op::GeometryEvalDone),
            OperationKey::new(id, NodeType::BatchCache, Op::GeometrySelectUpdate),
            "Object Geometry Batch Update",
            RelationFlags::empty(),
        );

        let Some(geometry) = self
            .graph
            .find_operation(&OperationKey::new(id, NodeType::Geometry, Op::GeometryEval))
        else {
            return;
        };
        let ctx = UpdateDepsgraphContext {
            scene: self.scene,
            object: id,
        };
        for modifier in &object.modifiers {
            let mut referenced = Vec::new();
            modifier.foreach_id(&mut |target| referenced.push(target));
            for target in referenced {
                self.build_id(target);
            }
            let mut handle = DepsNodeHandle::new(self, geometry, modifier.name());
            modifier.update_depsgraph(&ctx, &mut handle);
        }
    }

    /// Resetting the cache re-evaluates the geometry. Only user edits of the
    /// transform reset the cache.
    fn build_object_pointcache(&mut self, id: IdHandle) {
        let point_cache = OperationKey::new(id, NodeType::PointCache, Op::PointCacheReset);
        self.add_relation(
            point_cache.clone(),
            ComponentKey::new(id, NodeType::Geometry),
            "Point Cache -> Geometry",
            RelationFlags::empty(),
        );
        self.add_relation(
            OperationKey::new(id, NodeType::Transform, Op::TransformFinal),
            point_cache,
            "Transform -> Point Cache",
            RelationFlags::FLUSH_USER_EDIT_ONLY,
        );
    }

    fn build_pose(&mut self, id: IdHandle, object: &Object) {
        self.add_chain(id, NodeType::Pose, "", &[Op::PoseInit, Op::PoseDone], "Pose Chain");
        self.add_relation(
            OperationKey::new(id, NodeType::Transform, Op::TransformFinal),
            OperationKey::new(id, NodeType::Pose, Op::PoseInit),
            "Object Transform -> Pose Init",
            RelationFlags::empty(),
        );
        let Some(pose) = &object.pose else {
            return;
        };
        for channel in &pose.channels {
            let bone = channel.name.as_str();
            self.add_chain(
                id,
                NodeType::Bone,
                bone,
                &[
                    Op::BoneLocal,
                    Op::BonePoseParent,
                    Op::BoneConstraints,
                    Op::BoneReady,
                    Op::BoneDone,
                ],
                "Bone Chain",
            );
            self.add_relation(
                OperationKey::new(id, NodeType::Pose, Op::PoseInit),
                OperationKey::bone(id, bone, Op::BoneLocal),
                "Pose Init -> Bone Local",
                RelationFlags::empty(),
            );
            if let Some(parent) = &channel.parent {
                self.add_relation(
                    OperationKey::bone(id, parent.clone(), Op::BoneReady),
                    OperationKey::bone(id, bone, Op::BonePoseParent),
                    "Parent Bone -> Child Bone",
                    RelationFlags::empty(),
                );
            }
            if !channel.constraints.is_empty() {
                let to = OperationKey::bone(id, bone, Op::BoneConstraints);
                self.build_constraints(id, &channel.constraints, to);
            }
            self.add_relation(
                OperationKey::bone(id, bone, Op::BoneDone),
                OperationKey::new(id, NodeType::Pose, Op::PoseDone),
                "Bone Done -> Pose Done",
                RelationFlags::empty(),
            );
        }
    }

    // ------------------------------------------------------------------
    // Animation
    // ------------------------------------------------------------------

    fn build_animdata(&mut self, id: IdHandle, anim: &AnimData) {
        if let Some(action) = anim.action {
            self.build_id(action);
            self.add_chain(
                id,
                NodeType::Animation,
                "",
                &[Op::AnimationEntry, Op::AnimationEval, Op::AnimationExit],
                "Animation Chain",
            );
            self.add_relation(
                self.time_source_key(),
                ComponentKey::new(id, NodeType::Animation),
                "TimeSrc -> Animation",
                RelationFlags::empty(),
            );
            self.add_relation(
                ComponentKey::new(action, NodeType::Animation),
                OperationKey::new(id, NodeType::Animation, Op::AnimationEval),
                "Action -> Animation",
                RelationFlags::empty(),
            );
            for (kind, description) in [
                (NodeType::Transform, "Animation -> Transform"),
                (NodeType::Parameters, "Animation -> Parameters"),
                (NodeType::Shading, "Animation -> Shading"),
                (NodeType::NtreeOutput, "Animation -> Node Tree"),
            ] {
                if kind == NodeType::Parameters
                    && !self.has_operation(&OperationKey::new(id, kind, Op::ParametersEval))
                {
                    continue;
                }
                if self.has_component(id, kind) {
                    self.add_relation(
                        ComponentKey::new(id, NodeType::Animation),
                        ComponentKey::new(id, kind),
                        description,
                        RelationFlags::empty(),
                    );
                }
            }
        }

        for driver in &anim.drivers {
            let driver_key = OperationKey::named(
                id,
                NodeType::Parameters,
                Op::Driver,
                driver.rna_path.clone(),
                driver.array_index,
            );
            if anim.action.is_some() {
                self.add_relation(
                    ComponentKey::new(id, NodeType::Animation),
                    driver_key.clone(),
                    "Animation -> Driver",
                    RelationFlags::empty(),
                );
            }
            if driver.uses_time {
                self.add_relation(
                    self.time_source_key(),
                    driver_key.clone(),
                    "TimeSrc -> Driver",
                    RelationFlags::empty(),
                );
            }
            for variable in &driver.variables {
                if variable.id == id && variable.reads == DriverRead::Parameters {
                    continue;
                }
                self.build_id(variable.id);
                let source: RelationKey = match &variable.reads {
                    DriverRead::Parameters => ComponentKey::new(variable.id, NodeType::Parameters).into(),
                    DriverRead::Transform => {
                        OperationKey::new(variable.id, NodeType::Transform, Op::TransformFinal).into()
                    }
                    DriverRead::Geometry => ComponentKey::new(variable.id, NodeType::Geometry).into(),
                    DriverRead::Bone(bone) => OperationKey::bone(variable.id, bone.clone(), Op::BoneDone).into(),
                };
                self.add_relation(source, driver_key.clone(), "Driver Variable", RelationFlags::empty());
            }

            let driven: Option<RelationKey> = match &driver.target {
                DriverTarget::Parameters => {
                    let key = OperationKey::new(id, NodeType::Parameters, Op::ParametersEval);
                    self.has_operation(&key).then(|| key.into())
                }
                DriverTarget::Transform => Some(OperationKey::new(id, NodeType::Transform, Op::TransformLocal).into()),
                DriverTarget::Geometry => {
                    Some(OperationKey::new(id, NodeType::Geometry, Op::GeometryEvalInit).into())
                }
                DriverTarget::Shading => Some(ComponentKey::new(id, NodeType::Shading).into()),
                DriverTarget::Bone(bone) => Some(OperationKey::bone(id, bone.clone(), Op::BoneLocal).into()),
            };
            if let Some(driven) = driven {
                self.add_relation(driver_key, driven, "Driver -> Driven Property", RelationFlags::empty());
            }
        }
    }

    // ------------------------------------------------------------------
    // Other data-blocks
    // ------------------------------------------------------------------

    /// Collection geometry is done once the transform and geometry of all
    /// its objects, child collections and instanced collections are.
    pub fn build_collection(&mut self, id: IdHandle) {
        let main = self.main;
        let Some(collection) = main.collection(id) else {
            return;
        };
        if !self.built.check_and_mark(id) {
            return;
        }
        self.build_copy_on_eval_relations(id);
        let done = OperationKey::new(id, NodeType::Geometry, Op::GeometryEvalDone);

        for object_id in &collection.objects {
            self.build_object(*object_id);
            let Some(object) = main.object(*object_id) else {
                continue;
            };
            self.add_relation(
                OperationKey::new(*object_id, NodeType::Transform, Op::TransformFinal),
                done.clone(),
                "Collection Transform",
                RelationFlags::empty(),
            );
            if object.has_geometry() {
                self.add_relation(
                    ComponentKey::new(*object_id, NodeType::Geometry),
                    done.clone(),
                    "Collection Geometry",
                    RelationFlags::empty(),
                );
            }
            if let Some(instanced) = object.instance_collection {
                if instanced != id {
                    self.add_relation(
                        OperationKey::new(instanced, NodeType::Geometry, Op::GeometryEvalDone),
                        done.clone(),
                        "Collection Instance",
                        RelationFlags::empty(),
                    );
                }
            }
        }
        for child in &collection.children {
            self.build_collection(*child);
            self.add_relation(
                OperationKey::new(*child, NodeType::Geometry, Op::GeometryEvalDone),
                done.clone(),
                "Collection Hierarchy",
                RelationFlags::empty(),
            );
        }
    }

    pub fn build_node_tree(&mut self, id: IdHandle) {
        let main = self.main;
        let Some(tree) = main.node_tree(id) else {
            return;
        };
        if !self.built.check_and_mark(id) {
            return;
        }
        self.build_copy_on_eval_relations(id);
        if let Some(anim) = &tree.anim {
            self.build_animdata(id, anim);
        }
        let output = OperationKey::new(id, NodeType::NtreeOutput, Op::NtreeOutput);

        for object in &tree.objects {
            self.build_object(*object);
            self.add_relation(
                OperationKey::new(*object, NodeType::Transform, Op::TransformFinal),
                output.clone(),
                "Object -> Node",
                RelationFlags::empty(),
            );
            if api::object_has_geometry_component(main, *object) {
                self.add_relation(
                    ComponentKey::new(*object, NodeType::Geometry),
                    output.clone(),
                    "Object Geometry -> Node",
                    RelationFlags::empty(),
                );
            }
        }
        for collection in &tree.collections {
            self.build_collection(*collection);
            self.add_relation(
                OperationKey::new(*collection, NodeType::Geometry, Op::GeometryEvalDone),
                output.clone(),
                "Collection -> Node",
                RelationFlags::empty(),
            );
        }
        for image in &tree.images {
            self.build_image(*image);
            self.add_relation(
                ComponentKey::new(*image, NodeType::ImageAnimation),
                output.clone(),
                "Image -> Node",
                RelationFlags::empty(),
            );
        }
        for group in &tree.groups {
            if *group == id {
                continue;
            }
            self.build_node_tree(*group);
            self.add_relation(
                OperationKey::new(*group, NodeType::NtreeOutput, Op::NtreeOutput),
                output.clone(),
                "Node Group",
                RelationFlags::empty(),
            );
            self.add_relation(
                OperationKey::new(*group, NodeType::NtreeGeometryPreprocess, Op::NtreeGeometryPreprocess),
                OperationKey::new(id, NodeType::NtreeGeometryPreprocess, Op::NtreeGeometryPreprocess),
                "Node Group Preprocess",
                RelationFlags::empty(),
            );
        }
        for scene in &tree.render_layer_scenes {
            self.add_relation(
                ComponentKey::new(*scene, NodeType::Parameters),
                output.clone(),
                "Render Layer",
                RelationFlags::empty(),
            );
        }
    }

    fn build_cache_file(&mut self, id: IdHandle) {
        if self.main.cache_file(id).is_none() || !self.built.check_and_mark(id) {
            return;
        }
        self.build_copy_on_eval_relations(id);
        self.add_relation(
            self.time_source_key(),
            OperationKey::new(id, NodeType::Cache, Op::FileCacheUpdate),
            "TimeSrc -> Cache File Eval",
            RelationFlags::empty(),
        );
    }

    fn build_camera(&mut self, id: IdHandle) {
        let main = self.main;
        let Some(camera) = main.camera(id) else {
            return;
        };
        if !self.built.check_and_mark(id) {
            return;
        }
        self.build_copy_on_eval_relations(id);
        if let Some(anim) = &camera.anim {
            self.build_animdata(id, anim);
        }
        if let Some(focus) = camera.dof_object {
            self.build_object(focus);
            self.add_relation(
                OperationKey::new(focus, NodeType::Transform, Op::TransformFinal),
                OperationKey::new(id, NodeType::Parameters, Op::ParametersEval),
                "Camera DOF",
                RelationFlags::empty(),
            );
        }
    }

    fn build_material(&mut self, id: IdHandle) {
        let main = self.main;
        let Some(material) = main.material(id) else {
            return;
        };
        if !self.built.check_and_mark(id) {
            return;
        }
        self.build_copy_on_eval_relations(id);
        if let Some(anim) = &material.anim {
            self.build_animdata(id, anim);
        }
        if let Some(tree) = material.node_tree {
            self.build_node_tree(tree);
            self.add_relation(
                OperationKey::new(tree, NodeType::NtreeOutput, Op::NtreeOutput),
                OperationKey::new(id, NodeType::Shading, Op::MaterialUpdate),
                "Material's NTree",
                RelationFlags::empty(),
            );
        }
    }

    fn build_mesh(&mut self, id: IdHandle) {
        let main = self.main;
        let Some(mesh) = main.mesh(id) else {
            return;
        };
        if !self.built.check_and_mark(id) {
            return;
        }
        self.build_copy_on_eval_relations(id);
        for material in &mesh.materials {
            self.build_material(*material);
        }
    }

    fn build_world(&mut self, id: IdHandle) {
        let main = self.main;
        let Some(world) = main.world(id) else {
            return;
        };
        if !self.built.check_and_mark(id) {
            return;
        }
        self.build_copy_on_eval_relations(id);
        if let Some(tree) = world.node_tree {
            self.build_node_tree(tree);
            self.add_relation(
                OperationKey::new(tree, NodeType::NtreeOutput, Op::NtreeOutput),
                OperationKey::new(id, NodeType::Shading, Op::WorldUpdate),
                "World's NTree",
                RelationFlags::empty(),
            );
        }
    }

    fn build_image(&mut self, id: IdHandle) {
        let main = self.main;
        let Some(image) = main.image(id) else {
            return;
        };
        if !self.built.check_and_mark(id) {
            return;
        }
        self.build_copy_on_eval_relations(id);
        if image.animated {
            self.add_relation(
                self.time_source_key(),
                OperationKey::new(id, NodeType::ImageAnimation, Op::ImageAnimation),
                "TimeSrc -> Image Animation",
                RelationFlags::empty(),
            );
        }
    }
}
