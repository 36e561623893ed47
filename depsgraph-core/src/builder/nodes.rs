//! Node pass: creates the id, component and operation nodes of every
//! visited data-block.

use crate::error::{DepsgraphError, Result};
use crate::graph::{Graph, IdNodeIndex, NodeType, OperationCode, OperationIndex};
use crate::host::{AnimData, IdHandle, IdKind, Main, Object, ObjectType};

use crate::graph::OperationCode as Op;

use super::BuilderMap;

pub struct NodeBuilder<'a> {
    graph: &'a mut Graph,
    main: &'a Main,
    scene: IdHandle,
    built: BuilderMap,
}

impl<'a> NodeBuilder<'a> {
    pub fn new(graph: &'a mut Graph, main: &'a Main) -> Self {
        let scene = graph.scene();
        Self {
            graph,
            main,
            scene,
            built: BuilderMap::default(),
        }
    }

    pub fn main(&self) -> &'a Main {
        self.main
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    /// Id node of `id`, created together with its copy-on-eval and generic
    /// components.
    fn ensure_id(&mut self, id: IdHandle) -> Result<IdNodeIndex> {
        if let Some(index) = self.graph.find_id_node(id) {
            return Ok(index);
        }
        let block = self.main.get(id).ok_or_else(|| DepsgraphError::unknown_data_block(id))?;
        let kind = block.kind();
        let index = self.graph.ensure_id_node(id, &block.full_name(), kind)?;

        let copy = self.graph.ensure_component(index, NodeType::CopyOnEval, "")?;
        self.graph.ensure_operation(copy, Op::CopyOnEval, "", -1)?;
        let generic = self.graph.ensure_component(index, NodeType::GenericDatablock, "")?;
        self.graph.ensure_operation(generic, Op::GenericDatablockUpdate, "", -1)?;
        Ok(index)
    }

    /// Create (or find) one operation of `id`.
    pub fn add_operation(
        &mut self,
        id: IdHandle,
        kind: NodeType,
        component_name: &str,
        code: OperationCode,
        name: &str,
        name_tag: i32,
    ) -> Result<OperationIndex> {
        let node = self.ensure_id(id)?;
        let component = self.graph.ensure_component(node, kind, component_name)?;
        self.graph.ensure_operation(component, code, name, name_tag)
    }

    fn add_simple(&mut self, id: IdHandle, kind: NodeType, code: OperationCode) -> Result<OperationIndex> {
        self.add_operation(id, kind, "", code, "", -1)
    }

    /// Create a component whose operations run in `codes` order; the first
    /// is its entry and the last its exit.
    fn add_chain(&mut self, id: IdHandle, kind: NodeType, component_name: &str, codes: &[OperationCode]) -> Result<()> {
        let mut first = None;
        let mut last = None;
        for code in codes {
            let op = self.add_operation(id, kind, component_name, *code, "", -1)?;
            first.get_or_insert(op);
            last = Some(op);
        }
        if let Some(op) = first {
            let component = self.graph.operation(op).owner();
            self.graph.set_component_entry_exit(component, first, last);
        }
        Ok(())
    }

    /// Build any data-block, dispatching on its kind. Handles that do not
    /// name a data-block are skipped; the relation pass reports them.
    pub fn build_id(&mut self, id: IdHandle) -> Result<()> {
        let Some(kind) = self.main.kind(id) else {
            tracing::trace!(%id, "skipping reference to a missing data-block");
            return Ok(());
        };
        match kind {
            IdKind::Scene => self.build_scene_parameters(id),
            IdKind::Object => self.build_object(id, false),
            IdKind::Collection => self.build_collection(id),
            IdKind::NodeTree => self.build_node_tree(id),
            IdKind::CacheFile => self.build_cache_file(id),
            IdKind::Camera => self.build_camera(id),
            IdKind::Armature => self.build_armature(id),
            IdKind::Material => self.build_material(id),
            IdKind::Mesh => self.build_mesh(id),
            IdKind::World => self.build_world(id),
            IdKind::Image => self.build_image(id),
            IdKind::Action => self.build_action(id),
        }
    }

    fn build_ids(&mut self, ids: impl IntoIterator<Item = IdHandle>) -> Result<()> {
        for id in ids {
            self.build_id(id)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scene
    // ------------------------------------------------------------------

    /// Parameters of a scene, enough for other data-blocks to read it.
    pub fn build_scene_parameters(&mut self, scene: IdHandle) -> Result<()> {
        if self.main.scene(scene).is_none() {
            return Ok(());
        }
        self.add_chain(
            scene,
            NodeType::Parameters,
            "",
            &[Op::Hierarchy, Op::ViewLayerEval, Op::SceneEval],
        )
    }

    /// The graph's scene with everything the scene itself uses: time
    /// source, world, cameras, sequencer and audio. The compositor tree is
    /// built only when asked for.
    pub fn build_scene(&mut self, with_compositor: bool) -> Result<()> {
        let main = self.main;
        let scene_id = self.scene;
        let scene = main
            .scene(scene_id)
            .ok_or(DepsgraphError::UnknownScene(scene_id))?;

        self.build_scene_parameters(scene_id)?;
        self.add_simple(scene_id, NodeType::Animation, Op::TimeSource)?;
        if !self.built.check_and_mark(scene_id) {
            return Ok(());
        }

        if let Some(anim) = &scene.anim {
            self.build_animdata(scene_id, anim)?;
        }
        if let Some(world) = scene.world {
            self.build_world(world)?;
        }
        if let Some(camera) = scene.camera {
            self.build_object(camera, false)?;
        }
        for camera in scene.marker_cameras() {
            self.build_object(camera, false)?;
        }
        if scene.use_sequencer {
            self.add_simple(scene_id, NodeType::Sequencer, Op::SequencesEval)?;
        }
        if scene.use_audio {
            self.add_simple(scene_id, NodeType::Audio, Op::SoundEval)?;
        }
        if with_compositor {
            if let Some(tree) = scene.compositor_tree {
                self.build_node_tree(tree)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    pub fn build_object(&mut self, id: IdHandle, directly_visible: bool) -> Result<()> {
        let main = self.main;
        let Some(object) = main.object(id) else {
            return Ok(());
        };
        if !self.built.check_and_mark(id) {
            if directly_visible {
                if let Some(node) = self.graph.find_id_node(id) {
                    self.graph.id_node_mut(node).is_directly_visible = true;
                }
            }
            return Ok(());
        }
        let node = self.ensure_id(id)?;
        self.graph.id_node_mut(node).is_directly_visible = directly_visible;

        self.add_chain(
            id,
            NodeType::Parameters,
            "",
            &[Op::ParametersEntry, Op::ParametersEval, Op::ParametersExit],
        )?;
        self.add_simple(id, NodeType::Parameters, Op::ObjectBaseFlags)?;

        let mut transform = vec![Op::TransformInit, Op::TransformLocal, Op::TransformParent];
        if !object.constraints.is_empty() {
            transform.push(Op::TransformConstraints);
        }
        transform.push(Op::TransformFinal);
        self.add_chain(id, NodeType::Transform, "", &transform)?;

        if let Some(parent) = &object.parent {
            self.build_object(parent.object, false)?;
        }
        let mut referenced = Vec::new();
        for constraint in &object.constraints {
            constraint.foreach_id(&mut |target| referenced.push(target));
        }
        self.build_ids(referenced)?;

        if let Some(anim) = &object.anim {
            self.build_animdata(id, anim)?;
        }
        self.build_object_data(object)?;

        if object.has_geometry() {
            self.add_chain(
                id,
                NodeType::Geometry,
                "",
                &[Op::GeometryEvalInit, Op::GeometryEval, Op::GeometryEvalDone],
            )?;
            self.add_simple(id, NodeType::BatchCache, Op::GeometrySelectUpdate)?;
        }
        let mut referenced = Vec::new();
        for modifier in &object.modifiers {
            modifier.foreach_id(&mut |target| referenced.push(target));
        }
        self.build_ids(referenced)?;
        if object.has_point_cache() {
            self.add_simple(id, NodeType::PointCache, Op::PointCacheReset)?;
        }

        if !object.materials.is_empty() {
            self.add_simple(id, NodeType::Shading, Op::Shading)?;
            self.build_ids(object.materials.iter().copied())?;
        }
        if object.object_type == ObjectType::Armature {
            self.build_pose(id, object)?;
        }
        if let Some(collection) = object.instance_collection {
            self.build_collection(collection)?;
        }
        Ok(())
    }

    fn build_object_data(&mut self, object: &Object) -> Result<()> {
        match object.data {
            Some(data) => self.build_id(data),
            None => Ok(()),
        }
    }

    fn build_pose(&mut self, id: IdHandle, object: &'a Object) -> Result<()> {
        self.add_chain(id, NodeType::Pose, "", &[Op::PoseInit, Op::PoseDone])?;
        let Some(pose) = &object.pose else {
            return Ok(());
        };
        for channel in &pose.channels {
            let mut bone = vec![Op::BoneLocal, Op::BonePoseParent];
            if !channel.constraints.is_empty() {
                bone.push(Op::BoneConstraints);
            }
            bone.extend([Op::BoneReady, Op::BoneDone]);
            self.add_chain(id, NodeType::Bone, &channel.name, &bone)?;

            let mut referenced = Vec::new();
            for constraint in &channel.constraints {
                constraint.foreach_id(&mut |target| referenced.push(target));
            }
            self.build_ids(referenced)?;
        }
        Ok(())
    }

    /// Animation and drivers of any data-block.
    fn build_animdata(&mut self, id: IdHandle, anim: &AnimData) -> Result<()> {
        if let Some(action) = anim.action {
            self.add_chain(
                id,
                NodeType::Animation,
                "",
                &[Op::AnimationEntry, Op::AnimationEval, Op::AnimationExit],
            )?;
            self.build_action(action)?;
        }
        for driver in &anim.drivers {
            self.add_operation(
                id,
                NodeType::Parameters,
                "",
                Op::Driver,
                &driver.rna_path,
                driver.array_index,
            )?;
            self.build_ids(driver.variables.iter().map(|variable| variable.id))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Other data-blocks
    // ------------------------------------------------------------------

    /// A collection and, recursively, its objects and child collections.
    pub fn build_collection(&mut self, id: IdHandle) -> Result<()> {
        let main = self.main;
        let Some(collection) = main.collection(id) else {
            return Ok(());
        };
        if !self.built.check_and_mark(id) {
            return Ok(());
        }
        self.add_simple(id, NodeType::Geometry, Op::GeometryEvalDone)?;
        for object in &collection.objects {
            self.build_object(*object, false)?;
        }
        for child in &collection.children {
            self.build_collection(*child)?;
        }
        Ok(())
    }

    pub fn build_node_tree(&mut self, id: IdHandle) -> Result<()> {
        let main = self.main;
        let Some(tree) = main.node_tree(id) else {
            return Ok(());
        };
        if !self.built.check_and_mark(id) {
            return Ok(());
        }
        self.add_simple(id, NodeType::NtreeOutput, Op::NtreeOutput)?;
        self.add_simple(id, NodeType::NtreeGeometryPreprocess, Op::NtreeGeometryPreprocess)?;
        if let Some(anim) = &tree.anim {
            self.build_animdata(id, anim)?;
        }
        let mut referenced = Vec::new();
        tree.foreach_id(&mut |target| referenced.push(target));
        self.build_ids(referenced)
    }

    fn build_cache_file(&mut self, id: IdHandle) -> Result<()> {
        if self.main.cache_file(id).is_none() || !self.built.check_and_mark(id) {
            return Ok(());
        }
        self.add_simple(id, NodeType::Cache, Op::FileCacheUpdate)?;
        Ok(())
    }

    fn build_camera(&mut self, id: IdHandle) -> Result<()> {
        let main = self.main;
        let Some(camera) = main.camera(id) else {
            return Ok(());
        };
        if !self.built.check_and_mark(id) {
            return Ok(());
        }
        self.add_simple(id, NodeType::Parameters, Op::ParametersEval)?;
        if let Some(anim) = &camera.anim {
            self.build_animdata(id, anim)?;
        }
        if let Some(focus) = camera.dof_object {
            self.build_object(focus, false)?;
        }
        Ok(())
    }

    fn build_armature(&mut self, id: IdHandle) -> Result<()> {
        if self.main.armature(id).is_none() || !self.built.check_and_mark(id) {
            return Ok(());
        }
        self.add_simple(id, NodeType::Armature, Op::ArmatureEval)?;
        Ok(())
    }

    fn build_material(&mut self, id: IdHandle) -> Result<()> {
        let main = self.main;
        let Some(material) = main.material(id) else {
            return Ok(());
        };
        if !self.built.check_and_mark(id) {
            return Ok(());
        }
        self.add_simple(id, NodeType::Shading, Op::MaterialUpdate)?;
        if let Some(anim) = &material.anim {
            self.build_animdata(id, anim)?;
        }
        if let Some(tree) = material.node_tree {
            self.build_node_tree(tree)?;
        }
        Ok(())
    }

    fn build_mesh(&mut self, id: IdHandle) -> Result<()> {
        let main = self.main;
        let Some(mesh) = main.mesh(id) else {
            return Ok(());
        };
        if !self.built.check_and_mark(id) {
            return Ok(());
        }
        self.add_simple(id, NodeType::Geometry, Op::GeometryEval)?;
        self.build_ids(mesh.materials.iter().copied())
    }

    fn build_world(&mut self, id: IdHandle) -> Result<()> {
        let main = self.main;
        let Some(world) = main.world(id) else {
            return Ok(());
        };
        if !self.built.check_and_mark(id) {
            return Ok(());
        }
        self.add_simple(id, NodeType::Shading, Op::WorldUpdate)?;
        if let Some(tree) = world.node_tree {
            self.build_node_tree(tree)?;
        }
        Ok(())
    }

    fn build_image(&mut self, id: IdHandle) -> Result<()> {
        if self.main.image(id).is_none() || !self.built.check_and_mark(id) {
            return Ok(());
        }
        self.add_simple(id, NodeType::ImageAnimation, Op::ImageAnimation)?;
        Ok(())
    }

    fn build_action(&mut self, id: IdHandle) -> Result<()> {
        if self.main.action(id).is_none() || !self.built.check_and_mark(id) {
            return Ok(());
        }
        self.add_simple(id, NodeType::Animation, Op::AnimationEval)?;
        Ok(())
    }
}
