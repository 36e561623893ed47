//! Node Types and Operation Codes
//!
//! Component kinds form a closed set. Operation codes carry topological
//! meaning: within one component an `Init` phase operation precedes the
//! `Eval` phase, which precedes the `Done` phase.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tag::RecalcFlags;

/// Kind of a component node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Parameters,
    Animation,
    Transform,
    Geometry,
    Proxy,
    Armature,
    Pose,
    Bone,
    Shading,
    Cache,
    PointCache,
    ImageAnimation,
    BatchCache,
    CopyOnEval,
    Audio,
    Sequencer,
    GenericDatablock,
    NtreeOutput,
    NtreeGeometryPreprocess,
    Undefined,
}

impl NodeType {
    pub fn name(&self) -> &'static str {
        match self {
            NodeType::Parameters => "PARAMETERS",
            NodeType::Animation => "ANIMATION",
            NodeType::Transform => "TRANSFORM",
            NodeType::Geometry => "GEOMETRY",
            NodeType::Proxy => "PROXY",
            NodeType::Armature => "ARMATURE",
            NodeType::Pose => "POSE",
            NodeType::Bone => "BONE",
            NodeType::Shading => "SHADING",
            NodeType::Cache => "CACHE",
            NodeType::PointCache => "POINT_CACHE",
            NodeType::ImageAnimation => "IMAGE_ANIMATION",
            NodeType::BatchCache => "BATCH_CACHE",
            NodeType::CopyOnEval => "COPY_ON_EVAL",
            NodeType::Audio => "AUDIO",
            NodeType::Sequencer => "SEQUENCER",
            NodeType::GenericDatablock => "GENERIC_DATABLOCK",
            NodeType::NtreeOutput => "NTREE_OUTPUT",
            NodeType::NtreeGeometryPreprocess => "NTREE_GEOMETRY_PREPROCESS",
            NodeType::Undefined => "UNDEFINED",
        }
    }

    /// Recalc bit an ID accumulates when an operation of this component is
    /// flushed.
    pub fn recalc_flag(&self) -> RecalcFlags {
        match self {
            NodeType::Transform => RecalcFlags::TRANSFORM,
            NodeType::Geometry | NodeType::Pose | NodeType::Bone | NodeType::Armature => RecalcFlags::GEOMETRY,
            NodeType::Animation => RecalcFlags::ANIMATION,
            NodeType::CopyOnEval => RecalcFlags::COPY_ON_EVAL,
            NodeType::Shading | NodeType::ImageAnimation => RecalcFlags::SHADING,
            NodeType::PointCache => RecalcFlags::POINT_CACHE,
            NodeType::Sequencer => RecalcFlags::SEQUENCER,
            NodeType::Audio => RecalcFlags::AUDIO,
            NodeType::Parameters
            | NodeType::Cache
            | NodeType::GenericDatablock
            | NodeType::NtreeOutput
            | NodeType::NtreeGeometryPreprocess
            | NodeType::BatchCache => RecalcFlags::PARAMETERS,
            NodeType::Proxy | NodeType::Undefined => RecalcFlags::empty(),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse component selector used by callback code addressing objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectComponent {
    Parameters,
    Animation,
    Transform,
    Geometry,
    EvalPose,
    Bone,
    Shading,
    Cache,
}

impl From<ObjectComponent> for NodeType {
    fn from(component: ObjectComponent) -> Self {
        match component {
            ObjectComponent::Parameters => NodeType::Parameters,
            ObjectComponent::Animation => NodeType::Animation,
            ObjectComponent::Transform => NodeType::Transform,
            ObjectComponent::Geometry => NodeType::Geometry,
            ObjectComponent::EvalPose => NodeType::Pose,
            ObjectComponent::Bone => NodeType::Bone,
            ObjectComponent::Shading => NodeType::Shading,
            ObjectComponent::Cache => NodeType::Cache,
        }
    }
}

/// Coarse component selector used by callback code addressing scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneComponent {
    Parameters,
    Animation,
    Sequencer,
}

impl From<SceneComponent> for NodeType {
    fn from(component: SceneComponent) -> Self {
        match component {
            SceneComponent::Parameters => NodeType::Parameters,
            SceneComponent::Animation => NodeType::Animation,
            SceneComponent::Sequencer => NodeType::Sequencer,
        }
    }
}

/// Position of an operation within its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OperationPhase {
    Init,
    Eval,
    Done,
}

/// Unit of evaluation work.
///
/// Declaration order is significant: [`OperationCode::index`] is used to
/// pick the weakest relation of a dependency cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationCode {
    /// Generic operation, also used for placeholders.
    Operation,

    ParametersEntry,
    ParametersEval,
    ObjectBaseFlags,
    ParametersExit,

    TimeSource,
    AnimationEntry,
    AnimationEval,
    AnimationExit,
    Driver,

    Hierarchy,
    ViewLayerEval,
    SceneEval,

    CopyOnEval,

    TransformInit,
    TransformLocal,
    TransformParent,
    TransformConstraints,
    TransformFinal,

    GeometryEvalInit,
    GeometryEval,
    GeometryEvalDone,
    GeometrySelectUpdate,

    PointCacheReset,
    FileCacheUpdate,

    ArmatureEval,
    PoseInit,
    BoneLocal,
    BonePoseParent,
    BoneConstraints,
    BoneReady,
    BoneDone,
    PoseDone,

    Shading,
    MaterialUpdate,
    WorldUpdate,
    ImageAnimation,

    SoundEval,
    SequencesEval,

    GenericDatablockUpdate,
    NtreeOutput,
    NtreeGeometryPreprocess,
}

impl OperationCode {
    /// Ordinal of the code, larger means later in a component.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn phase(&self) -> OperationPhase {
        match self {
            OperationCode::ParametersEntry
            | OperationCode::AnimationEntry
            | OperationCode::Hierarchy
            | OperationCode::TransformInit
            | OperationCode::GeometryEvalInit
            | OperationCode::PoseInit
            | OperationCode::BoneLocal => OperationPhase::Init,
            OperationCode::ParametersExit
            | OperationCode::AnimationExit
            | OperationCode::SceneEval
            | OperationCode::TransformFinal
            | OperationCode::GeometryEvalDone
            | OperationCode::PoseDone
            | OperationCode::BoneDone => OperationPhase::Done,
            _ => OperationPhase::Eval,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationCode::Operation => "OPERATION",
            OperationCode::ParametersEntry => "PARAMETERS_ENTRY",
            OperationCode::ParametersEval => "PARAMETERS_EVAL",
            OperationCode::ObjectBaseFlags => "OBJECT_BASE_FLAGS",
            OperationCode::ParametersExit => "PARAMETERS_EXIT",
            OperationCode::TimeSource => "TIME_SOURCE",
            OperationCode::AnimationEntry => "ANIMATION_ENTRY",
            OperationCode::AnimationEval => "ANIMATION_EVAL",
            OperationCode::AnimationExit => "ANIMATION_EXIT",
            OperationCode::Driver => "DRIVER",
            OperationCode::Hierarchy => "HIERARCHY",
            OperationCode::ViewLayerEval => "VIEW_LAYER_EVAL",
            OperationCode::SceneEval => "SCENE_EVAL",
            OperationCode::CopyOnEval => "COPY_ON_EVAL",
            OperationCode::TransformInit => "TRANSFORM_INIT",
            OperationCode::TransformLocal => "TRANSFORM_LOCAL",
            OperationCode::TransformParent => "TRANSFORM_PARENT",
            OperationCode::TransformConstraints => "TRANSFORM_CONSTRAINTS",
            OperationCode::TransformFinal => "TRANSFORM_FINAL",
            OperationCode::GeometryEvalInit => "GEOMETRY_EVAL_INIT",
            OperationCode::GeometryEval => "GEOMETRY_EVAL",
            OperationCode::GeometryEvalDone => "GEOMETRY_EVAL_DONE",
            OperationCode::GeometrySelectUpdate => "GEOMETRY_SELECT_UPDATE",
            OperationCode::PointCacheReset => "POINT_CACHE_RESET",
            OperationCode::FileCacheUpdate => "FILE_CACHE_UPDATE",
            OperationCode::ArmatureEval => "ARMATURE_EVAL",
            OperationCode::PoseInit => "POSE_INIT",
            OperationCode::BoneLocal => "BONE_LOCAL",
            OperationCode::BonePoseParent => "BONE_POSE_PARENT",
            OperationCode::BoneConstraints => "BONE_CONSTRAINTS",
            OperationCode::BoneReady => "BONE_READY",
            OperationCode::BoneDone => "BONE_DONE",
            OperationCode::PoseDone => "POSE_DONE",
            OperationCode::Shading => "SHADING",
            OperationCode::MaterialUpdate => "MATERIAL_UPDATE",
            OperationCode::WorldUpdate => "WORLD_UPDATE",
            OperationCode::ImageAnimation => "IMAGE_ANIMATION",
            OperationCode::SoundEval => "SOUND_EVAL",
            OperationCode::SequencesEval => "SEQUENCES_EVAL",
            OperationCode::GenericDatablockUpdate => "GENERIC_DATABLOCK_UPDATE",
            OperationCode::NtreeOutput => "NTREE_OUTPUT",
            OperationCode::NtreeGeometryPreprocess => "NTREE_GEOMETRY_PREPROCESS",
        }
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
