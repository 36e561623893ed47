//! Objects and the data they carry: parenting, constraints, animation,
//! drivers and poses.

use super::modifier::Modifier;
use super::IdHandle;

/// Type of an object, deciding which data-block its `data` points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Empty,
    Mesh,
    Curve,
    Lattice,
    Camera,
    Armature,
    Light,
}

impl ObjectType {
    /// Whether objects of this type evaluate a geometry component.
    pub fn has_geometry(&self) -> bool {
        matches!(self, ObjectType::Mesh | ObjectType::Curve | ObjectType::Lattice)
    }
}

/// How an object is attached to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentKind {
    Object,
    /// Parented to a bone of an armature parent.
    Bone(String),
    /// Parented to vertices of the parent's evaluated geometry.
    Vertex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parent {
    pub object: IdHandle,
    pub kind: ParentKind,
}

/// Target of a constraint, optionally narrowed to a bone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintTarget {
    pub object: IdHandle,
    pub subtarget: Option<String>,
}

impl ConstraintTarget {
    pub fn object(object: IdHandle) -> Self {
        Self {
            object,
            subtarget: None,
        }
    }

    pub fn bone(object: IdHandle, bone: impl Into<String>) -> Self {
        Self {
            object,
            subtarget: Some(bone.into()),
        }
    }
}

/// Object and bone constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    ChildOf(ConstraintTarget),
    CopyLocation(ConstraintTarget),
    CopyRotation(ConstraintTarget),
    TrackTo(ConstraintTarget),
    /// Deform by a weighted set of bones.
    Armature(Vec<ConstraintTarget>),
    /// Read the transform from a cache file.
    TransformCache { cache_file: IdHandle },
    /// Follow a motion-tracking track; `None` follows the scene camera.
    FollowTrack { camera: Option<IdHandle> },
}

impl Constraint {
    pub fn name(&self) -> &'static str {
        match self {
            Constraint::ChildOf(_) => "Child Of",
            Constraint::CopyLocation(_) => "Copy Location",
            Constraint::CopyRotation(_) => "Copy Rotation",
            Constraint::TrackTo(_) => "Track To",
            Constraint::Armature(_) => "Armature",
            Constraint::TransformCache { .. } => "Transform Cache",
            Constraint::FollowTrack { .. } => "Follow Track",
        }
    }

    /// Object or bone targets of the constraint.
    pub fn targets(&self) -> &[ConstraintTarget] {
        match self {
            Constraint::ChildOf(target)
            | Constraint::CopyLocation(target)
            | Constraint::CopyRotation(target)
            | Constraint::TrackTo(target) => std::slice::from_ref(target),
            Constraint::Armature(targets) => targets,
            Constraint::TransformCache { .. } | Constraint::FollowTrack { .. } => &[],
        }
    }

    /// Visit every data-block the constraint references.
    pub fn foreach_id(&self, f: &mut dyn FnMut(IdHandle)) {
        for target in self.targets() {
            f(target.object);
        }
        match self {
            Constraint::TransformCache { cache_file } => f(*cache_file),
            Constraint::FollowTrack { camera: Some(camera) } => f(*camera),
            _ => {}
        }
    }
}

/// What a driver writes on its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverTarget {
    Parameters,
    Transform,
    Geometry,
    Shading,
    Bone(String),
}

/// What a driver variable reads from its data-block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverRead {
    Parameters,
    Transform,
    Geometry,
    Bone(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverVariable {
    pub id: IdHandle,
    pub reads: DriverRead,
}

/// A driven property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Driver {
    pub rna_path: String,
    pub array_index: i32,
    pub target: DriverTarget,
    pub variables: Vec<DriverVariable>,
    /// The expression reads the current frame.
    pub uses_time: bool,
}

impl Driver {
    pub fn new(rna_path: impl Into<String>, array_index: i32, target: DriverTarget) -> Self {
        Self {
            rna_path: rna_path.into(),
            array_index,
            target,
            variables: Vec::new(),
            uses_time: false,
        }
    }

    pub fn with_variable(mut self, id: IdHandle, reads: DriverRead) -> Self {
        self.variables.push(DriverVariable { id, reads });
        self
    }

    pub fn with_time(mut self) -> Self {
        self.uses_time = true;
        self
    }
}

/// Animation attached to a data-block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimData {
    pub action: Option<IdHandle>,
    pub drivers: Vec<Driver>,
}

/// A posed bone of an armature object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoseChannel {
    pub name: String,
    pub parent: Option<String>,
    pub constraints: Vec<Constraint>,
}

impl PoseChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            constraints: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pose {
    pub channels: Vec<PoseChannel>,
}

impl Pose {
    pub fn channel(&self, name: &str) -> Option<&PoseChannel> {
        self.channels.iter().find(|channel| channel.name == name)
    }
}

/// An object placed in a scene.
#[derive(Debug, Clone)]
pub struct Object {
    pub object_type: ObjectType,
    /// Object data: a mesh, camera, armature, ...
    pub data: Option<IdHandle>,
    pub parent: Option<Parent>,
    pub constraints: Vec<Constraint>,
    pub modifiers: Vec<Modifier>,
    pub anim: Option<AnimData>,
    /// Collection instanced by an empty.
    pub instance_collection: Option<IdHandle>,
    pub materials: Vec<IdHandle>,
    pub pose: Option<Pose>,
    pub hide_viewport: bool,
    pub hide_render: bool,
}

impl Object {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            data: None,
            parent: None,
            constraints: Vec::new(),
            modifiers: Vec::new(),
            anim: None,
            instance_collection: None,
            materials: Vec::new(),
            pose: None,
            hide_viewport: false,
            hide_render: false,
        }
    }

    /// An empty instancing `collection`.
    pub fn instancer(collection: IdHandle) -> Self {
        let mut object = Self::new(ObjectType::Empty);
        object.instance_collection = Some(collection);
        object
    }

    pub fn with_data(mut self, data: IdHandle) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_parent(mut self, object: IdHandle) -> Self {
        self.parent = Some(Parent {
            object,
            kind: ParentKind::Object,
        });
        self
    }

    pub fn with_bone_parent(mut self, object: IdHandle, bone: impl Into<String>) -> Self {
        self.parent = Some(Parent {
            object,
            kind: ParentKind::Bone(bone.into()),
        });
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn with_anim(mut self, anim: AnimData) -> Self {
        self.anim = Some(anim);
        self
    }

    pub fn with_material(mut self, material: IdHandle) -> Self {
        self.materials.push(material);
        self
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn has_geometry(&self) -> bool {
        self.object_type.has_geometry()
    }

    /// Whether any modifier simulates through a point cache.
    pub fn has_point_cache(&self) -> bool {
        self.modifiers.iter().any(Modifier::uses_point_cache)
    }

    pub fn is_visible(&self, render: bool) -> bool {
        if render {
            !self.hide_render
        } else {
            !self.hide_viewport
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_visits_targets_and_cache_files() {
        let constraint = Constraint::Armature(vec![
            ConstraintTarget::bone(IdHandle::from_raw(1), "Root"),
            ConstraintTarget::object(IdHandle::from_raw(2)),
        ]);
        let mut seen = Vec::new();
        constraint.foreach_id(&mut |id| seen.push(id.raw()));
        assert_eq!(seen, vec![1, 2]);

        let cache = Constraint::TransformCache {
            cache_file: IdHandle::from_raw(9),
        };
        let mut seen = Vec::new();
        cache.foreach_id(&mut |id| seen.push(id.raw()));
        assert_eq!(seen, vec![9]);
        assert!(cache.targets().is_empty());
    }

    #[test]
    fn geometry_follows_object_type() {
        assert!(Object::new(ObjectType::Mesh).has_geometry());
        assert!(!Object::new(ObjectType::Empty).has_geometry());
        assert!(!Object::new(ObjectType::Armature).has_geometry());
    }
}
