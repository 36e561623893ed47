//! Object data and shading data-blocks.

use super::customdata::CustomDataMask;
use super::object::AnimData;
use super::IdHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTreeType {
    Shader,
    Geometry,
    Compositor,
}

/// A node tree and the data-blocks its nodes reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTree {
    pub tree_type: NodeTreeType,
    /// Objects read by object-info style nodes.
    pub objects: Vec<IdHandle>,
    /// Collections read by collection-info style nodes.
    pub collections: Vec<IdHandle>,
    pub images: Vec<IdHandle>,
    /// Nested node groups.
    pub groups: Vec<IdHandle>,
    /// Scenes read by render-layer nodes of a compositor tree.
    pub render_layer_scenes: Vec<IdHandle>,
    /// Attributes the tree reads from its input geometry.
    pub required_customdata: CustomDataMask,
    pub anim: Option<AnimData>,
}

impl NodeTree {
    pub fn new(tree_type: NodeTreeType) -> Self {
        Self {
            tree_type,
            objects: Vec::new(),
            collections: Vec::new(),
            images: Vec::new(),
            groups: Vec::new(),
            render_layer_scenes: Vec::new(),
            required_customdata: CustomDataMask::empty(),
            anim: None,
        }
    }

    pub fn foreach_id(&self, f: &mut dyn FnMut(IdHandle)) {
        self.objects
            .iter()
            .chain(&self.collections)
            .chain(&self.images)
            .chain(&self.groups)
            .chain(&self.render_layer_scenes)
            .for_each(|id| f(*id));
        if let Some(action) = self.anim.as_ref().and_then(|anim| anim.action) {
            f(action);
        }
    }
}

/// An external cache of animated geometry or transforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheFile {
    pub filepath: String,
    pub is_sequence: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Camera {
    /// Object the depth of field focuses on.
    pub dof_object: Option<IdHandle>,
    pub anim: Option<AnimData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Armature {
    pub bones: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Material {
    pub node_tree: Option<IdHandle>,
    pub anim: Option<AnimData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mesh {
    pub materials: Vec<IdHandle>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct World {
    pub node_tree: Option<IdHandle>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    /// Movie or image sequence that changes with the frame.
    pub animated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Action {
    pub frame_range: (i32, i32),
}
