//! Host Database
//!
//! This module models the "main database" of the host application: the set
//! of user-visible data-blocks (scenes, objects, collections, node trees,
//! cache files, cameras, armatures, materials, meshes, worlds, images and
//! actions) that a dependency graph is built from.
//!
//! # Access Rules
//!
//! The graph builders only ever read from a [`Main`]. The host mutates it
//! between builds through [`MainDatabase::write`], and then tags the graphs
//! whose relations went stale.
//!
//! Data-blocks reference each other through [`IdHandle`]s. A handle that no
//! longer resolves is not an error at this level; the builders report it as
//! a diagnostic.

mod customdata;
mod data;
mod modifier;
mod object;
mod scene;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use customdata::CustomDataMask;
pub use data::{Action, Armature, CacheFile, Camera, Image, Material, Mesh, NodeTree, NodeTreeType, World};
pub use modifier::{BooleanOperand, ExternalModifier, Modifier, UpdateDepsgraph, UpdateDepsgraphContext};
pub use object::{
    AnimData, Constraint, ConstraintTarget, Driver, DriverRead, DriverTarget, DriverVariable, Object,
    ObjectType, Parent, ParentKind, Pose, PoseChannel,
};
pub use scene::{Collection, Scene, TimeMarker, ViewLayer};

/// Opaque handle naming one data-block of a [`Main`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdHandle(u32);

impl IdHandle {
    /// Build a handle from its raw value.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw handle value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for IdHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a data-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum IdKind {
    Scene,
    Object,
    Collection,
    NodeTree,
    CacheFile,
    Camera,
    Armature,
    Material,
    Mesh,
    World,
    Image,
    Action,
}

impl IdKind {
    /// Two-letter code prefixed to data-block names in diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            IdKind::Scene => "SC",
            IdKind::Object => "OB",
            IdKind::Collection => "GR",
            IdKind::NodeTree => "NT",
            IdKind::CacheFile => "CF",
            IdKind::Camera => "CA",
            IdKind::Armature => "AR",
            IdKind::Material => "MA",
            IdKind::Mesh => "ME",
            IdKind::World => "WO",
            IdKind::Image => "IM",
            IdKind::Action => "AC",
        }
    }
}

/// Payload of a data-block.
#[derive(Debug, Clone)]
pub enum IdData {
    Scene(Scene),
    Object(Object),
    Collection(Collection),
    NodeTree(NodeTree),
    CacheFile(CacheFile),
    Camera(Camera),
    Armature(Armature),
    Material(Material),
    Mesh(Mesh),
    World(World),
    Image(Image),
    Action(Action),
}

impl IdData {
    pub fn kind(&self) -> IdKind {
        match self {
            IdData::Scene(_) => IdKind::Scene,
            IdData::Object(_) => IdKind::Object,
            IdData::Collection(_) => IdKind::Collection,
            IdData::NodeTree(_) => IdKind::NodeTree,
            IdData::CacheFile(_) => IdKind::CacheFile,
            IdData::Camera(_) => IdKind::Camera,
            IdData::Armature(_) => IdKind::Armature,
            IdData::Material(_) => IdKind::Material,
            IdData::Mesh(_) => IdKind::Mesh,
            IdData::World(_) => IdKind::World,
            IdData::Image(_) => IdKind::Image,
            IdData::Action(_) => IdKind::Action,
        }
    }
}

/// A named data-block.
#[derive(Debug, Clone)]
pub struct DataBlock {
    pub name: String,
    pub data: IdData,
}

impl DataBlock {
    pub fn kind(&self) -> IdKind {
        self.data.kind()
    }

    /// Name with the kind prefix, e.g. `OBCube`.
    pub fn full_name(&self) -> String {
        format!("{}{}", self.kind().code(), self.name)
    }
}

/// Generates the typed add/get/get_mut accessors of [`Main`].
macro_rules! typed_access {
    ($add:ident, $get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        pub fn $add(&mut self, name: impl Into<String>, value: $ty) -> IdHandle {
            self.add(name, IdData::$variant(value))
        }

        pub fn $get(&self, handle: IdHandle) -> Option<&$ty> {
            match self.blocks.get(&handle).map(|block| &block.data) {
                Some(IdData::$variant(value)) => Some(value),
                _ => None,
            }
        }

        pub fn $get_mut(&mut self, handle: IdHandle) -> Option<&mut $ty> {
            match self.blocks.get_mut(&handle).map(|block| &mut block.data) {
                Some(IdData::$variant(value)) => Some(value),
                _ => None,
            }
        }
    };
}

/// The set of data-blocks a graph is built from.
#[derive(Debug, Default, Clone)]
pub struct Main {
    blocks: IndexMap<IdHandle, DataBlock>,
    next_handle: u32,
}

impl Main {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a data-block and return its handle.
    ///
    /// Handles are never reused, so a removed data-block leaves dangling
    /// references that resolve to nothing.
    pub fn add(&mut self, name: impl Into<String>, data: IdData) -> IdHandle {
        let handle = IdHandle(self.next_handle);
        self.next_handle += 1;
        self.blocks.insert(
            handle,
            DataBlock {
                name: name.into(),
                data,
            },
        );
        handle
    }

    /// Remove a data-block.
    pub fn remove(&mut self, handle: IdHandle) -> Option<DataBlock> {
        self.blocks.shift_remove(&handle)
    }

    typed_access!(add_scene, scene, scene_mut, Scene, Scene);
    typed_access!(add_object, object, object_mut, Object, Object);
    typed_access!(add_collection, collection, collection_mut, Collection, Collection);
    typed_access!(add_node_tree, node_tree, node_tree_mut, NodeTree, NodeTree);
    typed_access!(add_cache_file, cache_file, cache_file_mut, CacheFile, CacheFile);
    typed_access!(add_camera, camera, camera_mut, Camera, Camera);
    typed_access!(add_armature, armature, armature_mut, Armature, Armature);
    typed_access!(add_material, material, material_mut, Material, Material);
    typed_access!(add_mesh, mesh, mesh_mut, Mesh, Mesh);
    typed_access!(add_world, world, world_mut, World, World);
    typed_access!(add_image, image, image_mut, Image, Image);
    typed_access!(add_action, action, action_mut, Action, Action);

    pub fn get(&self, handle: IdHandle) -> Option<&DataBlock> {
        self.blocks.get(&handle)
    }

    pub fn contains(&self, handle: IdHandle) -> bool {
        self.blocks.contains_key(&handle)
    }

    pub fn kind(&self, handle: IdHandle) -> Option<IdKind> {
        self.blocks.get(&handle).map(DataBlock::kind)
    }

    /// Diagnostic name of a data-block; never fails.
    pub fn id_name(&self, handle: IdHandle) -> String {
        self.blocks
            .get(&handle)
            .map(DataBlock::full_name)
            .unwrap_or_else(|| format!("<missing {handle}>"))
    }

    /// Iterate over all data-blocks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (IdHandle, &DataBlock)> {
        self.blocks.iter().map(|(handle, block)| (*handle, block))
    }

    /// Iterate over all objects in insertion order.
    pub fn objects(&self) -> impl Iterator<Item = (IdHandle, &Object)> {
        self.blocks.iter().filter_map(|(handle, block)| match &block.data {
            IdData::Object(object) => Some((*handle, object)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Process-unique identifier of a [`MainDatabase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MainId(u64);

impl MainId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A [`Main`] shared between the host and every graph built from it.
#[derive(Debug)]
pub struct MainDatabase {
    id: MainId,
    main: RwLock<Main>,
}

impl MainDatabase {
    pub fn new(main: Main) -> Arc<Self> {
        Arc::new(Self {
            id: MainId::next(),
            main: RwLock::new(main),
        })
    }

    pub fn id(&self) -> MainId {
        self.id
    }

    /// Read access, held for the duration of a build.
    pub fn read(&self) -> RwLockReadGuard<'_, Main> {
        self.main.read()
    }

    /// Write access for host-side edits between builds.
    pub fn write(&self) -> RwLockWriteGuard<'_, Main> {
        self.main.write()
    }
}
