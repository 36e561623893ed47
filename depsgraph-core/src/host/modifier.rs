//! Geometry Modifiers
//!
//! Modifiers are evaluated inside their object's geometry component. Each
//! kind declares what it reads through a [`DepsNodeHandle`] whose current
//! operation is the object's geometry evaluation, using only the callback
//! functions of [`crate::api`]. This keeps modifier code ignorant of how the
//! graph stores its nodes.
//!
//! The set of kinds is closed and dispatched with a `match`. Host subsystems
//! that need their own modifier kind plug in through [`ExternalModifier`].

use std::fmt;
use std::sync::Arc;

use crate::api;
use crate::builder::DepsNodeHandle;
use crate::graph::{ObjectComponent, SpecialEvalFlags};

use super::customdata::CustomDataMask;
use super::IdHandle;

/// Scene and object a modifier is being evaluated for.
#[derive(Debug, Clone, Copy)]
pub struct UpdateDepsgraphContext {
    pub scene: IdHandle,
    pub object: IdHandle,
}

/// Dependency declaration hook for host-defined modifiers.
pub trait UpdateDepsgraph: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Visit referenced data-blocks so they get built.
    fn foreach_id(&self, _f: &mut dyn FnMut(IdHandle)) {}

    fn update_depsgraph(&self, ctx: &UpdateDepsgraphContext, node: &mut DepsNodeHandle<'_, '_>);
}

/// A modifier whose behaviour lives outside this crate.
#[derive(Clone)]
pub struct ExternalModifier(pub Arc<dyn UpdateDepsgraph>);

impl fmt::Debug for ExternalModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExternalModifier").field(&self.0.name()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperand {
    Object(IdHandle),
    Collection(IdHandle),
}

#[derive(Debug, Clone)]
pub enum Modifier {
    Armature { object: Option<IdHandle> },
    Hook { object: Option<IdHandle>, subtarget: Option<String> },
    Boolean { operand: Option<BooleanOperand> },
    Array {
        start_cap: Option<IdHandle>,
        end_cap: Option<IdHandle>,
        offset_object: Option<IdHandle>,
    },
    Curve { object: Option<IdHandle> },
    MeshSequenceCache { cache_file: Option<IdHandle> },
    /// Cloth simulation stored in a point cache.
    Cloth {
        collision_collection: Option<IdHandle>,
        effectors: Vec<IdHandle>,
    },
    DataTransfer { source: Option<IdHandle>, mask: CustomDataMask },
    Shrinkwrap { target: Option<IdHandle> },
    /// Geometry nodes.
    Nodes { node_tree: Option<IdHandle> },
    Subdivision { levels: u8 },
    External(ExternalModifier),
}

impl Modifier {
    pub fn name(&self) -> &str {
        match self {
            Modifier::Armature { .. } => "Armature",
            Modifier::Hook { .. } => "Hook",
            Modifier::Boolean { .. } => "Boolean",
            Modifier::Array { .. } => "Array",
            Modifier::Curve { .. } => "Curve",
            Modifier::MeshSequenceCache { .. } => "Mesh Sequence Cache",
            Modifier::Cloth { .. } => "Cloth",
            Modifier::DataTransfer { .. } => "Data Transfer",
            Modifier::Shrinkwrap { .. } => "Shrinkwrap",
            Modifier::Nodes { .. } => "Geometry Nodes",
            Modifier::Subdivision { .. } => "Subdivision",
            Modifier::External(external) => external.0.name(),
        }
    }

    pub fn uses_point_cache(&self) -> bool {
        matches!(self, Modifier::Cloth { .. })
    }

    /// Visit every data-block the modifier references.
    pub fn foreach_id(&self, f: &mut dyn FnMut(IdHandle)) {
        let mut visit = |id: &Option<IdHandle>| {
            if let Some(id) = id {
                f(*id);
            }
        };
        match self {
            Modifier::Armature { object }
            | Modifier::Hook { object, .. }
            | Modifier::Curve { object } => visit(object),
            Modifier::Boolean { operand } => match operand {
                Some(BooleanOperand::Object(id) | BooleanOperand::Collection(id)) => visit(&Some(*id)),
                None => {}
            },
            Modifier::Array {
                start_cap,
                end_cap,
                offset_object,
            } => {
                visit(start_cap);
                visit(end_cap);
                visit(offset_object);
            }
            Modifier::MeshSequenceCache { cache_file } => visit(cache_file),
            Modifier::Cloth {
                collision_collection,
                effectors,
            } => {
                visit(collision_collection);
                effectors.iter().for_each(|id| visit(&Some(*id)));
            }
            Modifier::DataTransfer { source, .. } => visit(source),
            Modifier::Shrinkwrap { target } => visit(target),
            Modifier::Nodes { node_tree } => visit(node_tree),
            Modifier::Subdivision { .. } => {}
            Modifier::External(external) => external.0.foreach_id(f),
        }
    }

    /// Declare the relations the modifier's evaluation depends on.
    pub fn update_depsgraph(&self, ctx: &UpdateDepsgraphContext, node: &mut DepsNodeHandle<'_, '_>) {
        match self {
            Modifier::Armature { object: Some(object) } => {
                api::add_object_relation(node, *object, ObjectComponent::EvalPose, "Armature Modifier");
                api::add_depends_on_transform_relation(node, "Armature Modifier");
            }
            Modifier::Hook { object: Some(object), subtarget } => {
                match subtarget {
                    Some(bone) => {
                        api::add_bone_relation(node, *object, bone, ObjectComponent::Bone, "Hook Modifier")
                    }
                    None => api::add_object_relation(node, *object, ObjectComponent::Transform, "Hook Modifier"),
                }
                api::add_depends_on_transform_relation(node, "Hook Modifier");
            }
            Modifier::Boolean { operand: Some(operand) } => {
                match *operand {
                    BooleanOperand::Object(object) => {
                        api::add_object_relation(node, object, ObjectComponent::Transform, "Boolean Modifier");
                        api::add_object_relation(node, object, ObjectComponent::Geometry, "Boolean Modifier");
                    }
                    BooleanOperand::Collection(collection) => {
                        api::add_collection_geometry_relation(node, collection, "Boolean Modifier");
                    }
                }
                api::add_depends_on_transform_relation(node, "Boolean Modifier");
            }
            Modifier::Array {
                start_cap,
                end_cap,
                offset_object,
            } => {
                for cap in [start_cap, end_cap].into_iter().flatten() {
                    api::add_object_relation(node, *cap, ObjectComponent::Geometry, "Array Modifier Cap");
                }
                if let Some(offset) = offset_object {
                    api::add_object_relation(node, *offset, ObjectComponent::Transform, "Array Modifier Offset");
                    api::add_depends_on_transform_relation(node, "Array Modifier");
                }
            }
            Modifier::Curve { object: Some(object) } => {
                api::add_object_relation(node, *object, ObjectComponent::Geometry, "Curve Modifier");
                api::add_object_relation(node, *object, ObjectComponent::Transform, "Curve Modifier");
                api::add_special_eval_flag(node, *object, SpecialEvalFlags::NEED_CURVE_PATH);
                api::add_depends_on_transform_relation(node, "Curve Modifier");
            }
            Modifier::MeshSequenceCache { cache_file: Some(cache_file) } => {
                api::add_object_cache_relation(node, *cache_file, ObjectComponent::Cache, "Mesh Cache File");
            }
            Modifier::Cloth {
                collision_collection,
                effectors,
            } => {
                for effector in effectors {
                    api::add_object_pointcache_relation(node, *effector, ObjectComponent::Transform, "Cloth Field");
                }
                if let Some(collection) = collision_collection {
                    let colliders = collision_objects(node, *collection, ctx.object);
                    for collider in colliders {
                        api::add_object_pointcache_relation(
                            node,
                            collider,
                            ObjectComponent::Transform,
                            "Cloth Collision",
                        );
                        api::add_object_pointcache_relation(
                            node,
                            collider,
                            ObjectComponent::Geometry,
                            "Cloth Collision",
                        );
                    }
                }
                api::add_depends_on_transform_relation(node, "Cloth Modifier");
            }
            Modifier::DataTransfer { source: Some(source), mask } => {
                api::add_object_relation(node, *source, ObjectComponent::Geometry, "Data Transfer Modifier");
                api::add_customdata_mask(node, *source, *mask);
                if *source != ctx.object {
                    api::add_object_relation(node, *source, ObjectComponent::Transform, "Data Transfer Modifier");
                    api::add_depends_on_transform_relation(node, "Data Transfer Modifier");
                }
            }
            Modifier::Shrinkwrap { target: Some(target) } => {
                api::add_object_relation(node, *target, ObjectComponent::Transform, "Shrinkwrap Modifier");
                api::add_object_relation(node, *target, ObjectComponent::Geometry, "Shrinkwrap Modifier");
                api::add_special_eval_flag(node, *target, SpecialEvalFlags::NEED_SHRINKWRAP_BOUNDARY);
                api::add_depends_on_transform_relation(node, "Shrinkwrap Modifier");
            }
            Modifier::Nodes { node_tree: Some(tree) } => update_depsgraph_nodes(ctx, node, *tree),
            Modifier::External(external) => external.0.update_depsgraph(ctx, node),
            _ => {}
        }
    }
}

/// Objects of a collision collection other than the simulated one.
fn collision_objects(node: &DepsNodeHandle<'_, '_>, collection: IdHandle, object: IdHandle) -> Vec<IdHandle> {
    let main = node.main();
    let mut colliders = Vec::new();
    let mut pending = vec![collection];
    let mut visited = Vec::new();
    while let Some(current) = pending.pop() {
        if visited.contains(&current) {
            continue;
        }
        visited.push(current);
        if let Some(collection) = main.collection(current) {
            colliders.extend(collection.objects.iter().copied().filter(|id| *id != object));
            pending.extend(collection.children.iter().copied());
        }
    }
    colliders
}

fn update_depsgraph_nodes(ctx: &UpdateDepsgraphContext, node: &mut DepsNodeHandle<'_, '_>, tree: IdHandle) {
    api::add_node_tree_output_relation(node, tree, "Nodes Modifier");

    // Walk nested groups so every object/collection the tree reads is covered.
    let main = node.main();
    let mut objects = Vec::new();
    let mut collections = Vec::new();
    let mut mask = CustomDataMask::empty();
    let mut pending = vec![tree];
    let mut visited = Vec::new();
    while let Some(current) = pending.pop() {
        if visited.contains(&current) {
            continue;
        }
        visited.push(current);
        let Some(tree) = main.node_tree(current) else {
            continue;
        };
        objects.extend(tree.objects.iter().copied());
        collections.extend(tree.collections.iter().copied());
        mask |= tree.required_customdata;
        pending.extend(tree.groups.iter().copied());
    }

    let mut needs_own_transform = false;
    for object in objects {
        if object == ctx.object {
            continue;
        }
        api::add_object_relation(node, object, ObjectComponent::Transform, "Nodes Modifier");
        if api::object_has_geometry_component(main, object) {
            api::add_object_relation(node, object, ObjectComponent::Geometry, "Nodes Modifier");
        }
        needs_own_transform = true;
    }
    for collection in collections {
        api::add_collection_geometry_relation(node, collection, "Nodes Modifier");
        api::add_collection_geometry_customdata_mask(node, collection, mask);
        needs_own_transform = true;
    }
    if needs_own_transform {
        api::add_depends_on_transform_relation(node, "Nodes Modifier");
    }
}
