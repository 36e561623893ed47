//! Identity Keys
//!
//! Keys are the only addressing vocabulary that crosses module boundaries.
//! They are plain values with structural equality; resolving a key yields a
//! unique node of the [`Graph`](super::Graph) or nothing.

use std::fmt;

use crate::host::IdHandle;

use super::types::{NodeType, OperationCode};

/// Addresses the node of a data-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdKey {
    pub id: IdHandle,
}

impl IdKey {
    pub fn new(id: IdHandle) -> Self {
        Self { id }
    }
}

impl fmt::Display for IdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdKey({})", self.id)
    }
}

/// Addresses a component of a data-block, optionally qualified by name
/// (a bone name for [`NodeType::Bone`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentKey {
    pub id: IdHandle,
    pub kind: NodeType,
    pub name: String,
}

impl ComponentKey {
    pub fn new(id: IdHandle, kind: NodeType) -> Self {
        Self {
            id,
            kind,
            name: String::new(),
        }
    }

    pub fn named(id: IdHandle, kind: NodeType, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
        }
    }

    /// The component of one bone of an armature object.
    pub fn bone(id: IdHandle, bone: impl Into<String>) -> Self {
        Self::named(id, NodeType::Bone, bone)
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKey({}, {}", self.id, self.kind)?;
        if !self.name.is_empty() {
            write!(f, ", '{}'", self.name)?;
        }
        f.write_str(")")
    }
}

/// Addresses one operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub id: IdHandle,
    pub component: NodeType,
    pub component_name: String,
    pub code: OperationCode,
    pub name: String,
    pub name_tag: i32,
}

impl OperationKey {
    pub fn new(id: IdHandle, component: NodeType, code: OperationCode) -> Self {
        Self {
            id,
            component,
            component_name: String::new(),
            code,
            name: String::new(),
            name_tag: -1,
        }
    }

    /// An operation distinguished by name within its component (drivers).
    pub fn named(id: IdHandle, component: NodeType, code: OperationCode, name: impl Into<String>, name_tag: i32) -> Self {
        Self {
            name: name.into(),
            name_tag,
            ..Self::new(id, component, code)
        }
    }

    /// An operation of a bone component.
    pub fn bone(id: IdHandle, bone: impl Into<String>, code: OperationCode) -> Self {
        Self {
            component_name: bone.into(),
            ..Self::new(id, NodeType::Bone, code)
        }
    }

    pub fn component_key(&self) -> ComponentKey {
        ComponentKey::named(self.id, self.component, self.component_name.clone())
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationKey({}, {}", self.id, self.component)?;
        if !self.component_name.is_empty() {
            write!(f, " '{}'", self.component_name)?;
        }
        write!(f, ", {}", self.code)?;
        if !self.name.is_empty() {
            write!(f, ", '{}'", self.name)?;
            if self.name_tag != -1 {
                write!(f, "[{}]", self.name_tag)?;
            }
        }
        f.write_str(")")
    }
}

/// Any key accepted as a relation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationKey {
    Id(IdKey),
    Component(ComponentKey),
    Operation(OperationKey),
}

impl RelationKey {
    pub fn id(&self) -> IdHandle {
        match self {
            RelationKey::Id(key) => key.id,
            RelationKey::Component(key) => key.id,
            RelationKey::Operation(key) => key.id,
        }
    }
}

impl From<IdKey> for RelationKey {
    fn from(key: IdKey) -> Self {
        RelationKey::Id(key)
    }
}

impl From<ComponentKey> for RelationKey {
    fn from(key: ComponentKey) -> Self {
        RelationKey::Component(key)
    }
}

impl From<OperationKey> for RelationKey {
    fn from(key: OperationKey) -> Self {
        RelationKey::Operation(key)
    }
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKey::Id(key) => key.fmt(f),
            RelationKey::Component(key) => key.fmt(f),
            RelationKey::Operation(key) => key.fmt(f),
        }
    }
}
