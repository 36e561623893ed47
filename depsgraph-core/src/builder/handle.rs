//! Node handle given to code that declares dependencies from outside the
//! graph module.

use crate::graph::{Graph, IdNodeIndex, OperationIndex, RelationFlags, RelationIndex, RelationKey, SpecialEvalFlags};
use crate::host::{CustomDataMask, IdHandle, Main};

use super::relations::RelationBuilder;

/// The operation currently being connected, plus the builder doing it.
///
/// Relations added through the handle end at its operation.
pub struct DepsNodeHandle<'h, 'a> {
    builder: &'h mut RelationBuilder<'a>,
    node: OperationIndex,
    default_name: String,
}

impl<'h, 'a> DepsNodeHandle<'h, 'a> {
    pub fn new(builder: &'h mut RelationBuilder<'a>, node: OperationIndex, default_name: impl Into<String>) -> Self {
        Self {
            builder,
            node,
            default_name: default_name.into(),
        }
    }

    /// The main database being built from. The reference outlives the
    /// handle borrow, so it can be held across further handle calls.
    pub fn main(&self) -> &'a Main {
        self.builder.main()
    }

    pub fn graph(&self) -> &Graph {
        self.builder.graph()
    }

    pub fn operation(&self) -> OperationIndex {
        self.node
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    fn owner(&self) -> IdNodeIndex {
        self.graph().operation_owner(self.node)
    }

    /// Data-block owning the handle's operation.
    pub fn id(&self) -> IdHandle {
        self.graph().id_node(self.owner()).id_orig()
    }

    /// Make the handle's operation depend on `key`. An empty description
    /// falls back to the handle's default name.
    pub fn add_relation(
        &mut self,
        key: impl Into<RelationKey>,
        description: &str,
        flags: RelationFlags,
    ) -> Option<RelationIndex> {
        let description = if description.is_empty() {
            self.default_name.as_str()
        } else {
            description
        };
        self.builder
            .add_node_handle_relation(key.into(), self.node, description, flags)
    }

    /// Depend on the final transform of the handle's own data-block.
    pub fn add_depends_on_transform_relation(&mut self, description: &str) -> Option<RelationIndex> {
        let id = self.id();
        let description = if description.is_empty() {
            self.default_name.clone()
        } else {
            description.to_string()
        };
        self.builder.add_depends_on_transform_relation(id, self.node, &description)
    }

    pub fn add_customdata_mask(&mut self, object: IdHandle, mask: CustomDataMask) {
        self.builder.add_customdata_mask(object, mask);
    }

    pub fn add_special_eval_flag(&mut self, id: IdHandle, flag: SpecialEvalFlags) {
        self.builder.add_special_eval_flag(id, flag);
    }

    pub(crate) fn builder(&mut self) -> &mut RelationBuilder<'a> {
        &mut *self.builder
    }
}
