//! Graph Store
//!
//! The [`Graph`] owns every node and relation of one dependency graph and
//! answers key lookups.
//!
//! # Storage
//!
//! Nodes live in three arenas (ids, components, operations) and relations in
//! a pool; everything else refers to them through index handles, so the
//! identity of a node survives arena growth. Hash indices keep lookups
//! amortised O(1):
//!
//! - data-block handle → id node
//! - `(kind, name)` → component, per id node
//! - `(code, name, name_tag)` → operation, per component
//! - `(from, to)` → relation
//!
//! Creation functions compute the new index before touching any arena, so an
//! exhausted index space is reported without leaving partial structures.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DepsgraphConfig;
use crate::error::{DepsgraphError, Result};
use crate::eval::CallbackTable;
use crate::host::{IdHandle, IdKind, MainDatabase};

use super::keys::{ComponentKey, OperationKey};
use super::node::{ComponentIndex, ComponentNode, IdNode, IdNodeIndex, OperationIndex, OperationNode};
use super::relation::{Relation, RelationFlags, RelationIndex};
use super::types::{NodeType, OperationCode};

/// What the graph is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EvaluationMode {
    Viewport,
    Render,
}

fn next_index(len: usize, capacity: u32, arena: &'static str) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|index| *index < capacity)
        .ok_or(DepsgraphError::CapacityExceeded(arena))
}

/// A dependency graph of one scene/view layer.
#[derive(Debug)]
pub struct Graph {
    main: Arc<MainDatabase>,
    scene: IdHandle,
    view_layer: String,
    mode: EvaluationMode,
    config: DepsgraphConfig,
    callbacks: CallbackTable,

    id_nodes: Vec<IdNode>,
    components: Vec<ComponentNode>,
    operations: Vec<OperationNode>,
    relations: Vec<Relation>,
    id_index: HashMap<IdHandle, IdNodeIndex>,
    relation_index: HashMap<(OperationIndex, OperationIndex), RelationIndex>,
    /// Upper bounds on the node arenas and the relation arena.
    node_capacity: u32,
    relation_capacity: u32,

    pub(crate) evaluation_order: Vec<OperationIndex>,
    pub(crate) need_update_relations: bool,
    pub(crate) possibly_incomplete: bool,
    pub(crate) build_count: u64,
}

impl Graph {
    /// Create an empty graph. It starts out stale: nothing is built yet.
    pub fn new(
        main: Arc<MainDatabase>,
        scene: IdHandle,
        view_layer: impl Into<String>,
        mode: EvaluationMode,
        config: DepsgraphConfig,
    ) -> Self {
        Self {
            main,
            scene,
            view_layer: view_layer.into(),
            mode,
            config,
            callbacks: CallbackTable::default(),
            id_nodes: Vec::new(),
            components: Vec::new(),
            operations: Vec::new(),
            relations: Vec::new(),
            id_index: HashMap::new(),
            relation_index: HashMap::new(),
            node_capacity: u32::MAX,
            relation_capacity: u32::MAX,
            evaluation_order: Vec::new(),
            need_update_relations: true,
            possibly_incomplete: false,
            build_count: 0,
        }
    }

    pub fn main_database(&self) -> &Arc<MainDatabase> {
        &self.main
    }

    pub fn scene(&self) -> IdHandle {
        self.scene
    }

    pub fn view_layer(&self) -> &str {
        &self.view_layer
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn config(&self) -> &DepsgraphConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DepsgraphConfig {
        &mut self.config
    }

    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    /// Evaluation callbacks; operations pick them up when they are created,
    /// so changes apply from the next build on.
    pub fn callbacks_mut(&mut self) -> &mut CallbackTable {
        &mut self.callbacks
    }

    // ------------------------------------------------------------------
    // Id nodes
    // ------------------------------------------------------------------

    pub fn find_id_node(&self, id: IdHandle) -> Option<IdNodeIndex> {
        self.id_index.get(&id).copied()
    }

    /// Find the node of `id`, creating it when absent.
    pub fn ensure_id_node(&mut self, id: IdHandle, name: &str, kind: IdKind) -> Result<IdNodeIndex> {
        if let Some(index) = self.find_id_node(id) {
            return Ok(index);
        }
        let index = IdNodeIndex(next_index(self.id_nodes.len(), self.node_capacity, "id node")?);
        self.id_nodes.push(IdNode::new(id, name.to_string(), kind));
        self.id_index.insert(id, index);
        Ok(index)
    }

    pub fn id_node(&self, index: IdNodeIndex) -> &IdNode {
        &self.id_nodes[index.index()]
    }

    pub(crate) fn id_node_mut(&mut self, index: IdNodeIndex) -> &mut IdNode {
        &mut self.id_nodes[index.index()]
    }

    pub fn id_nodes(&self) -> impl Iterator<Item = (IdNodeIndex, &IdNode)> {
        self.id_nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (IdNodeIndex(index as u32), node))
    }

    /// Look up the node of `id` by data-block handle.
    pub fn id_node_for(&self, id: IdHandle) -> Option<&IdNode> {
        self.find_id_node(id).map(|index| self.id_node(index))
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    pub fn find_component(&self, key: &ComponentKey) -> Option<ComponentIndex> {
        let id_node = self.id_node(self.find_id_node(key.id)?);
        id_node.components.get(&(key.kind, key.name.clone())).copied()
    }

    pub fn ensure_component(&mut self, owner: IdNodeIndex, kind: NodeType, name: &str) -> Result<ComponentIndex> {
        let lookup = (kind, name.to_string());
        if let Some(index) = self.id_node(owner).components.get(&lookup) {
            return Ok(*index);
        }
        let index = ComponentIndex(next_index(self.components.len(), self.node_capacity, "component")?);
        self.components.push(ComponentNode::new(owner, kind, name.to_string()));
        self.id_node_mut(owner).components.insert(lookup, index);
        Ok(index)
    }

    pub fn component(&self, index: ComponentIndex) -> &ComponentNode {
        &self.components[index.index()]
    }

    pub(crate) fn component_mut(&mut self, index: ComponentIndex) -> &mut ComponentNode {
        &mut self.components[index.index()]
    }

    /// Operation a relation into the component ends at: the declared entry,
    /// otherwise the earliest operation by phase and code.
    pub fn component_entry_operation(&self, index: ComponentIndex) -> Option<OperationIndex> {
        let component = self.component(index);
        component.entry.or_else(|| {
            component
                .operations()
                .min_by_key(|op| (self.operation(*op).code.phase(), self.operation(*op).code.index(), *op))
        })
    }

    /// Operation a relation out of the component starts at: the declared
    /// exit, otherwise the latest operation by phase and code.
    pub fn component_exit_operation(&self, index: ComponentIndex) -> Option<OperationIndex> {
        let component = self.component(index);
        component.exit.or_else(|| {
            component
                .operations()
                .max_by_key(|op| (self.operation(*op).code.phase(), self.operation(*op).code.index(), *op))
        })
    }

    pub(crate) fn set_component_entry_exit(
        &mut self,
        index: ComponentIndex,
        entry: Option<OperationIndex>,
        exit: Option<OperationIndex>,
    ) {
        let component = self.component_mut(index);
        if entry.is_some() {
            component.entry = entry;
        }
        if exit.is_some() {
            component.exit = exit;
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    pub fn find_operation(&self, key: &OperationKey) -> Option<OperationIndex> {
        let component = self.component(self.find_component(&key.component_key())?);
        component
            .operations
            .get(&(key.code, key.name.clone(), key.name_tag))
            .copied()
    }

    pub fn ensure_operation(
        &mut self,
        owner: ComponentIndex,
        code: OperationCode,
        name: &str,
        name_tag: i32,
    ) -> Result<OperationIndex> {
        let lookup = (code, name.to_string(), name_tag);
        if let Some(index) = self.component(owner).operations.get(&lookup) {
            return Ok(*index);
        }
        let index = OperationIndex(next_index(self.operations.len(), self.node_capacity, "operation")?);
        let mut node = OperationNode::new(owner, code, name.to_string(), name_tag);
        node.callback = self.callbacks.get(code);
        self.operations.push(node);
        self.component_mut(owner).operations.insert(lookup, index);
        Ok(index)
    }

    pub fn operation(&self, index: OperationIndex) -> &OperationNode {
        &self.operations[index.index()]
    }

    pub(crate) fn operation_mut(&mut self, index: OperationIndex) -> &mut OperationNode {
        &mut self.operations[index.index()]
    }

    pub fn operations(&self) -> impl Iterator<Item = (OperationIndex, &OperationNode)> {
        self.operations
            .iter()
            .enumerate()
            .map(|(index, node)| (OperationIndex(index as u32), node))
    }

    /// Id node owning an operation.
    pub fn operation_owner(&self, index: OperationIndex) -> IdNodeIndex {
        self.component(self.operation(index).owner).owner
    }

    /// Key that resolves back to `index`.
    pub fn operation_key(&self, index: OperationIndex) -> OperationKey {
        let operation = self.operation(index);
        let component = self.component(operation.owner);
        let id_node = self.id_node(component.owner);
        OperationKey {
            id: id_node.id_orig,
            component: component.kind,
            component_name: component.name.clone(),
            code: operation.code,
            name: operation.name.clone(),
            name_tag: operation.name_tag,
        }
    }

    /// Human readable path of an operation, e.g. `OBCube/TRANSFORM/TRANSFORM_FINAL`.
    pub fn describe_operation(&self, index: OperationIndex) -> String {
        let operation = self.operation(index);
        let component = self.component(operation.owner);
        let id_node = self.id_node(component.owner);
        let mut path = format!("{}/{}", id_node.name, component.kind);
        if !component.name.is_empty() {
            path.push_str(&format!("[{}]", component.name));
        }
        path.push('/');
        path.push_str(operation.code.name());
        if !operation.name.is_empty() {
            path.push_str(&format!("({})", operation.name));
        }
        path
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    /// Connect two operations.
    ///
    /// A second insertion between the same endpoints merges its flags into
    /// the existing relation and keeps the first description.
    pub fn add_relation(
        &mut self,
        from: OperationIndex,
        to: OperationIndex,
        description: &str,
        flags: RelationFlags,
    ) -> Result<RelationIndex> {
        if let Some(index) = self.relation_index.get(&(from, to)).copied() {
            let relation = &mut self.relations[index.index()];
            relation.flags |= flags;
            tracing::trace!(
                existing = %relation.description,
                ignored = description,
                "merged duplicate relation"
            );
            return Ok(index);
        }
        let index = RelationIndex(next_index(self.relations.len(), self.relation_capacity, "relation")?);
        self.relations.push(Relation {
            from,
            to,
            description: description.to_string(),
            flags,
        });
        self.relation_index.insert((from, to), index);
        self.operation_mut(from).outlinks.push(index);
        self.operation_mut(to).inlinks.push(index);
        Ok(index)
    }

    pub fn find_relation(&self, from: OperationIndex, to: OperationIndex) -> Option<RelationIndex> {
        self.relation_index.get(&(from, to)).copied()
    }

    pub fn relation(&self, index: RelationIndex) -> &Relation {
        &self.relations[index.index()]
    }

    pub(crate) fn relation_mut(&mut self, index: RelationIndex) -> &mut Relation {
        &mut self.relations[index.index()]
    }

    pub fn relations(&self) -> impl Iterator<Item = (RelationIndex, &Relation)> {
        self.relations
            .iter()
            .enumerate()
            .map(|(index, relation)| (RelationIndex(index as u32), relation))
    }

    // ------------------------------------------------------------------
    // Graph state
    // ------------------------------------------------------------------

    /// Drop all nodes, relations and indices. Configuration, callbacks and
    /// the scene binding are kept.
    pub fn clear(&mut self) {
        self.id_nodes.clear();
        self.components.clear();
        self.operations.clear();
        self.relations.clear();
        self.id_index.clear();
        self.relation_index.clear();
        self.evaluation_order.clear();
        self.possibly_incomplete = false;
    }

    /// Limit each node arena to `nodes` entries and the relation arena to
    /// `relations` entries.
    pub(crate) fn set_capacity(&mut self, nodes: u32, relations: u32) {
        self.node_capacity = nodes;
        self.relation_capacity = relations;
    }

    pub fn set_relations_stale(&mut self, stale: bool) {
        self.need_update_relations = stale;
    }

    /// The relations must be rebuilt before the next evaluation.
    pub fn need_update_relations(&self) -> bool {
        self.need_update_relations
    }

    /// The last build skipped at least one relation it could not resolve.
    pub fn possibly_incomplete(&self) -> bool {
        self.possibly_incomplete
    }

    /// Operations in an order where every relation's source precedes its
    /// target (cyclic relations excluded).
    pub fn evaluation_order(&self) -> &[OperationIndex] {
        &self.evaluation_order
    }

    /// Number of completed builds.
    pub fn build_count(&self) -> u64 {
        self.build_count
    }

    pub fn id_node_count(&self) -> usize {
        self.id_nodes.len()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_nodes.is_empty()
    }

    /// Check the structural invariants, returning a description of every
    /// violation found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (id, index) in &self.id_index {
            if self.id_node(*index).id_orig != *id {
                problems.push(format!("index entry {id} points at another id node"));
            }
        }
        if self.id_index.len() != self.id_nodes.len() {
            problems.push("id node not reachable from the index".to_string());
        }

        for (index, component) in self.components.iter().enumerate() {
            let owner = self.id_node(component.owner);
            let lookup = (component.kind, component.name.clone());
            if owner.components.get(&lookup).map(|c| c.index()) != Some(index) {
                problems.push(format!("component {} of {} not owned", component.kind, owner.name));
            }
        }

        for (index, operation) in self.operations() {
            let owner = self.component(operation.owner);
            let lookup = (operation.code, operation.name.clone(), operation.name_tag);
            if owner.operations.get(&lookup) != Some(&index) {
                problems.push(format!("operation {} not owned", self.describe_operation(index)));
            }
        }

        let mut seen = HashMap::new();
        for (index, relation) in self.relations() {
            if let Some(previous) = seen.insert((relation.from, relation.to), index) {
                problems.push(format!("relations {} and {} share endpoints", previous.0, index.0));
            }
            if !self.operation(relation.from).outlinks.contains(&index) {
                problems.push(format!("relation '{}' missing from source outlinks", relation.description));
            }
            if !self.operation(relation.to).inlinks.contains(&index) {
                problems.push(format!("relation '{}' missing from target inlinks", relation.description));
            }
        }

        problems
    }
}
