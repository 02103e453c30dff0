// SPDX-License-Identifier: Apache-2.0
//! The `O(1)` id→node map (§3 Node, §2 "Node Store").
//!
//! Ids are allocated densely and monotonically (`crate::ids::NodeIdAllocator`),
//! so a plain arena (`Vec<Option<StoredNode>>` indexed by id) gives `O(1)`
//! lookup without a hash step — the same trade the B+ tree's own node arena
//! makes. A deleted slot is left `None` rather than compacted, since ids are
//! never reused (§3).
//!
//! `NodeStore` itself is the only thing in the crate allowed to mutate node
//! state; every other subsystem reaches it through [`NodeStoreView`], a
//! `Copy`, read-only borrow modeled on the teacher's `GraphView` (§10.5) so
//! that query materialization and rollup recomputation can never accidentally
//! write back into the store they are walking.

use rustc_hash::FxHashMap;

use crate::ids::{EdgeId, NodeId, NodeIdAllocator, PropertyId, RollupId, TypeId};
use crate::value::Value;

#[derive(Debug, Clone)]
pub(crate) struct StoredNode {
    type_id: TypeId,
    properties: FxHashMap<PropertyId, Value>,
    edges: FxHashMap<EdgeId, Vec<NodeId>>,
    rollups: FxHashMap<RollupId, Value>,
}

impl StoredNode {
    fn new(type_id: TypeId) -> Self {
        Self {
            type_id,
            properties: FxHashMap::default(),
            edges: FxHashMap::default(),
            rollups: FxHashMap::default(),
        }
    }
}

/// Owns every node's properties, edges, and rollups, keyed by id.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: Vec<Option<StoredNode>>,
    allocator: NodeIdAllocator,
}

impl NodeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh id and stores a new, propertyless, edgeless node of
    /// `type_id` under it.
    pub fn insert(&mut self, type_id: TypeId) -> NodeId {
        let id = self.allocator.alloc();
        let slot = id.value() as usize;
        if slot >= self.nodes.len() {
            self.nodes.resize_with(slot + 1, || None);
        }
        self.nodes[slot] = Some(StoredNode::new(type_id));
        id
    }

    /// Returns `true` if `id` currently refers to a live node.
    #[must_use]
    pub fn exists(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    fn slot(&self, id: NodeId) -> Option<&StoredNode> {
        self.nodes.get(id.value() as usize).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut StoredNode> {
        self.nodes.get_mut(id.value() as usize).and_then(Option::as_mut)
    }

    /// Returns the type of `id`.
    #[must_use]
    pub fn type_of(&self, id: NodeId) -> Option<TypeId> {
        self.slot(id).map(|n| n.type_id)
    }

    /// Returns the value of `property` on `id`.
    #[must_use]
    pub fn property(&self, id: NodeId, property: PropertyId) -> Option<&Value> {
        self.slot(id).and_then(|n| n.properties.get(&property))
    }

    /// Sets `property` on `id` to `value`, returning the previous value (if
    /// any, including an explicit prior `Value::Null`, distinct from the
    /// property never having been set).
    pub fn set_property(&mut self, id: NodeId, property: PropertyId, value: Value) -> Option<Value> {
        self.slot_mut(id).and_then(|n| n.properties.insert(property, value))
    }

    /// Returns the ordered target sequence of `edge` on `id`.
    #[must_use]
    pub fn edge_targets(&self, id: NodeId, edge: EdgeId) -> &[NodeId] {
        self.slot(id).and_then(|n| n.edges.get(&edge)).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if `id.edge` already contains `target`.
    #[must_use]
    pub fn has_edge(&self, id: NodeId, edge: EdgeId, target: NodeId) -> bool {
        self.edge_targets(id, edge).contains(&target)
    }

    /// Appends `target` to `id.edge` if not already present. Returns `true`
    /// if the edge list changed.
    pub fn link(&mut self, id: NodeId, edge: EdgeId, target: NodeId) -> bool {
        let Some(node) = self.slot_mut(id) else { return false };
        let list = node.edges.entry(edge).or_default();
        if list.contains(&target) {
            false
        } else {
            list.push(target);
            true
        }
    }

    /// Removes `target` from `id.edge` if present. Returns `true` if the
    /// edge list changed.
    pub fn unlink(&mut self, id: NodeId, edge: EdgeId, target: NodeId) -> bool {
        let Some(node) = self.slot_mut(id) else { return false };
        let Some(list) = node.edges.get_mut(&edge) else { return false };
        let before = list.len();
        list.retain(|&t| t != target);
        list.len() != before
    }

    /// Returns the current value of `rollup` on `id`.
    #[must_use]
    pub fn rollup(&self, id: NodeId, rollup: RollupId) -> Option<&Value> {
        self.slot(id).and_then(|n| n.rollups.get(&rollup))
    }

    /// Sets `rollup` on `id` to `value`.
    pub fn set_rollup(&mut self, id: NodeId, rollup: RollupId, value: Value) {
        if let Some(node) = self.slot_mut(id) {
            node.rollups.insert(rollup, value);
        }
    }

    /// Deletes `id`, returning its edge map so the caller can cascade
    /// unlinks on the other side of every edge (§3 Lifecycle).
    pub(crate) fn delete(&mut self, id: NodeId) -> Option<(TypeId, FxHashMap<EdgeId, Vec<NodeId>>)> {
        let slot = self.nodes.get_mut(id.value() as usize)?;
        let node = slot.take()?;
        Some((node.type_id, node.edges))
    }

    /// Borrows this store read-only.
    #[must_use]
    pub fn view(&self) -> NodeStoreView<'_> {
        NodeStoreView(self)
    }
}

/// A `Copy`, strictly read-only borrow of a [`NodeStore`] (§10.5).
///
/// Query materialization, index maintenance reads, and rollup recomputation
/// all take this type rather than `&NodeStore`: it exposes the same read
/// methods but, being a distinct type with no mutating methods of its own,
/// cannot be used to accidentally write back into the store mid-traversal.
#[derive(Debug, Clone, Copy)]
pub struct NodeStoreView<'a>(&'a NodeStore);

impl<'a> NodeStoreView<'a> {
    /// Returns `true` if `id` currently refers to a live node.
    #[must_use]
    pub fn exists(self, id: NodeId) -> bool {
        self.0.exists(id)
    }

    /// Returns the type of `id`.
    #[must_use]
    pub fn type_of(self, id: NodeId) -> Option<TypeId> {
        self.0.type_of(id)
    }

    /// Returns the value of `property` on `id`.
    #[must_use]
    pub fn get_property(self, id: NodeId, property: PropertyId) -> Option<&'a Value> {
        self.0.property(id, property)
    }

    /// Returns the ordered target sequence of `edge` on `id`.
    #[must_use]
    pub fn edge_targets(self, id: NodeId, edge: EdgeId) -> &'a [NodeId] {
        self.0.edge_targets(id, edge)
    }

    /// Returns `true` if `id.edge` contains `target`.
    #[must_use]
    pub fn has_edge(self, id: NodeId, edge: EdgeId, target: NodeId) -> bool {
        self.0.has_edge(id, edge, target)
    }

    /// Returns the current value of `rollup` on `id`.
    #[must_use]
    pub fn rollup(self, id: NodeId, rollup: RollupId) -> Option<&'a Value> {
        self.0.rollup(id, rollup)
    }
}
