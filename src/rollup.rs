// SPDX-License-Identifier: Apache-2.0
//! Derived per-node fields, computed at write time and kept current via an
//! inverted dependency index (§4.3).

use rustc_hash::FxHashMap;

use crate::ids::{EdgeId, NodeId, RollupId, TypeId};
use crate::index::IndexManager;
use crate::node_store::{NodeStore, NodeStoreView};
use crate::schema::{RollupDef, Schema};
use crate::value::Value;

/// `(source_type, edge, target_id) -> {source_id}`: which nodes have a
/// `traverse` rollup that reads through `edge` to `target_id` (§4.3
/// "Dependency tracking"). Looked up whenever `target_id` changes a
/// property, so dependents can be recomputed in O(1) expected time.
#[derive(Debug, Default)]
pub struct RollupCache {
    dependents: FxHashMap<(TypeId, EdgeId, NodeId), Vec<NodeId>>,
}

impl RollupCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add_dependency(&mut self, source_type: TypeId, edge: EdgeId, target: NodeId, source: NodeId) {
        let entry = self.dependents.entry((source_type, edge, target)).or_default();
        if !entry.contains(&source) {
            entry.push(source);
        }
    }

    fn remove_dependency(&mut self, source_type: TypeId, edge: EdgeId, target: NodeId, source: NodeId) {
        if let Some(entry) = self.dependents.get_mut(&(source_type, edge, target)) {
            entry.retain(|&s| s != source);
            if entry.is_empty() {
                self.dependents.remove(&(source_type, edge, target));
            }
        }
    }

    fn dependents_of(&self, source_type: TypeId, edge: EdgeId, target: NodeId) -> Vec<NodeId> {
        self.dependents.get(&(source_type, edge, target)).cloned().unwrap_or_default()
    }

    fn compute_one(schema: &Schema, store: &NodeStore, indexes: &IndexManager, node: NodeId, def: RollupDef) -> Value {
        match def {
            RollupDef::Count { edge } => Value::Int(store.edge_targets(node, edge).len() as i64),
            RollupDef::Traverse { edge, field } => store
                .edge_targets(node, edge)
                .first()
                .and_then(|&target| store.property(target, field).cloned())
                .unwrap_or(Value::Null),
            RollupDef::First { index } => Self::leading_field_value(schema, store, indexes, index, false),
            RollupDef::Last { index } => Self::leading_field_value(schema, store, indexes, index, true),
        }
    }

    /// Reads the leading field's value off the node at one end of
    /// `index`'s key order — `O(log N)` for `First` (first entry of a
    /// forward scan) and `O(log N + k)` for `Last` (walking to the end,
    /// since the B+ tree's iterator is forward-only, §4.1).
    fn leading_field_value(schema: &Schema, store: &NodeStore, indexes: &IndexManager, index: crate::ids::IndexId, last: bool) -> Value {
        let Some(crate::schema::IndexField::Property { property, .. }) = schema.index_fields(index).first() else {
            return Value::Null;
        };
        let picked = if last {
            indexes.scan_all(index).last()
        } else {
            indexes.scan_all(index).next()
        };
        picked.and_then(|node| store.property(node, *property).cloned()).unwrap_or(Value::Null)
    }

    /// Recomputes every rollup declared on `type_id` for `node`, writing
    /// results into `store`. For `traverse` rollups, also registers (or
    /// refreshes) the dependency so future changes to the observed target
    /// trigger recomputation.
    pub fn recompute_all(
        &mut self,
        schema: &Schema,
        store: &mut NodeStore,
        indexes: &IndexManager,
        node: NodeId,
        type_id: TypeId,
    ) {
        for &rollup_id in schema.rollups_of(type_id) {
            let Some(def) = schema.rollup_def(rollup_id) else { continue };
            if let RollupDef::Traverse { edge, .. } = def {
                if let Some(&target) = store.edge_targets(node, edge).first() {
                    self.add_dependency(type_id, edge, target, node);
                }
            }
            let value = Self::compute_one(schema, store, indexes, node, def);
            store.set_rollup(node, rollup_id, value);
        }
    }

    /// Recomputes every rollup on `type_id` that reads `edge`, after a
    /// link/unlink changes that edge's targets (§4.3 "On link/unlink").
    /// Also refreshes the traverse dependency, since the observed target may
    /// have changed.
    pub fn recompute_for_edge(
        &mut self,
        schema: &Schema,
        store: &mut NodeStore,
        indexes: &IndexManager,
        node: NodeId,
        type_id: TypeId,
        edge: EdgeId,
        previous_target: Option<NodeId>,
    ) {
        for &rollup_id in schema.rollups_of(type_id) {
            let Some(def) = schema.rollup_def(rollup_id) else { continue };
            let reads_edge = matches!(def, RollupDef::Count { edge: e } | RollupDef::Traverse { edge: e, .. } if e == edge);
            if !reads_edge {
                continue;
            }
            if let RollupDef::Traverse { .. } = def {
                if let Some(prev) = previous_target {
                    self.remove_dependency(type_id, edge, prev, node);
                }
                if let Some(&target) = store.edge_targets(node, edge).first() {
                    self.add_dependency(type_id, edge, target, node);
                }
            }
            let value = Self::compute_one(schema, store, indexes, node, def);
            store.set_rollup(node, rollup_id, value);
        }
    }

    /// Called after `target`'s property changes: recomputes every
    /// `traverse` rollup that observes `target` through `edge` (§4.3).
    /// Returns the sources recomputed, for change-event propagation.
    pub fn recompute_dependents(
        &mut self,
        schema: &Schema,
        store: &mut NodeStore,
        indexes: &IndexManager,
        source_type: TypeId,
        edge: EdgeId,
        target: NodeId,
    ) -> Vec<NodeId> {
        let sources = self.dependents_of(source_type, edge, target);
        for &source in &sources {
            for &rollup_id in schema.rollups_of(source_type) {
                if let Some(def @ RollupDef::Traverse { edge: e, .. }) = schema.rollup_def(rollup_id) {
                    if e == edge {
                        let value = Self::compute_one(schema, store, indexes, source, def);
                        store.set_rollup(source, rollup_id, value);
                    }
                }
            }
        }
        sources
    }

    /// Drops every dependency entry that names `node` as a source (§4.3
    /// "On delete").
    pub fn remove_node(&mut self, node: NodeId) {
        self.dependents.retain(|_, sources| {
            sources.retain(|&s| s != node);
            !sources.is_empty()
        });
    }
}
