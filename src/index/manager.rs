// SPDX-License-Identifier: Apache-2.0
//! Per-type compound indexes and cost-based index selection (§4.2).

use crate::btree::BTree;
use crate::ids::{EdgeId, IndexId, NodeId, PropertyId, TypeId};
use crate::index::key::{CompoundKey, KeyComponent};
use crate::node_store::NodeStoreView;
use crate::schema::{IndexField, Schema};
use crate::value::Value;

/// One requested sort key: a property and direction, in the order the
/// caller wants results ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// The property to sort by.
    pub property: PropertyId,
    /// `true` for descending.
    pub desc: bool,
}

/// The shape of filters/sorts a query level wants covered by an index
/// (§4.2): equality filters, range-filtered fields, requested sort order,
/// and (for non-root levels) the parent edge the scan must be prefixed by.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionRequest<'a> {
    /// Parent edge this level's scan must be prefixed by, if not the root.
    pub edge_prefix: Option<EdgeId>,
    /// Properties with an equality filter, and the value required.
    pub equality: &'a [(PropertyId, Value)],
    /// Properties with a non-equality (range) filter.
    pub range: &'a [PropertyId],
    /// Requested sort order.
    pub sorts: &'a [SortKey],
}

/// The index chosen for a query level, and how much of the request it
/// covers (§4.2). Fields the index does not cover must be re-checked per row
/// by the caller (residual filtering).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCoverage {
    /// The selected index.
    pub index_id: IndexId,
    /// Count of leading equality filters the index's fields absorb.
    pub equality_prefix_len: usize,
    /// `true` if the field immediately after the equality prefix is
    /// range-filtered and the index covers it.
    pub range_match: bool,
    /// Count of leading sort keys the index's remaining fields absorb, in
    /// matching direction.
    pub sort_match_len: usize,
}

impl IndexCoverage {
    fn score(self) -> i64 {
        self.equality_prefix_len as i64 * 100
            + self.sort_match_len as i64 * 10
            + i64::from(self.range_match)
    }
}

/// Owns every index table for a graph and performs cost-based selection.
#[derive(Debug, Default)]
pub struct IndexManager {
    tables: Vec<BTree<CompoundKey, NodeId>>,
}

impl IndexManager {
    /// Creates an empty manager with `index_count` (initially empty) tables,
    /// one per index declared anywhere in the schema.
    #[must_use]
    pub fn new(index_count: usize) -> Self {
        Self {
            tables: (0..index_count).map(|_| BTree::new()).collect(),
        }
    }

    fn table(&self, index_id: IndexId) -> &BTree<CompoundKey, NodeId> {
        &self.tables[index_id.0 as usize]
    }

    fn table_mut(&mut self, index_id: IndexId) -> &mut BTree<CompoundKey, NodeId> {
        &mut self.tables[index_id.0 as usize]
    }

    fn build_key(
        schema: &Schema,
        store: NodeStoreView<'_>,
        index_id: IndexId,
        node_id: NodeId,
        property_override: Option<(PropertyId, &Value)>,
        edge_override: Option<(EdgeId, NodeId)>,
    ) -> Option<CompoundKey> {
        let mut components = Vec::new();
        for field in schema.index_fields(index_id) {
            match *field {
                IndexField::Property { property, desc } => {
                    let value = match property_override {
                        Some((p, v)) if p == property => v.clone(),
                        _ => store.get_property(node_id, property).cloned().unwrap_or(Value::Null),
                    };
                    components.push(if desc { KeyComponent::desc(value) } else { KeyComponent::asc(value) });
                }
                IndexField::Edge { edge } => {
                    let target = match edge_override {
                        Some((e, t)) if e == edge => Some(t),
                        _ => store.edge_targets(node_id, edge).first().copied(),
                    };
                    components.push(KeyComponent::Edge(target?));
                }
            }
        }
        Some(CompoundKey::new(&components, node_id))
    }

    /// Inserts `node_id` into every index of `type_id` whose key is
    /// presently computable (edge-prefixed indexes are left for
    /// [`Self::on_link`] to populate once their edge is linked).
    pub fn on_insert(&mut self, schema: &Schema, store: NodeStoreView<'_>, node_id: NodeId, type_id: TypeId) {
        for &index_id in schema.indexes_of(type_id) {
            if let Some(key) = Self::build_key(schema, store, index_id, node_id, None, None) {
                self.table_mut(index_id).insert(key, node_id);
            }
        }
    }

    /// Moves `node_id`'s entry in every index that reads `changed_property`,
    /// from the key it had under `old_value` to the key it has now (§4.2
    /// `onUpdate`).
    pub fn on_update(
        &mut self,
        schema: &Schema,
        store: NodeStoreView<'_>,
        node_id: NodeId,
        type_id: TypeId,
        changed_property: PropertyId,
        old_value: &Value,
    ) {
        for &index_id in schema.indexes_of(type_id) {
            let references = schema
                .index_fields(index_id)
                .iter()
                .any(|f| matches!(f, IndexField::Property { property, .. } if *property == changed_property));
            if !references {
                continue;
            }
            let old_key = Self::build_key(schema, store, index_id, node_id, Some((changed_property, old_value)), None);
            let new_key = Self::build_key(schema, store, index_id, node_id, None, None);
            if let Some(k) = old_key {
                self.table_mut(index_id).remove(&k);
            }
            if let Some(k) = new_key {
                self.table_mut(index_id).insert(k, node_id);
            }
        }
    }

    /// Removes `node_id` from every index of `type_id`. Must be called
    /// before the node store forgets `node_id`'s property/edge state.
    pub fn on_delete(&mut self, schema: &Schema, store: NodeStoreView<'_>, node_id: NodeId, type_id: TypeId) {
        for &index_id in schema.indexes_of(type_id) {
            if let Some(key) = Self::build_key(schema, store, index_id, node_id, None, None) {
                self.table_mut(index_id).remove(&key);
            }
        }
    }

    /// Inserts `src`'s entry into every edge-prefixed index of `src_type`
    /// whose leading field is `edge`, now that `tgt` is known (§4.2
    /// `onLink`).
    pub fn on_link(
        &mut self,
        schema: &Schema,
        store: NodeStoreView<'_>,
        src: NodeId,
        src_type: TypeId,
        edge: EdgeId,
        tgt: NodeId,
    ) {
        for &index_id in schema.indexes_of(src_type) {
            let leads_with_edge = matches!(
                schema.index_fields(index_id).first(),
                Some(IndexField::Edge { edge: e }) if *e == edge
            );
            if !leads_with_edge {
                continue;
            }
            if let Some(key) = Self::build_key(schema, store, index_id, src, None, Some((edge, tgt))) {
                self.table_mut(index_id).insert(key, src);
            }
        }
    }

    /// Removes `src`'s entry from every edge-prefixed index of `src_type`
    /// whose leading field is `edge` (§4.2 `onUnlink`). Must be given the
    /// same `tgt` that was passed to the corresponding `on_link`.
    pub fn on_unlink(
        &mut self,
        schema: &Schema,
        store: NodeStoreView<'_>,
        src: NodeId,
        src_type: TypeId,
        edge: EdgeId,
        tgt: NodeId,
    ) {
        for &index_id in schema.indexes_of(src_type) {
            let leads_with_edge = matches!(
                schema.index_fields(index_id).first(),
                Some(IndexField::Edge { edge: e }) if *e == edge
            );
            if !leads_with_edge {
                continue;
            }
            if let Some(key) = Self::build_key(schema, store, index_id, src, None, Some((edge, tgt))) {
                self.table_mut(index_id).remove(&key);
            }
        }
    }

    fn score_index(schema: &Schema, index_id: IndexId, req: &SelectionRequest<'_>) -> Option<IndexCoverage> {
        let fields = schema.index_fields(index_id);
        let mut pos = 0;

        match (req.edge_prefix, fields.first()) {
            (Some(edge), Some(IndexField::Edge { edge: field_edge })) if edge == *field_edge => pos = 1,
            (Some(_), _) => return None,
            (None, Some(IndexField::Edge { .. })) => return None,
            (None, _) => {}
        }

        let mut equality_prefix_len = 0;
        while let Some(IndexField::Property { property, .. }) = fields.get(pos) {
            if req.equality.iter().any(|(p, _)| p == property) {
                equality_prefix_len += 1;
                pos += 1;
            } else {
                break;
            }
        }

        let mut range_match = false;
        if let Some(IndexField::Property { property, .. }) = fields.get(pos) {
            if req.range.contains(property) {
                range_match = true;
            }
        }

        let sort_start = pos + usize::from(range_match);
        let mut sort_match_len = 0;
        for (i, sort) in req.sorts.iter().enumerate() {
            match fields.get(sort_start + i) {
                Some(IndexField::Property { property, desc }) if *property == sort.property && *desc == sort.desc => {
                    sort_match_len += 1;
                }
                _ => break,
            }
        }

        Some(IndexCoverage {
            index_id,
            equality_prefix_len,
            range_match,
            sort_match_len,
        })
    }

    /// Picks the best-covering index of `type_id` for `req`, per §4.2's
    /// scoring rule. Ties prefer the index with the fewest uncovered
    /// (residual) fields; further ties prefer the lower `IndexId` for
    /// determinism.
    #[must_use]
    pub fn select(schema: &Schema, type_id: TypeId, req: &SelectionRequest<'_>) -> Option<IndexCoverage> {
        schema
            .indexes_of(type_id)
            .iter()
            .filter_map(|&index_id| Self::score_index(schema, index_id, req))
            .max_by_key(|c| {
                let covered = c.equality_prefix_len + usize::from(c.range_match) + c.sort_match_len;
                let residual = schema.index_fields(c.index_id).len().saturating_sub(covered);
                (c.score(), std::cmp::Reverse(residual), std::cmp::Reverse(c.index_id.0))
            })
    }

    /// Scans `index_id` for every entry whose leading fields exactly match
    /// `components` (an equality prefix, an edge prefix, or both
    /// concatenated in field order), in index key order.
    pub fn scan_prefix<'a>(
        &'a self,
        index_id: IndexId,
        components: &[KeyComponent],
    ) -> impl Iterator<Item = NodeId> + 'a {
        let lo = CompoundKey::prefix(components);
        let hi = CompoundKey::prefix_upper_bound(components);
        self.table(index_id).range(&lo, &hi).map(|(_, &id)| id)
    }

    /// Scans every entry of `index_id` in key order (used when the request
    /// has no equality/edge prefix to narrow the scan).
    pub fn scan_all(&self, index_id: IndexId) -> impl Iterator<Item = NodeId> + '_ {
        self.table(index_id).scan().map(|(_, &id)| id)
    }

    /// `O(log N)` positional lookup within `index_id`'s full key order,
    /// used by viewport materialization (§4.4) when a level has no residual
    /// post-filters.
    #[must_use]
    pub fn skip_to_position(&self, index_id: IndexId, position: u64) -> impl Iterator<Item = NodeId> + '_ {
        self.table(index_id).skip_to_position(position).map(|(_, &id)| id)
    }

    /// Total entry count of `index_id`.
    #[must_use]
    pub fn total_count(&self, index_id: IndexId) -> u64 {
        self.table(index_id).total_count()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::node_store::NodeStore;
    use crate::schema::Schema;
    use crate::value::ValueKind;

    fn user_schema_with_index() -> (Schema, PropertyId, IndexId) {
        let mut b = Schema::builder();
        let user = b.add_type("User").unwrap();
        let name = b.add_property(user, "name", ValueKind::String).unwrap();
        let index = b
            .add_index(user, vec![IndexField::Property { property: name, desc: false }])
            .unwrap();
        (b.finish().unwrap(), name, index)
    }

    #[test]
    fn insert_update_delete_roundtrip() {
        let (schema, name_prop, index_id) = user_schema_with_index();
        let user_type = schema.type_id("User").unwrap();
        let mut store = NodeStore::new();
        let mut mgr = IndexManager::new(1);

        let bob = store.insert(user_type);
        store.set_property(bob, name_prop, Value::String("Bob".into()));
        mgr.on_insert(&schema, store.view(), bob, user_type);

        let alice = store.insert(user_type);
        store.set_property(alice, name_prop, Value::String("Alice".into()));
        mgr.on_insert(&schema, store.view(), alice, user_type);

        let order: Vec<NodeId> = mgr.scan_all(index_id).collect();
        assert_eq!(order, vec![alice, bob]);

        let old = Value::String("Bob".into());
        store.set_property(bob, name_prop, Value::String("Aaron".into()));
        mgr.on_update(&schema, store.view(), bob, user_type, name_prop, &old);
        let order: Vec<NodeId> = mgr.scan_all(index_id).collect();
        assert_eq!(order, vec![bob, alice], "Aaron sorts before Alice");

        mgr.on_delete(&schema, store.view(), alice, user_type);
        let order: Vec<NodeId> = mgr.scan_all(index_id).collect();
        assert_eq!(order, vec![bob]);
    }

    #[test]
    fn selection_prefers_longer_equality_prefix() {
        let mut b = Schema::builder();
        let stack = b.add_type("Stack").unwrap();
        let ts = b.add_property(stack, "ts", ValueKind::Int).unwrap();
        let thread = b.add_type("Thread").unwrap();
        let (edge, _reverse) = b.add_edge(stack, "thread", thread, "stacks").unwrap();
        let wide = b
            .add_index(stack, vec![IndexField::Property { property: ts, desc: false }])
            .unwrap();
        let narrow = b
            .add_index(
                stack,
                vec![IndexField::Edge { edge }, IndexField::Property { property: ts, desc: true }],
            )
            .unwrap();
        let schema = b.finish().unwrap();

        let req = SelectionRequest {
            edge_prefix: Some(edge),
            equality: &[],
            range: &[],
            sorts: &[SortKey { property: ts, desc: true }],
        };
        let coverage = IndexManager::select(&schema, stack, &req).unwrap();
        assert_eq!(coverage.index_id, narrow);
        assert_ne!(coverage.index_id, wide);
    }

    #[test]
    fn edge_prefixed_index_requires_link_before_entry_exists() {
        let mut b = Schema::builder();
        let stack = b.add_type("Stack").unwrap();
        let ts = b.add_property(stack, "ts", ValueKind::Int).unwrap();
        let thread = b.add_type("Thread").unwrap();
        let (edge, reverse) = b.add_edge(stack, "thread", thread, "stacks").unwrap();
        let index = b
            .add_index(stack, vec![IndexField::Edge { edge }, IndexField::Property { property: ts, desc: true }])
            .unwrap();
        let schema = b.finish().unwrap();

        let mut store = NodeStore::new();
        let mut mgr = IndexManager::new(1);
        let t1 = store.insert(thread);
        let s1 = store.insert(stack);
        store.set_property(s1, ts, Value::Int(10));
        mgr.on_insert(&schema, store.view(), s1, stack);
        assert_eq!(mgr.total_count(index), 0, "no edge target yet");

        store.link(s1, edge, t1);
        store.link(t1, reverse, s1);
        mgr.on_link(&schema, store.view(), s1, stack, edge, t1);
        assert_eq!(mgr.total_count(index), 1);

        store.unlink(s1, edge, t1);
        store.unlink(t1, reverse, s1);
        mgr.on_unlink(&schema, store.view(), s1, stack, edge, t1);
        assert_eq!(mgr.total_count(index), 0);
    }
}
