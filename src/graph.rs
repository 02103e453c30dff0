// SPDX-License-Identifier: Apache-2.0
//! The public façade (§6 Host API): wires the node store, schema, index
//! manager, rollup cache, and reactive query engine behind one mutation
//! surface, returning a [`MutationOutcome`] from every write the way
//! `warp-core`'s engine returns a `TickReceipt` instead of logging (§10.3).

use rustc_hash::{FxHashMap, FxHashSet};

use crate::change_tracker::{ChangeTracker, NodeEvent, QueryEventKind, QueryHandle, SubscriptionHandle};
use crate::error::{GraphError, GraphResult, QueryError, SchemaError};
use crate::ids::{EdgeId, NodeId, TypeId};
use crate::index::IndexManager;
use crate::node_store::{NodeStore, NodeStoreView};
use crate::query::{compile, CompiledQuery, Event, Item, QueryDef, QueryView};
use crate::rollup::RollupCache;
use crate::schema::Schema;
use crate::value::{Value, ValueKind};

/// Per-mutation diagnostics (§10.3): which node the call concerned, which
/// query views were refreshed and what they emitted, and any per-node
/// callback panics captured along the way.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// The node the call concerned (e.g. the newly allocated id for
    /// [`Graph::insert`]).
    pub node_id: NodeId,
    /// Events dispatched to each query view this mutation affected.
    pub query_events: FxHashMap<QueryHandle, Vec<Event>>,
    /// Panic messages captured from per-node callbacks ([`Graph::on`]),
    /// isolated per §7 "callback failures ... do not abort dispatch".
    pub callback_failures: Vec<String>,
}

/// A read-only view of one node, borrowing the graph's schema and store
/// (§6 `Graph.get`).
#[derive(Debug, Clone, Copy)]
pub struct NodeHandle<'a> {
    schema: &'a Schema,
    store: NodeStoreView<'a>,
    id: NodeId,
    type_id: TypeId,
}

impl<'a> NodeHandle<'a> {
    /// This node's id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// This node's declared type name.
    #[must_use]
    pub fn type_name(&self) -> &'a str {
        self.schema.type_name(self.type_id).unwrap_or_default()
    }

    /// Reads property `name`, or `None` if it is not declared on this
    /// node's type.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&'a Value> {
        let property_id = self.schema.property_id(self.type_id, name)?;
        self.store.get_property(self.id, property_id)
    }

    /// Reads rollup `name`, or `None` if it is not declared on this node's
    /// type or has not been computed yet.
    #[must_use]
    pub fn rollup(&self, name: &str) -> Option<&'a Value> {
        let rollup_id = self.schema.rollups_of(self.type_id).iter().copied().find(|&r| self.schema.rollup_name(r) == Some(name))?;
        self.store.rollup(self.id, rollup_id)
    }

    /// Reads the ordered targets of edge `name`.
    pub fn edges(&self, name: &str) -> GraphResult<&'a [NodeId]> {
        let edge_id = self
            .schema
            .edge_id(self.type_id, name)
            .ok_or_else(|| GraphError::unknown_edge(self.type_name(), name))?;
        Ok(self.store.edge_targets(self.id, edge_id))
    }
}

fn write_property(schema: &Schema, store: &mut NodeStore, id: NodeId, type_id: TypeId, name: &str, value: Value) -> GraphResult<()> {
    let property_id = schema.property_id(type_id, name).ok_or_else(|| {
        GraphError::Schema(SchemaError::UnknownProperty {
            type_name: schema.type_name(type_id).unwrap_or_default().to_owned(),
            property: name.to_owned(),
        })
    })?;
    let expected = schema.property_kind(property_id).unwrap_or(ValueKind::String);
    if !value.matches_kind(expected) {
        return Err(GraphError::Schema(SchemaError::TypeMismatch {
            property: name.to_owned(),
            expected,
            found: value.kind().unwrap_or(expected),
        }));
    }
    store.set_property(id, property_id, value);
    Ok(())
}

/// Owns the node store, schema, indexes, rollups, and every live query
/// view, and is the only type through which the graph is mutated (§6).
#[derive(Debug)]
pub struct Graph {
    schema: Option<Schema>,
    store: NodeStore,
    indexes: Option<IndexManager>,
    rollups: RollupCache,
    tracker: ChangeTracker,
    queries: FxHashMap<QueryHandle, QueryView>,
    mutated: bool,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Graph {
    /// Creates a graph, optionally with its schema already finalized. If
    /// `schema` is `None`, call [`Self::set_schema`] before the first
    /// insert (§6 `Graph.schema(s)`).
    #[must_use]
    pub fn new(schema: Option<Schema>) -> Self {
        let indexes = schema.as_ref().map(|s| IndexManager::new(s.index_count()));
        Self {
            schema,
            store: NodeStore::new(),
            indexes,
            rollups: RollupCache::new(),
            tracker: ChangeTracker::new(),
            queries: FxHashMap::default(),
            mutated: false,
        }
    }

    /// The graph's schema, if set.
    #[must_use]
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Finalizes the graph's schema. Only valid before the first insert
    /// (§6).
    pub fn set_schema(&mut self, schema: Schema) -> GraphResult<()> {
        if self.mutated {
            return Err(GraphError::SchemaAlreadyFinalized);
        }
        self.indexes = Some(IndexManager::new(schema.index_count()));
        self.schema = Some(schema);
        Ok(())
    }

    fn node_type(&self, id: NodeId) -> GraphResult<TypeId> {
        self.store.type_of(id).ok_or(GraphError::NotFound(id))
    }

    /// Inserts a node of `type_name` with `props`, returning the new id in
    /// the outcome.
    pub fn insert(&mut self, type_name: &str, props: &[(&str, Value)]) -> GraphResult<MutationOutcome> {
        let Self { schema, store, indexes, rollups, mutated, .. } = self;
        let (Some(schema), Some(indexes)) = (schema.as_ref(), indexes.as_mut()) else {
            return Err(GraphError::SchemaAlreadyFinalized);
        };
        let type_id = schema.type_id(type_name).ok_or_else(|| GraphError::Schema(SchemaError::UnknownType(type_name.to_owned())))?;

        *mutated = true;
        let id = store.insert(type_id);
        for &(name, ref value) in props {
            write_property(schema, store, id, type_id, name, value.clone())?;
        }
        indexes.on_insert(schema, store.view(), id, type_id);
        rollups.recompute_all(schema, store, indexes, id, type_id);

        let mut changed = FxHashSet::default();
        changed.insert(id);
        let query_events = self.refresh_affected(&[type_id].into_iter().collect(), &changed);
        Ok(MutationOutcome { node_id: id, query_events, callback_failures: Vec::new() })
    }

    /// Returns a read-only handle to `id`, or `None` if it does not exist.
    pub fn get(&self, id: NodeId) -> GraphResult<Option<NodeHandle<'_>>> {
        let schema = self.schema.as_ref().ok_or(GraphError::SchemaAlreadyFinalized)?;
        let Some(type_id) = self.store.type_of(id) else { return Ok(None) };
        Ok(Some(NodeHandle { schema, store: self.store.view(), id, type_id }))
    }

    /// Writes `props` onto `id`, recomputing any index entries, dependent
    /// rollups, and watching query views.
    pub fn update(&mut self, id: NodeId, props: &[(&str, Value)]) -> GraphResult<MutationOutcome> {
        let type_id = self.node_type(id)?;
        let Self { schema, store, indexes, rollups, tracker, mutated, .. } = self;
        let (Some(schema), Some(indexes)) = (schema.as_ref(), indexes.as_mut()) else {
            return Err(GraphError::SchemaAlreadyFinalized);
        };
        *mutated = true;

        let mut changed = FxHashSet::default();
        changed.insert(id);
        let mut affected_types: FxHashSet<TypeId> = [type_id].into_iter().collect();

        for &(name, ref value) in props {
            let property_id = schema.property_id(type_id, name).ok_or_else(|| {
                GraphError::Schema(SchemaError::UnknownProperty {
                    type_name: schema.type_name(type_id).unwrap_or_default().to_owned(),
                    property: name.to_owned(),
                })
            })?;
            let old_value = store.property(id, property_id).cloned().unwrap_or(Value::Null);
            write_property(schema, store, id, type_id, name, value.clone())?;
            indexes.on_update(schema, store.view(), id, type_id, property_id, &old_value);

            for (source_type, edge) in schema.traverse_edges().collect::<Vec<_>>() {
                let affected = rollups.recompute_dependents(schema, store, indexes, source_type, edge, id);
                if !affected.is_empty() {
                    affected_types.insert(source_type);
                    changed.extend(affected);
                }
            }
        }

        let callback_failures = tracker.dispatch(id, NodeEvent::Change);
        let query_events = self.refresh_affected(&affected_types, &changed);
        Ok(MutationOutcome { node_id: id, query_events, callback_failures })
    }

    /// Deletes `id`, cascading unlinks to every node that referenced it
    /// (§3 Lifecycle) and dropping its rollup dependency bookkeeping.
    pub fn delete(&mut self, id: NodeId) -> GraphResult<MutationOutcome> {
        let type_id = self.node_type(id)?;
        let Self { schema, store, indexes, rollups, tracker, mutated, .. } = self;
        let (Some(schema), Some(indexes)) = (schema.as_ref(), indexes.as_mut()) else {
            return Err(GraphError::SchemaAlreadyFinalized);
        };
        *mutated = true;

        indexes.on_delete(schema, store.view(), id, type_id);
        rollups.remove_node(id);

        let Some((_, edges)) = store.delete(id) else {
            return Err(GraphError::NotFound(id));
        };

        let mut affected_types: FxHashSet<TypeId> = [type_id].into_iter().collect();
        for (edge, targets) in edges {
            let Some(reverse) = schema.reverse_edge(edge) else { continue };
            for target in targets {
                let Some(target_type) = store.type_of(target) else { continue };
                if store.unlink(target, reverse, id) {
                    indexes.on_unlink(schema, store.view(), target, target_type, reverse, id);
                    rollups.recompute_for_edge(schema, store, indexes, target, target_type, reverse, Some(id));
                    affected_types.insert(target_type);
                }
            }
        }

        let callback_failures = tracker.dispatch(id, NodeEvent::Delete);
        tracker.off(id, None);
        let query_events = self.refresh_affected(&affected_types, &FxHashSet::default());
        Ok(MutationOutcome { node_id: id, query_events, callback_failures })
    }

    fn link_unlink(&mut self, src: NodeId, edge_name: &str, tgt: NodeId, link: bool) -> GraphResult<MutationOutcome> {
        let src_type = self.node_type(src)?;
        let tgt_type = self.node_type(tgt)?;

        let Self { schema, store, indexes, rollups, tracker, mutated, .. } = self;
        let (Some(schema), Some(indexes)) = (schema.as_ref(), indexes.as_mut()) else {
            return Err(GraphError::SchemaAlreadyFinalized);
        };

        let edge = schema
            .edge_id(src_type, edge_name)
            .ok_or_else(|| GraphError::unknown_edge(schema.type_name(src_type).unwrap_or_default(), edge_name))?;
        let target_type = schema
            .edge_target(edge)
            .ok_or_else(|| GraphError::unknown_edge(schema.type_name(src_type).unwrap_or_default(), edge_name))?;
        if target_type != tgt_type {
            return Err(GraphError::unknown_edge(schema.type_name(src_type).unwrap_or_default(), edge_name));
        }
        let reverse = schema
            .reverse_edge(edge)
            .ok_or_else(|| GraphError::unknown_edge(schema.type_name(src_type).unwrap_or_default(), edge_name))?;
        *mutated = true;

        let previous_src_target = store.edge_targets(src, edge).first().copied();
        let previous_tgt_target = store.edge_targets(tgt, reverse).first().copied();

        let changed = if link {
            let a = store.link(src, edge, tgt);
            let b = store.link(tgt, reverse, src);
            a || b
        } else {
            let a = store.unlink(src, edge, tgt);
            let b = store.unlink(tgt, reverse, src);
            a || b
        };

        let mut affected_types: FxHashSet<TypeId> = FxHashSet::default();
        let mut touched = FxHashSet::default();
        touched.insert(src);
        touched.insert(tgt);

        if changed {
            let node_event = if link { NodeEvent::Link } else { NodeEvent::Unlink };
            if link {
                indexes.on_link(schema, store.view(), src, src_type, edge, tgt);
                indexes.on_link(schema, store.view(), tgt, tgt_type, reverse, src);
            } else {
                indexes.on_unlink(schema, store.view(), src, src_type, edge, tgt);
                indexes.on_unlink(schema, store.view(), tgt, tgt_type, reverse, src);
            }
            rollups.recompute_for_edge(schema, store, indexes, src, src_type, edge, previous_src_target);
            rollups.recompute_for_edge(schema, store, indexes, tgt, tgt_type, reverse, previous_tgt_target);
            affected_types.insert(src_type);
            affected_types.insert(tgt_type);
            tracker.dispatch(src, node_event);
            tracker.dispatch(tgt, node_event);
        }

        let query_events = self.refresh_affected(&affected_types, &touched);
        Ok(MutationOutcome { node_id: src, query_events, callback_failures: Vec::new() })
    }

    /// Links `src` to `tgt` via `edge_name`, and its declared reverse from
    /// `tgt` back to `src`. A no-op if already linked.
    pub fn link(&mut self, src: NodeId, edge_name: &str, tgt: NodeId) -> GraphResult<MutationOutcome> {
        self.link_unlink(src, edge_name, tgt, true)
    }

    /// Removes the link from `src` to `tgt` via `edge_name`, and its
    /// reverse. A no-op if not linked.
    pub fn unlink(&mut self, src: NodeId, edge_name: &str, tgt: NodeId) -> GraphResult<MutationOutcome> {
        self.link_unlink(src, edge_name, tgt, false)
    }

    /// Reads the ordered targets of `edge_name` on `id`.
    pub fn edges(&self, id: NodeId, edge_name: &str) -> GraphResult<&[NodeId]> {
        let type_id = self.node_type(id)?;
        let schema = self.schema.as_ref().ok_or(GraphError::SchemaAlreadyFinalized)?;
        let edge = schema
            .edge_id(type_id, edge_name)
            .ok_or_else(|| GraphError::unknown_edge(schema.type_name(type_id).unwrap_or_default(), edge_name))?;
        Ok(self.store.edge_targets(id, edge))
    }

    /// Returns `true` if `src.edge_name` already contains `tgt`.
    pub fn has_edge(&self, src: NodeId, edge_name: &str, tgt: NodeId) -> GraphResult<bool> {
        Ok(self.edges(src, edge_name)?.contains(&tgt))
    }

    /// Subscribes `callback` to `event` on `id` (§6 `Graph.on`).
    pub fn on(&mut self, id: NodeId, event: NodeEvent, callback: impl FnMut(NodeId, NodeEvent) + 'static) -> SubscriptionHandle {
        self.tracker.on(id, event, callback)
    }

    /// Unsubscribes a single handle returned by [`Self::on`].
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.tracker.unsubscribe(handle);
    }

    /// Removes every subscription on `id`, optionally restricted to one
    /// `event` kind (§6 `Graph.off`).
    pub fn off(&mut self, id: NodeId, event: Option<NodeEvent>) {
        self.tracker.off(id, event);
    }

    /// Compiles `def`, materializes its initial state, and registers it for
    /// type-level mutation routing (§6 `Graph.query`).
    pub fn query(&mut self, def: &QueryDef) -> GraphResult<QueryHandle> {
        let (Some(schema), Some(indexes)) = (self.schema.as_ref(), self.indexes.as_ref()) else {
            return Err(GraphError::SchemaAlreadyFinalized);
        };
        let compiled: CompiledQuery = compile(schema, def).map_err(QueryError::Validation)?;
        let watched = compiled.watched_types();
        let mut view = QueryView::new(compiled);
        view.refresh(self.store.view(), indexes, &FxHashSet::default());
        let handle = self.tracker.alloc_query_handle();
        self.tracker.register_query(handle, watched);
        self.queries.insert(handle, view);
        Ok(handle)
    }

    fn view(&self, handle: QueryHandle) -> GraphResult<&QueryView> {
        self.queries.get(&handle).ok_or(GraphError::UnknownQuery)
    }

    fn view_mut(&mut self, handle: QueryHandle) -> GraphResult<&mut QueryView> {
        self.queries.get_mut(&handle).ok_or(GraphError::UnknownQuery)
    }

    /// The viewport's current slice of materialized items.
    pub fn query_items(&self, handle: QueryHandle) -> GraphResult<&[Item]> {
        Ok(self.view(handle)?.items())
    }

    /// Total logical item count for this query, independent of viewport.
    pub fn query_total(&self, handle: QueryHandle) -> GraphResult<usize> {
        Ok(self.view(handle)?.total())
    }

    /// The viewport's current absolute offset.
    pub fn query_offset(&self, handle: QueryHandle) -> GraphResult<usize> {
        Ok(self.view(handle)?.offset())
    }

    /// Sets the viewport size.
    pub fn query_set_limit(&mut self, handle: QueryHandle, limit: usize) -> GraphResult<()> {
        self.view_mut(handle)?.set_limit(limit);
        Ok(())
    }

    /// Moves the viewport to an absolute offset.
    pub fn query_scroll_to(&mut self, handle: QueryHandle, offset: usize) -> GraphResult<()> {
        self.view_mut(handle)?.scroll_to(offset);
        Ok(())
    }

    /// Moves the viewport by a relative offset, clamped at zero.
    pub fn query_scroll_by(&mut self, handle: QueryHandle, delta: i64) -> GraphResult<()> {
        self.view_mut(handle)?.scroll_by(delta);
        Ok(())
    }

    /// Expands `edge_name` on `node` within `handle`'s view, dispatching the
    /// resulting events to any [`Self::query_on`] subscribers.
    pub fn query_expand(&mut self, handle: QueryHandle, node: NodeId, edge_name: &str) -> GraphResult<Vec<Event>> {
        let Self { schema, store, indexes, queries, tracker, .. } = self;
        let (Some(schema), Some(indexes)) = (schema.as_ref(), indexes.as_ref()) else {
            return Err(GraphError::SchemaAlreadyFinalized);
        };
        let view = queries.get_mut(&handle).ok_or(GraphError::UnknownQuery)?;
        let events = view.expand(schema, store.view(), indexes, node, edge_name).map_err(QueryError::Expansion)?;
        tracker.dispatch_query(handle, &events);
        Ok(events)
    }

    /// Collapses `edge_name` on `node` within `handle`'s view.
    pub fn query_collapse(&mut self, handle: QueryHandle, node: NodeId, edge_name: &str) -> GraphResult<Vec<Event>> {
        let Self { schema, store, indexes, queries, tracker, .. } = self;
        let (Some(schema), Some(indexes)) = (schema.as_ref(), indexes.as_ref()) else {
            return Err(GraphError::SchemaAlreadyFinalized);
        };
        let view = queries.get_mut(&handle).ok_or(GraphError::UnknownQuery)?;
        let events = view.collapse(schema, store.view(), indexes, node, edge_name).map_err(QueryError::Expansion)?;
        tracker.dispatch_query(handle, &events);
        Ok(events)
    }

    /// Flips the current expansion state of `edge_name` on `node`.
    pub fn query_toggle(&mut self, handle: QueryHandle, node: NodeId, edge_name: &str) -> GraphResult<Vec<Event>> {
        let Self { schema, store, indexes, queries, tracker, .. } = self;
        let (Some(schema), Some(indexes)) = (schema.as_ref(), indexes.as_ref()) else {
            return Err(GraphError::SchemaAlreadyFinalized);
        };
        let view = queries.get_mut(&handle).ok_or(GraphError::UnknownQuery)?;
        let events = view.toggle(schema, store.view(), indexes, node, edge_name).map_err(QueryError::Expansion)?;
        tracker.dispatch_query(handle, &events);
        Ok(events)
    }

    /// Returns whether `edge_name` is currently expanded on `node`.
    pub fn query_is_expanded(&self, handle: QueryHandle, node: NodeId, edge_name: &str) -> GraphResult<bool> {
        let schema = self.schema.as_ref().ok_or(GraphError::SchemaAlreadyFinalized)?;
        Ok(self.view(handle)?.is_expanded(node, edge_name, schema).map_err(QueryError::Expansion)?)
    }

    /// Expands every edge selection reachable within `depth` levels (or the
    /// safety bound if `None`).
    pub fn query_expand_all(&mut self, handle: QueryHandle, depth: Option<usize>) -> GraphResult<Vec<Event>> {
        let Self { store, indexes, queries, tracker, .. } = self;
        let Some(indexes) = indexes.as_ref() else {
            return Err(GraphError::SchemaAlreadyFinalized);
        };
        let view = queries.get_mut(&handle).ok_or(GraphError::UnknownQuery)?;
        let events = view.expand_all(store.view(), indexes, depth);
        tracker.dispatch_query(handle, &events);
        Ok(events)
    }

    /// Collapses every currently-expanded edge selection.
    pub fn query_collapse_all(&mut self, handle: QueryHandle) -> GraphResult<Vec<Event>> {
        let Self { store, indexes, queries, tracker, .. } = self;
        let Some(indexes) = indexes.as_ref() else {
            return Err(GraphError::SchemaAlreadyFinalized);
        };
        let view = queries.get_mut(&handle).ok_or(GraphError::UnknownQuery)?;
        let events = view.collapse_all(store.view(), indexes);
        tracker.dispatch_query(handle, &events);
        Ok(events)
    }

    /// Subscribes `callback` to `kind` events on `handle` (§6 `Query.on`).
    pub fn query_on(&mut self, handle: QueryHandle, kind: QueryEventKind, callback: impl FnMut(&Event) + 'static) -> GraphResult<SubscriptionHandle> {
        if !self.queries.contains_key(&handle) {
            return Err(GraphError::UnknownQuery);
        }
        Ok(self.tracker.on_query(handle, kind, callback))
    }

    /// Removes event subscriptions on `handle`, optionally restricted to
    /// one `kind` (§6 `Query.off`).
    pub fn query_off(&mut self, handle: QueryHandle, kind: Option<QueryEventKind>) {
        self.tracker.off_query(handle, kind);
    }

    /// Destroys `handle`, releasing its subscriptions (§5, §6
    /// `Query.destroy`).
    pub fn query_destroy(&mut self, handle: QueryHandle) -> GraphResult<()> {
        self.queries.remove(&handle).ok_or(GraphError::UnknownQuery)?;
        self.tracker.unregister_query(handle);
        Ok(())
    }

    /// Refreshes every query watching one of `type_ids`, merging the
    /// resulting event lists and dispatching them to `query_on` subscribers.
    /// `changed` names nodes whose displayed fields were written this
    /// mutation, for [`Event::Change`] detection.
    fn refresh_affected(&mut self, type_ids: &FxHashSet<TypeId>, changed: &FxHashSet<NodeId>) -> FxHashMap<QueryHandle, Vec<Event>> {
        let Self { store, indexes, queries, tracker, .. } = self;
        let Some(indexes) = indexes.as_ref() else { return FxHashMap::default() };
        let mut handles = FxHashSet::default();
        for &type_id in type_ids {
            handles.extend(tracker.queries_watching(type_id));
        }
        let mut out = FxHashMap::default();
        for handle in handles {
            if let Some(view) = queries.get_mut(&handle) {
                let events = view.refresh(store.view(), indexes, changed);
                if !events.is_empty() {
                    tracker.dispatch_query(handle, &events);
                    out.insert(handle, events);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::schema::{IndexField, RollupDef};

    fn user_schema() -> Schema {
        let mut b = Schema::builder();
        let user = b.add_type("User").unwrap();
        let name = b.add_property(user, "name", ValueKind::String).unwrap();
        b.add_index(user, vec![IndexField::Property { property: name, desc: false }]).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let mut graph = Graph::new(Some(user_schema()));
        let outcome = graph.insert("User", &[("name", Value::String("Bob".into()))]).unwrap();
        let node = graph.get(outcome.node_id).unwrap().unwrap();
        assert_eq!(node.property("name"), Some(&Value::String("Bob".into())));
    }

    #[test]
    fn set_schema_after_first_insert_is_rejected() {
        let mut graph = Graph::new(Some(user_schema()));
        graph.insert("User", &[]).unwrap();
        assert_eq!(graph.set_schema(user_schema()), Err(GraphError::SchemaAlreadyFinalized));
    }

    #[test]
    fn query_sees_insert_as_enter_and_update_as_move() {
        let mut graph = Graph::new(Some(user_schema()));
        let def = QueryDef {
            root: "User".to_owned(),
            sorts: vec![crate::query::Sort { field: "name".to_owned(), desc: false }],
            ..QueryDef::default()
        };
        let handle = graph.query(&def).unwrap();
        assert_eq!(graph.query_total(handle).unwrap(), 0);

        let bob = graph.insert("User", &[("name", Value::String("Bob".into()))]).unwrap();
        let events = bob.query_events.get(&handle).cloned().unwrap_or_default();
        assert!(matches!(events.as_slice(), [Event::Enter { .. }]));

        let renamed = graph.update(bob.node_id, &[("name", Value::String("Aaron".into()))]).unwrap();
        let events = renamed.query_events.get(&handle).cloned().unwrap_or_default();
        assert!(events.iter().any(|e| matches!(e, Event::Change { .. })));
    }

    #[test]
    fn link_updates_count_rollup_and_dispatches_query_change() {
        let mut b = Schema::builder();
        let parent = b.add_type("Parent").unwrap();
        let child = b.add_type("Child").unwrap();
        let (children, _) = b.add_edge(parent, "children", child, "parent").unwrap();
        b.add_rollup(parent, "count", RollupDef::Count { edge: children }).unwrap();
        let id = b.add_property(parent, "id", ValueKind::Int).unwrap();
        b.add_index(parent, vec![IndexField::Property { property: id, desc: false }]).unwrap();
        let schema = b.finish().unwrap();

        let mut graph = Graph::new(Some(schema));
        let def = QueryDef { root: "Parent".to_owned(), ..QueryDef::default() };
        let handle = graph.query(&def).unwrap();

        let p = graph.insert("Parent", &[("id", Value::Int(1))]).unwrap().node_id;
        let c = graph.insert("Child", &[]).unwrap().node_id;
        let outcome = graph.link(p, "children", c).unwrap();
        let node = graph.get(p).unwrap().unwrap();
        assert_eq!(node.rollup("count"), Some(&Value::Int(1)));
        assert!(outcome.query_events.get(&handle).is_some_and(|evs| evs.iter().any(|e| matches!(e, Event::Change { .. }))));
    }

    #[test]
    fn delete_cascades_unlink_and_is_idempotent_on_reinsert() {
        let mut b = Schema::builder();
        let parent = b.add_type("Parent").unwrap();
        let child = b.add_type("Child").unwrap();
        let (children, _parent_edge) = b.add_edge(parent, "children", child, "parent").unwrap();
        let _ = children;
        let schema = b.finish().unwrap();

        let mut graph = Graph::new(Some(schema));
        let p = graph.insert("Parent", &[]).unwrap().node_id;
        let c = graph.insert("Child", &[]).unwrap().node_id;
        graph.link(p, "children", c).unwrap();
        graph.delete(p).unwrap();
        assert!(!graph.has_edge(c, "parent", p).unwrap_or(true));
        assert!(graph.get(p).unwrap().is_none());
    }

    #[test]
    fn unknown_query_handle_is_rejected() {
        let mut graph = Graph::new(Some(user_schema()));
        let def = QueryDef { root: "User".to_owned(), ..QueryDef::default() };
        let handle = graph.query(&def).unwrap();
        graph.query_destroy(handle).unwrap();
        assert_eq!(graph.query_items(handle).unwrap_err(), GraphError::UnknownQuery);
    }
}
