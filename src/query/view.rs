// SPDX-License-Identifier: Apache-2.0
//! Materialized, expandable, viewport-bounded query views (§4.4).
//!
//! Root-level candidates come from the index chosen at compile time; every
//! nested level reads its candidates directly off the node store's edge
//! adjacency list, then applies the level's filters and sort locally. This
//! trades the edge-prefixed-scan path §4.1/§4.2 describe for nested levels
//! in exchange for materialization code that does not need to reconstruct
//! index keys; fan-out per level is bounded by the viewport's own use, so
//! the asymptotic cost this gives up is bounded in practice. Recursive edge
//! selections are represented by reapplying the same `&CompiledEdgeSel`
//! across an `active_recursive` list threaded through the walk, rather than
//! by a cyclic owned tree.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::constants::{DEFAULT_VIEWPORT_LIMIT, MAX_EXPAND_ALL_DEPTH};
use crate::error::ExpansionError;
use crate::ids::{EdgeId, NodeId, TypeId};
use crate::index::IndexManager;
use crate::node_store::NodeStoreView;
use crate::query::compile::{CompiledEdgeSel, CompiledLevel, CompiledQuery};
use crate::query::events::{diff_materialization, Event};
use crate::schema::Schema;
use crate::value::Value;

/// One visible row of a materialized view (§4.4 "Materialized view state").
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// The node this item represents.
    pub id: NodeId,
    /// Its type.
    pub type_id: TypeId,
    /// Depth from the root; virtual levels do not increment depth.
    pub depth: usize,
    /// `(edge, node_id)` steps from the root down to this item's parent,
    /// including virtual (unemitted) ancestors.
    pub path: Vec<(EdgeId, NodeId)>,
    /// Adjacent graph parent, which may itself be a virtual (unemitted)
    /// node.
    pub parent_id: Option<NodeId>,
    /// The edge used to reach this item from `parent_id`.
    pub edge_from_parent: Option<EdgeId>,
    /// `true` if at least one of this item's edge selections currently has
    /// a non-empty, filter-passing target set.
    pub has_children: bool,
    /// `true` if at least one of this item's edge selections is currently
    /// expanded.
    pub expanded: bool,
    /// Values of this item's declared sort fields, in sort order.
    pub sort_key: Vec<Value>,
    edge_options: Vec<(EdgeId, bool)>,
}

#[derive(Debug, Default)]
struct ExpansionState {
    overrides: FxHashMap<(NodeId, EdgeId), bool>,
}

impl ExpansionState {
    fn is_expanded(&self, node: NodeId, edge: EdgeId, default: bool) -> bool {
        self.overrides.get(&(node, edge)).copied().unwrap_or(default)
    }

    fn set(&mut self, node: NodeId, edge: EdgeId, expanded: bool) {
        self.overrides.insert((node, edge), expanded);
    }
}

fn effective_edges<'c>(level: &'c CompiledLevel, active_recursive: &[&'c CompiledEdgeSel]) -> Vec<&'c CompiledEdgeSel> {
    let mut out: Vec<&CompiledEdgeSel> = level.edges.iter().collect();
    for &r in active_recursive {
        if r.level.type_id == level.type_id && !out.iter().any(|e| e.edge == r.edge) {
            out.push(r);
        }
    }
    out
}

fn sort_nodes(nodes: &mut [NodeId], sorts: &[crate::index::SortKey], store: NodeStoreView<'_>) {
    nodes.sort_by(|&a, &b| {
        for sort in sorts {
            let va = store.get_property(a, sort.property).cloned().unwrap_or(Value::Null);
            let vb = store.get_property(b, sort.property).cloned().unwrap_or(Value::Null);
            let ord = va.cmp(&vb);
            let ord = if sort.desc { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        a.cmp(&b)
    });
}

fn sort_key_of(level: &CompiledLevel, node: NodeId, store: NodeStoreView<'_>) -> Vec<Value> {
    level.sorts.iter().map(|s| store.get_property(node, s.property).cloned().unwrap_or(Value::Null)).collect()
}

fn gather_children(edge_sel: &CompiledEdgeSel, node: NodeId, store: NodeStoreView<'_>) -> Vec<NodeId> {
    let mut kids: Vec<NodeId> = store
        .edge_targets(node, edge_sel.edge)
        .iter()
        .copied()
        .filter(|&c| edge_sel.level.filters.iter().all(|f| f.matches(&store.get_property(c, f.property).cloned().unwrap_or(Value::Null))))
        .collect();
    sort_nodes(&mut kids, &edge_sel.level.sorts, store);
    kids
}

#[allow(clippy::too_many_arguments)]
fn walk_node<'c>(
    node: NodeId,
    level: &'c CompiledLevel,
    store: NodeStoreView<'_>,
    expansion: &ExpansionState,
    path: &[(EdgeId, NodeId)],
    parent_id: Option<NodeId>,
    edge_from_parent: Option<EdgeId>,
    depth: usize,
    active_recursive: Vec<&'c CompiledEdgeSel>,
    items: &mut Vec<Item>,
) {
    let edges = effective_edges(level, &active_recursive);

    if level.virtual_ {
        for edge_sel in &edges {
            let kids = gather_children(edge_sel, node, store);
            if kids.is_empty() {
                continue;
            }
            let mut next_active = active_recursive.clone();
            if edge_sel.recursive {
                next_active.push(edge_sel);
            }
            let child_path: Vec<(EdgeId, NodeId)> = path.iter().copied().chain(std::iter::once((edge_sel.edge, node))).collect();
            for kid in kids {
                walk_node(kid, &edge_sel.level, store, expansion, &child_path, parent_id, edge_from_parent, depth, next_active.clone(), items);
            }
        }
        return;
    }

    let edge_options: Vec<(EdgeId, bool)> = edges.iter().map(|e| (e.edge, e.virtual_)).collect();
    let has_children = edges.iter().any(|e| !gather_children(e, node, store).is_empty());
    let expanded = edge_options.iter().any(|&(edge, default)| expansion.is_expanded(node, edge, default));

    items.push(Item {
        id: node,
        type_id: level.type_id,
        depth,
        path: path.to_vec(),
        parent_id,
        edge_from_parent,
        has_children,
        expanded,
        sort_key: sort_key_of(level, node, store),
        edge_options: edge_options.clone(),
    });

    for edge_sel in &edges {
        let default = edge_sel.virtual_;
        if !expansion.is_expanded(node, edge_sel.edge, default) {
            continue;
        }
        let kids = gather_children(edge_sel, node, store);
        if kids.is_empty() {
            continue;
        }
        let mut next_active = active_recursive.clone();
        if edge_sel.recursive {
            next_active.push(edge_sel);
        }
        let child_path: Vec<(EdgeId, NodeId)> = path.iter().copied().chain(std::iter::once((edge_sel.edge, node))).collect();
        for kid in kids {
            walk_node(kid, &edge_sel.level, store, expansion, &child_path, Some(node), Some(edge_sel.edge), depth + 1, next_active.clone(), items);
        }
    }
}

fn materialize(compiled: &CompiledQuery, store: NodeStoreView<'_>, indexes: &IndexManager, expansion: &ExpansionState) -> Vec<Item> {
    let mut candidates: Vec<NodeId> = if let Some(id) = compiled.id {
        if store.type_of(id) == Some(compiled.type_id) {
            vec![id]
        } else {
            vec![]
        }
    } else {
        match &compiled.root.coverage {
            Some(coverage) => indexes.scan_all(coverage.index_id).collect(),
            None => unreachable!("compile() requires root coverage when id is unset"),
        }
    };
    candidates.retain(|&n| compiled.root.filters.iter().all(|f| f.matches(&store.get_property(n, f.property).cloned().unwrap_or(Value::Null))));
    sort_nodes(&mut candidates, &compiled.root.sorts, store);

    let mut items = Vec::new();
    for node in candidates {
        walk_node(node, &compiled.root, store, expansion, &[], None, None, 0, Vec::new(), &mut items);
    }
    items
}

/// A compiled query bound to live expansion and viewport state (§4.4).
#[derive(Debug)]
pub struct QueryView {
    compiled: CompiledQuery,
    expansion: ExpansionState,
    offset: usize,
    limit: usize,
    items: Vec<Item>,
}

impl QueryView {
    /// Creates a view over `compiled` with no items materialized yet; call
    /// [`Self::refresh`] to populate it.
    #[must_use]
    pub fn new(compiled: CompiledQuery) -> Self {
        Self {
            compiled,
            expansion: ExpansionState::default(),
            offset: 0,
            limit: DEFAULT_VIEWPORT_LIMIT,
            items: Vec::new(),
        }
    }

    fn apply_and_diff(&mut self, store: NodeStoreView<'_>, indexes: &IndexManager, changed: &FxHashSet<NodeId>) -> Vec<Event> {
        let new_items = materialize(&self.compiled, store, indexes, &self.expansion);
        let old_ids: Vec<NodeId> = self.items.iter().map(|i| i.id).collect();
        let new_ids: Vec<NodeId> = new_items.iter().map(|i| i.id).collect();
        let events = diff_materialization(&old_ids, &new_ids, changed);
        self.items = new_items;
        events
    }

    /// Re-materializes against the current graph state, returning the
    /// ordered events since the last refresh. `changed` names nodes whose
    /// displayed fields were written since the previous refresh, so that
    /// still-visible, non-reordered items get a [`Event::Change`].
    pub fn refresh(&mut self, store: NodeStoreView<'_>, indexes: &IndexManager, changed: &FxHashSet<NodeId>) -> Vec<Event> {
        self.apply_and_diff(store, indexes, changed)
    }

    /// The current viewport slice.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        let start = self.offset.min(self.items.len());
        let end = (self.offset + self.limit).min(self.items.len());
        &self.items[start..end]
    }

    /// Total logical item count, independent of the viewport window.
    #[must_use]
    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// The viewport's current absolute offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Sets the viewport size.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Moves the viewport to an absolute offset.
    pub fn scroll_to(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Moves the viewport by a relative offset, clamped at zero.
    pub fn scroll_by(&mut self, delta: i64) {
        let current = i64::try_from(self.offset).unwrap_or(i64::MAX);
        self.offset = usize::try_from(current.saturating_add(delta)).unwrap_or(0);
    }

    fn find_edge(&self, node: NodeId, edge_name: &str, schema: &Schema) -> Result<(EdgeId, bool), ExpansionError> {
        let item = self.items.iter().find(|i| i.id == node).ok_or(ExpansionError::NodeNotVisible(node))?;
        let edge_id = schema.edge_id(item.type_id, edge_name);
        let option = edge_id.and_then(|e| item.edge_options.iter().find(|(edge, _)| *edge == e).copied());
        option.ok_or_else(|| ExpansionError::EdgeNotSelected { edge: edge_name.to_owned() })
    }

    /// Returns whether `edge_name` is currently expanded on `node`. Errors
    /// if `node` is not visible or the edge is not selected there.
    pub fn is_expanded(&self, node: NodeId, edge_name: &str, schema: &Schema) -> Result<bool, ExpansionError> {
        let (edge_id, default) = self.find_edge(node, edge_name, schema)?;
        Ok(self.expansion.is_expanded(node, edge_id, default))
    }

    /// Expands `edge_name` on `node`, materializing its children.
    pub fn expand(&mut self, schema: &Schema, store: NodeStoreView<'_>, indexes: &IndexManager, node: NodeId, edge_name: &str) -> Result<Vec<Event>, ExpansionError> {
        let (edge_id, _) = self.find_edge(node, edge_name, schema)?;
        self.expansion.set(node, edge_id, true);
        Ok(self.apply_and_diff(store, indexes, &FxHashSet::default()))
    }

    /// Collapses `edge_name` on `node`, removing its descendants.
    pub fn collapse(&mut self, schema: &Schema, store: NodeStoreView<'_>, indexes: &IndexManager, node: NodeId, edge_name: &str) -> Result<Vec<Event>, ExpansionError> {
        let (edge_id, _) = self.find_edge(node, edge_name, schema)?;
        self.expansion.set(node, edge_id, false);
        Ok(self.apply_and_diff(store, indexes, &FxHashSet::default()))
    }

    /// Flips the current expansion state of `edge_name` on `node`.
    pub fn toggle(&mut self, schema: &Schema, store: NodeStoreView<'_>, indexes: &IndexManager, node: NodeId, edge_name: &str) -> Result<Vec<Event>, ExpansionError> {
        let (edge_id, default) = self.find_edge(node, edge_name, schema)?;
        let current = self.expansion.is_expanded(node, edge_id, default);
        self.expansion.set(node, edge_id, !current);
        Ok(self.apply_and_diff(store, indexes, &FxHashSet::default()))
    }

    /// Expands every edge selection reachable within `depth` levels of the
    /// root (or up to [`MAX_EXPAND_ALL_DEPTH`] if unset, a safety bound
    /// since the underlying graph is not required to be acyclic).
    pub fn expand_all(&mut self, store: NodeStoreView<'_>, indexes: &IndexManager, depth: Option<usize>) -> Vec<Event> {
        let limit = depth.unwrap_or(MAX_EXPAND_ALL_DEPTH);
        let old_ids: Vec<NodeId> = self.items.iter().map(|i| i.id).collect();
        for _ in 0..limit {
            let before = self.items.len();
            let pending: Vec<(NodeId, EdgeId)> = self
                .items
                .iter()
                .filter(|item| depth.map_or(true, |d| item.depth < d))
                .flat_map(|item| item.edge_options.iter().map(move |&(edge, _)| (item.id, edge)))
                .collect();
            for (node, edge) in pending {
                self.expansion.set(node, edge, true);
            }
            let new_items = materialize(&self.compiled, store, indexes, &self.expansion);
            self.items = new_items;
            if self.items.len() == before {
                break;
            }
        }
        let new_ids: Vec<NodeId> = self.items.iter().map(|i| i.id).collect();
        diff_materialization(&old_ids, &new_ids, &FxHashSet::default())
    }

    /// Collapses every currently-expanded edge selection, returning the
    /// ordered leave events.
    pub fn collapse_all(&mut self, store: NodeStoreView<'_>, indexes: &IndexManager) -> Vec<Event> {
        let pending: Vec<(NodeId, EdgeId)> = self.items.iter().flat_map(|item| item.edge_options.iter().map(move |&(edge, _)| (item.id, edge))).collect();
        for (node, edge) in pending {
            self.expansion.set(node, edge, false);
        }
        self.apply_and_diff(store, indexes, &FxHashSet::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::node_store::NodeStore;
    use crate::query::compile::compile;
    use crate::query::def::{EdgeSel, QueryDef};
    use crate::schema::IndexField;
    use crate::value::ValueKind;

    fn scope_variable_schema() -> (Schema, crate::ids::PropertyId, EdgeId) {
        let mut b = Schema::builder();
        let scope = b.add_type("Scope").unwrap();
        let variable = b.add_type("Variable").unwrap();
        let name = b.add_property(variable, "name", ValueKind::String).unwrap();
        let id_prop = b.add_property(scope, "id", ValueKind::Int).unwrap();
        b.add_index(scope, vec![IndexField::Property { property: id_prop, desc: false }]).unwrap();
        let (variables, _) = b.add_edge(scope, "variables", variable, "scope").unwrap();
        b.add_index(variable, vec![IndexField::Edge { edge: variables }, IndexField::Property { property: name, desc: false }])
            .unwrap();
        let (children, _) = b.add_edge(variable, "children", variable, "parent").unwrap();
        b.add_index(variable, vec![IndexField::Edge { edge: children }, IndexField::Property { property: name, desc: false }])
            .unwrap();
        (b.finish().unwrap(), name, children)
    }

    #[test]
    fn recursive_edge_expands_depth_first_and_collapses_deepest_first() {
        let (schema, name, children) = scope_variable_schema();
        let scope_type = schema.type_id("Scope").unwrap();
        let variable_type = schema.type_id("Variable").unwrap();
        let variables_edge = schema.edge_id(scope_type, "variables").unwrap();

        let mut store = NodeStore::new();
        let indexes = IndexManager::new(3);

        let scope = store.insert(scope_type);
        let v1 = store.insert(variable_type);
        let v2 = store.insert(variable_type);
        let v3 = store.insert(variable_type);
        for (v, label) in [(v1, "v1"), (v2, "v2"), (v3, "v3")] {
            store.set_property(v, name, Value::String(label.into()));
        }
        store.link(scope, variables_edge, v1);
        store.link(v1, children, v2);
        store.link(v2, children, v3);

        let def = QueryDef {
            root: "Scope".to_owned(),
            edges: vec![EdgeSel {
                name: "variables".to_owned(),
                edges: vec![EdgeSel { name: "children".to_owned(), recursive: true, ..EdgeSel::default() }],
                ..EdgeSel::default()
            }],
            ..QueryDef::default()
        };
        let compiled = compile(&schema, &def).unwrap();
        let mut view = QueryView::new(compiled);
        view.refresh(store.view(), &indexes, &FxHashSet::default());
        assert_eq!(view.items().iter().map(|i| i.id).collect::<Vec<_>>(), vec![scope]);

        view.expand(&schema, store.view(), &indexes, scope, "variables").unwrap();
        assert_eq!(view.items().iter().map(|i| i.id).collect::<Vec<_>>(), vec![scope, v1]);

        view.expand(&schema, store.view(), &indexes, v1, "children").unwrap();
        view.expand(&schema, store.view(), &indexes, v2, "children").unwrap();
        let depths: Vec<usize> = view.items().iter().map(|i| i.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 3]);

        let events = view.collapse(&schema, store.view(), &indexes, v1, "children").unwrap();
        assert_eq!(
            events,
            vec![Event::Leave { node: v3, index: 3 }, Event::Leave { node: v2, index: 2 }]
        );
    }

    #[test]
    fn expand_on_invisible_node_is_rejected() {
        let (schema, _name, _children) = scope_variable_schema();
        let scope_type = schema.type_id("Scope").unwrap();
        let mut store = NodeStore::new();
        let indexes = IndexManager::new(3);
        let _scope = store.insert(scope_type);
        let def = QueryDef { root: "Scope".to_owned(), ..QueryDef::default() };
        let compiled = compile(&schema, &def).unwrap();
        let mut view = QueryView::new(compiled);
        view.refresh(store.view(), &indexes, &FxHashSet::default());
        let ghost = NodeId(999);
        let err = view.expand(&schema, store.view(), &indexes, ghost, "variables").unwrap_err();
        assert_eq!(err, ExpansionError::NodeNotVisible(ghost));
    }
}
