// SPDX-License-Identifier: Apache-2.0
//! Compiles a [`crate::query::def::QueryDef`] into a [`CompiledQuery`],
//! resolving names to ids and selecting a covering index per level (§4.4
//! "Validation").

use crate::error::QueryValidationError;
use crate::ids::{EdgeId, NodeId, PropertyId, TypeId};
use crate::index::{IndexCoverage, IndexManager, SelectionRequest, SortKey};
use crate::query::def::{EdgeSel, Filter, FilterOp, QueryDef, Sort};
use crate::schema::Schema;
use crate::value::Value;

/// A filter resolved against a concrete property.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    /// Property being filtered.
    pub property: PropertyId,
    /// Comparison operator.
    pub op: FilterOp,
    /// Value to compare against.
    pub value: Value,
}

impl CompiledFilter {
    /// Evaluates this filter against `actual` (§9: `null < any non-null`,
    /// via [`Value`]'s own total order).
    #[must_use]
    pub fn matches(&self, actual: &Value) -> bool {
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Ne => actual != &self.value,
            FilterOp::Lt => actual < &self.value,
            FilterOp::Le => actual <= &self.value,
            FilterOp::Gt => actual > &self.value,
            FilterOp::Ge => actual >= &self.value,
        }
    }
}

/// One level of a compiled query tree: a type, its resolved filters/sorts,
/// the index chosen to cover them, and its nested edge selections.
#[derive(Debug, Clone)]
pub struct CompiledLevel {
    /// Bound type.
    pub type_id: TypeId,
    /// `true` if this level's own nodes are transparent (never emitted).
    pub virtual_: bool,
    /// Resolved filters.
    pub filters: Vec<CompiledFilter>,
    /// Resolved sort order.
    pub sorts: Vec<SortKey>,
    /// The index chosen to scan this level, if a scan is needed (root
    /// levels reached via `id` do not scan and have no coverage).
    pub coverage: Option<IndexCoverage>,
    /// Nested edge selections.
    pub edges: Vec<CompiledEdgeSel>,
}

/// One compiled nested edge selection.
#[derive(Debug, Clone)]
pub struct CompiledEdgeSel {
    /// The edge, resolved against the parent level's type.
    pub edge: EdgeId,
    /// `true` if the target level's nodes are transparent.
    pub virtual_: bool,
    /// `true` if this selection reapplies to descendants of matching type.
    pub recursive: bool,
    /// The compiled target level.
    pub level: CompiledLevel,
}

/// A fully compiled, validated query (§4.4).
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// Root type.
    pub type_id: TypeId,
    /// If set, the query selects exactly this node rather than scanning.
    pub id: Option<NodeId>,
    /// The root level.
    pub root: CompiledLevel,
}

fn collect_types(level: &CompiledLevel, out: &mut Vec<TypeId>) {
    if !out.contains(&level.type_id) {
        out.push(level.type_id);
    }
    for edge in &level.edges {
        collect_types(&edge.level, out);
    }
}

impl CompiledQuery {
    /// Every type that appears anywhere in this query's tree, used to
    /// register the resulting view for type-level mutation routing (§4.4
    /// "Event dispatch").
    #[must_use]
    pub fn watched_types(&self) -> Vec<TypeId> {
        let mut out = Vec::new();
        collect_types(&self.root, &mut out);
        out
    }
}

fn compile_filter(schema: &Schema, type_id: TypeId, filter: &Filter) -> Result<CompiledFilter, QueryValidationError> {
    let property = schema.property_id(type_id, &filter.field).ok_or_else(|| QueryValidationError::UnknownField {
        type_name: schema.type_name(type_id).unwrap_or_default().to_owned(),
        field: filter.field.clone(),
    })?;
    Ok(CompiledFilter {
        property,
        op: filter.op,
        value: filter.value.clone(),
    })
}

fn compile_sort(schema: &Schema, type_id: TypeId, sort: &Sort) -> Result<SortKey, QueryValidationError> {
    let property = schema.property_id(type_id, &sort.field).ok_or_else(|| QueryValidationError::UnknownField {
        type_name: schema.type_name(type_id).unwrap_or_default().to_owned(),
        field: sort.field.clone(),
    })?;
    Ok(SortKey { property, desc: sort.desc })
}

#[allow(clippy::too_many_arguments)]
fn compile_level(
    schema: &Schema,
    type_id: TypeId,
    virtual_: bool,
    filters: &[Filter],
    sorts: &[Sort],
    edges: &[EdgeSel],
    edge_prefix: Option<EdgeId>,
    require_coverage: bool,
) -> Result<CompiledLevel, QueryValidationError> {
    let compiled_filters = filters
        .iter()
        .map(|f| compile_filter(schema, type_id, f))
        .collect::<Result<Vec<_>, _>>()?;
    let compiled_sorts = sorts.iter().map(|s| compile_sort(schema, type_id, s)).collect::<Result<Vec<_>, _>>()?;

    let coverage = if require_coverage {
        let equality: Vec<(PropertyId, Value)> = compiled_filters
            .iter()
            .filter(|f| f.op == FilterOp::Eq)
            .map(|f| (f.property, f.value.clone()))
            .collect();
        let range: Vec<PropertyId> = compiled_filters.iter().filter(|f| f.op != FilterOp::Eq).map(|f| f.property).collect();
        let req = SelectionRequest {
            edge_prefix,
            equality: &equality,
            range: &range,
            sorts: &compiled_sorts,
        };
        let coverage = IndexManager::select(schema, type_id, &req).ok_or_else(|| QueryValidationError::NoCoveringIndex {
            type_name: schema.type_name(type_id).unwrap_or_default().to_owned(),
        })?;
        Some(coverage)
    } else {
        None
    };

    let compiled_edges = edges
        .iter()
        .map(|edge_sel| {
            let edge_id = schema.edge_id(type_id, &edge_sel.name).ok_or_else(|| QueryValidationError::UnknownEdge {
                type_name: schema.type_name(type_id).unwrap_or_default().to_owned(),
                edge: edge_sel.name.clone(),
            })?;
            let target_type = schema.edge_target(edge_id).ok_or_else(|| QueryValidationError::UnknownEdge {
                type_name: schema.type_name(type_id).unwrap_or_default().to_owned(),
                edge: edge_sel.name.clone(),
            })?;
            // Coverage is checked against the reverse edge: that's the one
            // owned by `target_type` and the one an index declared on
            // `target_type` can actually reference (§4.2).
            let reverse_edge_id = schema.reverse_edge(edge_id).ok_or_else(|| QueryValidationError::UnknownEdge {
                type_name: schema.type_name(type_id).unwrap_or_default().to_owned(),
                edge: edge_sel.name.clone(),
            })?;
            let level = compile_level(
                schema,
                target_type,
                edge_sel.virtual_,
                &edge_sel.filters,
                &edge_sel.sorts,
                &edge_sel.edges,
                Some(reverse_edge_id),
                true,
            )?;
            Ok(CompiledEdgeSel {
                edge: edge_id,
                virtual_: edge_sel.virtual_,
                recursive: edge_sel.recursive,
                level,
            })
        })
        .collect::<Result<Vec<_>, QueryValidationError>>()?;

    Ok(CompiledLevel {
        type_id,
        virtual_,
        filters: compiled_filters,
        sorts: compiled_sorts,
        coverage,
        edges: compiled_edges,
    })
}

/// Compiles and validates `def` against `schema` (§4.4 "Validation").
pub fn compile(schema: &Schema, def: &QueryDef) -> Result<CompiledQuery, QueryValidationError> {
    let type_id = schema.type_id(&def.root).ok_or_else(|| QueryValidationError::UnknownRoot(def.root.clone()))?;
    let require_coverage = def.id.is_none();
    let root = compile_level(schema, type_id, def.virtual_, &def.filters, &def.sorts, &def.edges, None, require_coverage)?;
    Ok(CompiledQuery { type_id, id: def.id, root })
}
