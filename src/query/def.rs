// SPDX-License-Identifier: Apache-2.0
//! The declarative query tree accepted by [`crate::Graph::query`] (§4.4).

use crate::ids::NodeId;
use crate::value::Value;

/// A comparison operator for a [`Filter`] (§9 "Filter semantics beyond
/// equality").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FilterOp {
    /// `field == value`.
    Eq,
    /// `field != value`.
    Ne,
    /// `field < value`.
    Lt,
    /// `field <= value`.
    Le,
    /// `field > value`.
    Gt,
    /// `field >= value`.
    Ge,
}

/// A single filter clause: `field <op> value`. `Null` orders below every
/// non-null value for `Lt`/`Le`/`Gt`/`Ge` (§9).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Filter {
    /// Name of the property this filter reads.
    pub field: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Value to compare against.
    pub value: Value,
}

/// A requested sort key.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sort {
    /// Name of the property to sort by.
    pub field: String,
    /// `true` for descending.
    #[cfg_attr(feature = "serde", serde(default))]
    pub desc: bool,
}

/// A nested edge selection (§4.4).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeSel {
    /// Edge name, resolved against the bound type at compile time.
    pub name: String,
    /// If `true`, this level's nodes are never emitted as items; only their
    /// children appear, at the same depth as this level would have had.
    #[cfg_attr(feature = "serde", serde(default))]
    pub virtual_: bool,
    /// If `true`, this same selection reapplies whenever the edge's target
    /// type is re-encountered at any depth below it.
    #[cfg_attr(feature = "serde", serde(default))]
    pub recursive: bool,
    /// Equality/comparison filters bound to the target type.
    #[cfg_attr(feature = "serde", serde(default))]
    pub filters: Vec<Filter>,
    /// Requested sort order, bound to the target type.
    #[cfg_attr(feature = "serde", serde(default))]
    pub sorts: Vec<Sort>,
    /// Further edges nested under this selection.
    #[cfg_attr(feature = "serde", serde(default))]
    pub edges: Vec<EdgeSel>,
}

/// The root of a query tree (§4.4).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryDef {
    /// Root type name.
    pub root: String,
    /// If set, bypasses `filters` and selects exactly this node (still
    /// subject to a type check against `root`).
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: Option<NodeId>,
    /// If `true`, the root level is transparent: its node is never emitted,
    /// only its children (at depth 0).
    #[cfg_attr(feature = "serde", serde(default))]
    pub virtual_: bool,
    /// Equality/comparison filters on the root type.
    #[cfg_attr(feature = "serde", serde(default))]
    pub filters: Vec<Filter>,
    /// Requested sort order on the root type.
    #[cfg_attr(feature = "serde", serde(default))]
    pub sorts: Vec<Sort>,
    /// Edges selected under the root.
    #[cfg_attr(feature = "serde", serde(default))]
    pub edges: Vec<EdgeSel>,
}

/// Parses a [`QueryDef`] from the JSON shape in §6. Requires the `json`
/// feature.
#[cfg(feature = "json")]
pub fn query_from_json(text: &str) -> Result<QueryDef, serde_json::Error> {
    serde_json::from_str(text)
}
