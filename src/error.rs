// SPDX-License-Identifier: Apache-2.0
//! Error types surfaced to callers (§7).
//!
//! One `thiserror`-derived enum per subsystem boundary, mirroring the
//! teacher's `EngineError`/`SeekError`/`ApplyError` convention: each variant
//! interpolates the offending name or id rather than carrying a free-form
//! message.

use thiserror::Error;

use crate::ids::{EdgeId, NodeId};
use crate::value::ValueKind;

/// Errors raised while registering or looking up schema definitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A type name was referenced that has not been registered.
    #[error("unknown type: {0}")]
    UnknownType(String),
    /// A property name was referenced that is not declared on its type.
    #[error("unknown property {property} on type {type_name}")]
    UnknownProperty {
        /// Bound type's name.
        type_name: String,
        /// Unresolved property name.
        property: String,
    },
    /// An edge name was referenced that is not declared on its type.
    #[error("unknown edge {edge} on type {type_name}")]
    UnknownEdge {
        /// Bound type's name.
        type_name: String,
        /// Unresolved edge name.
        edge: String,
    },
    /// A type, property, edge, or index was registered more than once under
    /// the same name.
    #[error("duplicate name in schema: {0}")]
    DuplicateName(String),
    /// A property write's value kind disagrees with the schema (§3 Type
    /// safety).
    #[error("type mismatch for property {property}: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// Offending property name.
        property: String,
        /// Kind declared in the schema.
        expected: ValueKind,
        /// Kind actually supplied.
        found: ValueKind,
    },
    /// An edge declaration's target type does not declare the matching
    /// reverse edge back to the source type.
    #[error("edge {edge} on type {type_name} is missing its reverse declaration on {target}")]
    MissingReverseEdge {
        /// Declaring type's name.
        type_name: String,
        /// Edge name.
        edge: String,
        /// Target type's name.
        target: String,
    },
    /// The schema JSON or structured value could not be parsed.
    #[error("invalid schema definition: {0}")]
    InvalidDefinition(String),
    /// An index's leading field is an edge, but the edge's target type is
    /// unknown or the remaining fields are not declared on it.
    #[error("invalid index on type {type_name}: {reason}")]
    InvalidIndex {
        /// Declaring type's name.
        type_name: String,
        /// Why the index definition was rejected.
        reason: String,
    },
}

/// Errors raised while compiling or validating a query tree (§4.4
/// Validation).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
    /// The query's `root` did not resolve to a registered type.
    #[error("unknown root type: {0}")]
    UnknownRoot(String),
    /// An edge selection named an edge not present on its bound type.
    #[error("edge {edge} is not declared on type {type_name}")]
    UnknownEdge {
        /// Bound type's name.
        type_name: String,
        /// Unresolved edge name.
        edge: String,
    },
    /// A sort or filter referenced a property not declared on the bound
    /// type.
    #[error("unknown field {field} on type {type_name}")]
    UnknownField {
        /// Bound type's name.
        type_name: String,
        /// Unresolved field name.
        field: String,
    },
    /// No index covers this level's (equality filters, sorts, parent-edge
    /// prefix); the engine will not perform an uncovered scan.
    #[error("no index covers type {type_name} for the requested filters/sorts")]
    NoCoveringIndex {
        /// Bound type's name.
        type_name: String,
    },
}

/// Errors raised by `Query::expand`/`Query::collapse` (§4.4 Expansion API).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpansionError {
    /// The requested node is not currently a visible item in the view.
    #[error("node {0:?} is not a visible item in this view")]
    NodeNotVisible(NodeId),
    /// The edge is not declared at the node's position in the query tree.
    #[error("edge {edge} is not selected at this node's level of the query")]
    EdgeNotSelected {
        /// Edge name requested.
        edge: String,
    },
}

/// Wraps [`QueryValidationError`] and [`ExpansionError`] as the single
/// caller-facing error type for the query surface (§7 "Implementation
/// shape": both are query-surface errors, so one public enum composes
/// them rather than forcing callers to match two types).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Compile-time validation failure.
    #[error(transparent)]
    Validation(#[from] QueryValidationError),
    /// Runtime expand/collapse failure.
    #[error(transparent)]
    Expansion(#[from] ExpansionError),
}

/// Internal consistency violations (§7 `Invariant`). Fatal for the current
/// operation only; the graph remains usable afterwards since mutations are
/// all-or-nothing within the event buffer (§4.4 Failure semantics).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantError {
    /// An edge was found without its declared reverse counterpart.
    #[error("missing reverse edge: {edge:?} from {from:?} to {to:?}")]
    MissingReverseEdge {
        /// Edge id on the side that was found.
        edge: EdgeId,
        /// Source node.
        from: NodeId,
        /// Target node.
        to: NodeId,
    },
    /// An index lookup expected exactly one entry for a node and found none
    /// or more than one.
    #[error("index miss for node {0:?}")]
    IndexMiss(NodeId),
    /// A B+ tree's subtree-count bookkeeping disagreed with its actual
    /// entry count.
    #[error("corrupted subtree count: expected {expected}, found {found}")]
    CorruptedCount {
        /// Count computed from live entries.
        expected: u64,
        /// Count stored on the node.
        found: u64,
    },
}

/// Top-level error type for the mutation API (§6 Host API).
///
/// Composes [`SchemaError`] (pass-through from registration-adjacent calls),
/// [`InvariantError`], and not-found conditions, matching §7's description
/// of a small caller-facing surface (see DESIGN.md, Open Question 4).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A schema-level error (unknown type/property/edge, type mismatch).
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// An internal invariant was violated; the triggering mutation aborted.
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    /// The operation targeted a node id that does not exist.
    #[error("no such node: {0:?}")]
    NotFound(NodeId),
    /// `link`/`unlink` referenced an edge name not declared on the source
    /// type.
    #[error("unknown edge {edge} on type {type_name}")]
    UnknownEdge {
        /// Source type's name.
        type_name: String,
        /// Unresolved edge name.
        edge: String,
    },
    /// `Graph::schema` was called after the first insert (§6: only valid
    /// before first insert).
    #[error("schema can only be set before the first insert")]
    SchemaAlreadyFinalized,
    /// A query-surface error, surfaced through `Graph::query`.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// A query operation referenced a handle that does not (or no longer)
    /// identify a live view.
    #[error("unknown or destroyed query handle")]
    UnknownQuery,
}

/// Standard result type for mutation-API operations (§7 Policy).
pub type GraphResult<T> = Result<T, GraphError>;

impl GraphError {
    /// Constructs a [`GraphError::UnknownEdge`] for `edge` on `type_name`.
    #[must_use]
    pub fn unknown_edge(type_name: impl Into<String>, edge: impl Into<String>) -> Self {
        Self::UnknownEdge {
            type_name: type_name.into(),
            edge: edge.into(),
        }
    }
}
