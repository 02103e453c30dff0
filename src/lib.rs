// SPDX-License-Identifier: Apache-2.0
//! neograph: an in-memory, schema-typed property graph with a reactive
//! query engine.
//!
//! A [`Schema`] declares node types, properties, edges, and rollups; a
//! [`Graph`] stores nodes against that schema and is the only type through
//! which the graph is mutated. [`Graph::query`] compiles a [`QueryDef`]
//! into a materialized, expandable, viewport-bounded [`query::QueryView`]
//! that emits `Enter`/`Leave`/`Change`/`Move` events as the graph changes
//! underneath it.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod btree;
mod change_tracker;
mod constants;
mod error;
mod graph;
mod ids;
mod index;
mod node_store;
/// The reactive query engine: declarative query trees, compilation, and
/// materialized views.
pub mod query;
mod rollup;
mod schema;
#[cfg(feature = "json")]
mod schema_json;
mod value;

pub use change_tracker::{NodeEvent, QueryEventKind, QueryHandle, SubscriptionHandle};
pub use error::{ExpansionError, GraphError, GraphResult, InvariantError, QueryError, QueryValidationError, SchemaError};
pub use graph::{Graph, MutationOutcome, NodeHandle};
pub use ids::{EdgeId, IndexId, NodeId, PropertyId, RollupId, TypeId};
pub use query::{EdgeSel, Event, Filter, FilterOp, Item, QueryDef, QueryView, Sort};
pub use schema::{IndexField, RollupDef, Schema, SchemaBuilder};
pub use value::{Value, ValueKind};
