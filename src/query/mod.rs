// SPDX-License-Identifier: Apache-2.0
//! The reactive query engine (§4.4): declarative query trees, compilation
//! against a schema, and materialized, expandable, viewport-bounded views.

pub mod compile;
pub mod def;
pub mod events;
pub mod view;

pub use compile::{compile, CompiledEdgeSel, CompiledFilter, CompiledLevel, CompiledQuery};
pub use def::{EdgeSel, Filter, FilterOp, QueryDef, Sort};
pub use events::{diff_materialization, Event};
pub use view::{Item, QueryView};

#[cfg(feature = "json")]
pub use def::query_from_json;
