// SPDX-License-Identifier: Apache-2.0
//! Schema-aware compound-key indexing (§4.2): key encoding plus the index
//! manager that maintains per-type index tables and performs cost-based
//! index selection.

pub mod key;
pub mod manager;

pub use key::{CompoundKey, KeyComponent};
pub use manager::{IndexCoverage, IndexManager, SelectionRequest, SortKey};
