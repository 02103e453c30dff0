// SPDX-License-Identifier: Apache-2.0
//! Engine-wide tunable constants.

/// Branching factor for every B+ tree instance in the engine (§4.1).
///
/// Internal nodes hold up to `BTREE_B - 1` routing keys and up to `BTREE_B`
/// child pointers; leaves hold up to `BTREE_B - 1` key/value pairs.
pub const BTREE_B: usize = 32;

/// Minimum number of entries a leaf should hold before a split, used as the
/// split point (`BTREE_B / 2`) when a leaf overflows.
pub const BTREE_SPLIT_AT: usize = BTREE_B / 2;

/// Default viewport size used when a query is created without an explicit
/// `limit` (§4.4 Viewport).
pub const DEFAULT_VIEWPORT_LIMIT: usize = 100;

/// Safety bound on the number of materialize-and-expand passes
/// `QueryView::expand_all` performs when called without an explicit depth.
/// Graphs are not required to be acyclic (e.g. a recursive self-edge can
/// loop), so an unbounded expansion fixed point is not guaranteed to
/// terminate; this caps the walk instead.
pub const MAX_EXPAND_ALL_DEPTH: usize = 4096;
