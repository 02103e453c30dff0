// SPDX-License-Identifier: Apache-2.0
//! Change events dispatched to a materialized view (§4.4 "Event ordering").
//!
//! Rather than the step-by-step localized re-evaluation described for the
//! reference engine, this implementation re-materializes the full visible
//! item list after each mutation and diffs it against the previous one. The
//! ordering guarantees are produced by the diff itself: leaves before
//! enters, deepest/last items leaving first, parents entering before their
//! children (both implied by the depth-first, pre-order item list), and
//! moves carrying their pre- and post-dispatch index.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ids::NodeId;

/// One change to a materialized view's visible item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// `node` became visible at `index`.
    Enter {
        /// The node that entered.
        node: NodeId,
        /// Its index in the post-dispatch item list.
        index: usize,
    },
    /// `node` stopped being visible; `index` is its position in the
    /// pre-dispatch item list.
    Leave {
        /// The node that left.
        node: NodeId,
        /// Its index in the pre-dispatch item list.
        index: usize,
    },
    /// `node` remained visible but one of its displayed fields changed.
    Change {
        /// The changed node.
        node: NodeId,
        /// Its index in the post-dispatch item list.
        index: usize,
    },
    /// `node` remained visible but its position shifted.
    Move {
        /// The moved node.
        node: NodeId,
        /// Its index in the pre-dispatch item list.
        old_index: usize,
        /// Its index in the post-dispatch item list.
        new_index: usize,
    },
}

/// Diffs `old` against `new` (both depth-first, pre-order flattened item
/// lists) and produces the ordered event sequence a view should dispatch.
/// `changed` names nodes whose displayed fields were written since `old` was
/// captured; a changed node still present in `new` gets a [`Event::Change`]
/// unless it also entered or moved, either of which already reflects the
/// new state.
#[must_use]
pub fn diff_materialization(old: &[NodeId], new: &[NodeId], changed: &FxHashSet<NodeId>) -> Vec<Event> {
    let old_index: FxHashMap<NodeId, usize> = old.iter().copied().enumerate().map(|(i, n)| (n, i)).collect();
    let new_index: FxHashMap<NodeId, usize> = new.iter().copied().enumerate().map(|(i, n)| (n, i)).collect();

    let mut events = Vec::new();

    for (i, &node) in old.iter().enumerate().rev() {
        if !new_index.contains_key(&node) {
            events.push(Event::Leave { node, index: i });
        }
    }

    for (i, &node) in new.iter().enumerate() {
        match old_index.get(&node) {
            None => events.push(Event::Enter { node, index: i }),
            Some(&old_i) if old_i != i => events.push(Event::Move { node, old_index: old_i, new_index: i }),
            Some(_) if changed.contains(&node) => events.push(Event::Change { node, index: i }),
            Some(_) => {}
        }
    }

    events
}
