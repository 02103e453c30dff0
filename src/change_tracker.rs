// SPDX-License-Identifier: Apache-2.0
//! Subscription routing for per-node callbacks (§6 `Graph.on`/`off`) and for
//! knowing which materialized [`crate::query::QueryView`]s a mutation needs
//! to refresh (§4.4 "Event dispatch").
//!
//! Both concerns are "who should be notified when node N of type T changes"
//! and share one small module rather than two, mirroring how the teacher
//! keeps a single dispatch table per subsystem rather than splitting it by
//! caller.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ids::{NodeId, TypeId};
use crate::query::Event;

/// The kind of per-node event `Graph.on` can subscribe to (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeEvent {
    /// A property on the node changed.
    Change,
    /// The node was deleted.
    Delete,
    /// An edge from the node gained a target.
    Link,
    /// An edge from the node lost a target.
    Unlink,
}

/// Opaque handle returned by [`ChangeTracker::on`]; pass to
/// [`ChangeTracker::unsubscribe`] to remove the callback (idempotent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Opaque handle identifying a registered [`crate::query::QueryView`], used
/// both to route type-level mutations to the views that care and to scope
/// [`ChangeTracker::on_query`] subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(u64);

/// The kind of materialization event `Query.on` can subscribe to (§6),
/// matching one [`Event`] variant each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryEventKind {
    /// A node entered the materialized set.
    Enter,
    /// A node left the materialized set.
    Leave,
    /// A visible node's displayed fields changed.
    Change,
    /// A visible node's position changed.
    Move,
}

impl QueryEventKind {
    fn matches(self, event: &Event) -> bool {
        matches!(
            (self, event),
            (Self::Enter, Event::Enter { .. })
                | (Self::Leave, Event::Leave { .. })
                | (Self::Change, Event::Change { .. })
                | (Self::Move, Event::Move { .. })
        )
    }
}

type Callback = Box<dyn FnMut(NodeId, NodeEvent)>;
type QueryCallback = Box<dyn FnMut(&Event)>;

struct NodeSubscription {
    handle: SubscriptionHandle,
    node: NodeId,
    event: NodeEvent,
    callback: Callback,
}

struct QuerySubscription {
    handle: SubscriptionHandle,
    query: QueryHandle,
    kind: QueryEventKind,
    callback: QueryCallback,
}

/// Routes node mutations to registered callbacks and tells a [`crate::Graph`]
/// which query views a given type's mutation should refresh.
#[derive(Default)]
pub struct ChangeTracker {
    next_handle: u64,
    node_subs: Vec<NodeSubscription>,
    query_types: FxHashMap<TypeId, FxHashSet<QueryHandle>>,
    query_handle_types: FxHashMap<QueryHandle, Vec<TypeId>>,
    query_subs: Vec<QuerySubscription>,
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("node_subs", &self.node_subs.len())
            .field("query_types", &self.query_types.len())
            .field("query_subs", &self.query_subs.len())
            .finish()
    }
}

impl ChangeTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_handle(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    /// Subscribes `callback` to `event` on `node`. The callback fires
    /// synchronously from within the mutation that triggers it.
    pub fn on(&mut self, node: NodeId, event: NodeEvent, callback: impl FnMut(NodeId, NodeEvent) + 'static) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.alloc_handle());
        self.node_subs.push(NodeSubscription {
            handle,
            node,
            event,
            callback: Box::new(callback),
        });
        handle
    }

    /// Removes a single subscription by handle. A no-op if already removed.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.node_subs.retain(|s| s.handle != handle);
    }

    /// Removes every subscription on `node`, optionally restricted to one
    /// `event` kind.
    pub fn off(&mut self, node: NodeId, event: Option<NodeEvent>) {
        self.node_subs.retain(|s| s.node != node || event.is_some_and(|e| e != s.event));
    }

    /// Invokes every callback registered for `(node, event)`. A callback
    /// that panics is isolated via `catch_unwind`: its panic message is
    /// returned instead of propagating, matching §7's "callback failures
    /// are captured per-callback and reported but do not abort dispatch".
    pub fn dispatch(&mut self, node: NodeId, event: NodeEvent) -> Vec<String> {
        let mut failures = Vec::new();
        for sub in &mut self.node_subs {
            if sub.node != node || sub.event != event {
                continue;
            }
            let callback = AssertUnwindSafe(&mut sub.callback);
            if let Err(payload) = catch_unwind(move || (callback.0)(node, event)) {
                failures.push(panic_message(&payload));
            }
        }
        failures
    }

    /// Registers `handle` as observing every type in `types`.
    pub fn register_query(&mut self, handle: QueryHandle, types: Vec<TypeId>) {
        for &type_id in &types {
            self.query_types.entry(type_id).or_default().insert(handle);
        }
        self.query_handle_types.insert(handle, types);
    }

    /// Unregisters `handle` from every type it was watching and drops its
    /// event subscriptions (§5 "destroying a view releases all its
    /// subscriptions").
    pub fn unregister_query(&mut self, handle: QueryHandle) {
        if let Some(types) = self.query_handle_types.remove(&handle) {
            for type_id in types {
                if let Some(handles) = self.query_types.get_mut(&type_id) {
                    handles.remove(&handle);
                }
            }
        }
        self.query_subs.retain(|s| s.query != handle);
    }

    /// Returns every query handle watching `type_id`.
    #[must_use]
    pub fn queries_watching(&self, type_id: TypeId) -> Vec<QueryHandle> {
        self.query_types.get(&type_id).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }

    /// Allocates a fresh, unused query handle.
    pub fn alloc_query_handle(&mut self) -> QueryHandle {
        QueryHandle(self.alloc_handle())
    }

    /// Subscribes `callback` to `kind` events dispatched on `query`.
    pub fn on_query(&mut self, query: QueryHandle, kind: QueryEventKind, callback: impl FnMut(&Event) + 'static) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.alloc_handle());
        self.query_subs.push(QuerySubscription {
            handle,
            query,
            kind,
            callback: Box::new(callback),
        });
        handle
    }

    /// Removes every subscription on `query`, optionally restricted to one
    /// `kind`.
    pub fn off_query(&mut self, query: QueryHandle, kind: Option<QueryEventKind>) {
        self.query_subs.retain(|s| s.query != query || kind.is_some_and(|k| k != s.kind));
    }

    /// Invokes every callback subscribed to `query` whose kind matches one
    /// of `events`, in event order. Panics are isolated the same way as
    /// [`Self::dispatch`].
    pub fn dispatch_query(&mut self, query: QueryHandle, events: &[Event]) -> Vec<String> {
        let mut failures = Vec::new();
        for event in events {
            for sub in &mut self.query_subs {
                if sub.query != query || !sub.kind.matches(event) {
                    continue;
                }
                let callback = AssertUnwindSafe(&mut sub.callback);
                if let Err(payload) = catch_unwind(move || (callback.0)(event)) {
                    failures.push(panic_message(&payload));
                }
            }
        }
        failures
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn dispatch_invokes_matching_subscribers_only() {
        let mut tracker = ChangeTracker::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let node = NodeId(1);
        tracker.on(node, NodeEvent::Change, move |n, e| seen_clone.borrow_mut().push((n, e)));
        tracker.on(NodeId(2), NodeEvent::Change, |_, _| panic!("should not fire"));
        let failures = tracker.dispatch(node, NodeEvent::Change);
        assert!(failures.is_empty());
        assert_eq!(*seen.borrow(), vec![(node, NodeEvent::Change)]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let mut tracker = ChangeTracker::new();
        let handle = tracker.on(NodeId(1), NodeEvent::Delete, |_, _| {});
        tracker.unsubscribe(handle);
        tracker.unsubscribe(handle);
        assert!(tracker.dispatch(NodeId(1), NodeEvent::Delete).is_empty());
    }

    #[test]
    fn panicking_callback_is_isolated() {
        let mut tracker = ChangeTracker::new();
        tracker.on(NodeId(1), NodeEvent::Delete, |_, _| panic!("boom"));
        let failures = tracker.dispatch(NodeId(1), NodeEvent::Delete);
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn query_registration_routes_by_type_and_unregisters_cleanly() {
        let mut tracker = ChangeTracker::new();
        let handle = tracker.alloc_query_handle();
        tracker.register_query(handle, vec![TypeId(0), TypeId(1)]);
        assert_eq!(tracker.queries_watching(TypeId(0)), vec![handle]);
        tracker.unregister_query(handle);
        assert!(tracker.queries_watching(TypeId(0)).is_empty());
    }

    #[test]
    fn query_subscription_fires_on_matching_kind_only() {
        let mut tracker = ChangeTracker::new();
        let handle = tracker.alloc_query_handle();
        let seen = Rc::new(RefCell::new(0));
        let seen_clone = Rc::clone(&seen);
        tracker.on_query(handle, QueryEventKind::Enter, move |_| *seen_clone.borrow_mut() += 1);
        let events = vec![Event::Enter { node: NodeId(1), index: 0 }, Event::Leave { node: NodeId(2), index: 0 }];
        let failures = tracker.dispatch_query(handle, &events);
        assert!(failures.is_empty());
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn unregister_query_drops_its_event_subscriptions() {
        let mut tracker = ChangeTracker::new();
        let handle = tracker.alloc_query_handle();
        tracker.on_query(handle, QueryEventKind::Enter, |_| {});
        tracker.unregister_query(handle);
        let events = vec![Event::Enter { node: NodeId(1), index: 0 }];
        assert!(tracker.dispatch_query(handle, &events).is_empty());
    }
}
