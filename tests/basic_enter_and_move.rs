// SPDX-License-Identifier: Apache-2.0
//! Sorted-root query events on insert and update (§8 scenarios 1-2).

#![allow(clippy::expect_used, clippy::unwrap_used)]

use neograph::{Event, Graph, IndexField, QueryDef, Schema, Sort, Value, ValueKind};

fn user_schema() -> Schema {
    let mut b = Schema::builder();
    let user = b.add_type("User").unwrap();
    let name = b.add_property(user, "name", ValueKind::String).unwrap();
    b.add_index(user, vec![IndexField::Property { property: name, desc: false }]).unwrap();
    b.finish().unwrap()
}

fn names_in_order(graph: &Graph, handle: neograph::QueryHandle) -> Vec<String> {
    graph
        .query_items(handle)
        .unwrap()
        .iter()
        .map(|item| graph.get(item.id).unwrap().unwrap().property("name").unwrap().clone())
        .map(|v| match v {
            Value::String(s) => s,
            other => panic!("expected string, got {other:?}"),
        })
        .collect()
}

/// Scenario 1: Bob enters first, then Alice's insert sorts ahead of him.
#[test]
fn basic_enter_sorts_new_arrival_into_place() {
    let mut graph = Graph::new(Some(user_schema()));
    let handle = graph
        .query(&QueryDef {
            root: "User".to_owned(),
            sorts: vec![Sort { field: "name".to_owned(), desc: false }],
            ..QueryDef::default()
        })
        .unwrap();

    graph.insert("User", &[("name", Value::String("Bob".into()))]).unwrap();
    let outcome = graph.insert("User", &[("name", Value::String("Alice".into()))]).unwrap();

    let events = outcome.query_events.get(&handle).cloned().unwrap_or_default();
    assert_eq!(events, vec![Event::Enter { node: outcome.node_id, index: 0 }]);
    assert_eq!(names_in_order(&graph, handle), vec!["Alice", "Bob"]);
}

/// Scenario 2: renaming a node ahead of its neighbor swaps both of their
/// positions (two `Move`s); renaming a node that keeps its relative order
/// emits only a `Change`.
#[test]
fn move_on_update_reflects_new_sort_position() {
    let mut graph = Graph::new(Some(user_schema()));
    let handle = graph
        .query(&QueryDef {
            root: "User".to_owned(),
            sorts: vec![Sort { field: "name".to_owned(), desc: false }],
            ..QueryDef::default()
        })
        .unwrap();

    let bob = graph.insert("User", &[("name", Value::String("Bob".into()))]).unwrap().node_id;
    let alice = graph.insert("User", &[("name", Value::String("Alice".into()))]).unwrap().node_id;
    assert_eq!(names_in_order(&graph, handle), vec!["Alice", "Bob"]);

    // "Aaron" sorts ahead of "Alice": bob and alice swap positions.
    let outcome = graph.update(bob, &[("name", Value::String("Aaron".into()))]).unwrap();
    let events = outcome.query_events.get(&handle).cloned().unwrap_or_default();
    assert!(events.contains(&Event::Move { node: bob, old_index: 1, new_index: 0 }));
    assert!(events.contains(&Event::Move { node: alice, old_index: 0, new_index: 1 }));
    assert_eq!(names_in_order(&graph, handle), vec!["Aaron", "Alice"]);

    // "Zed" still sorts after "Aaron": alice's position is unchanged (1 -> 1).
    let outcome = graph.update(alice, &[("name", Value::String("Zed".into()))]).unwrap();
    let events = outcome.query_events.get(&handle).cloned().unwrap_or_default();
    assert!(events.contains(&Event::Change { node: alice, index: 1 }));
    assert!(!events.iter().any(|e| matches!(e, Event::Move { .. })));
    assert_eq!(names_in_order(&graph, handle), vec!["Aaron", "Zed"]);
}
