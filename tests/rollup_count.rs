// SPDX-License-Identifier: Apache-2.0
//! A `Count` rollup transitions with each link and notifies any query
//! watching the rolled-up node's type (§8 scenario 4).

#![allow(clippy::expect_used, clippy::unwrap_used)]

use neograph::{Event, Graph, IndexField, QueryDef, RollupDef, Schema, Value, ValueKind};

fn parent_child_schema() -> Schema {
    let mut b = Schema::builder();
    let parent = b.add_type("Parent").unwrap();
    let child = b.add_type("Child").unwrap();
    let (children, _parent_edge) = b.add_edge(parent, "children", child, "parent").unwrap();
    b.add_rollup(parent, "count", RollupDef::Count { edge: children }).unwrap();
    let id = b.add_property(parent, "id", ValueKind::Int).unwrap();
    b.add_index(parent, vec![IndexField::Property { property: id, desc: false }]).unwrap();
    b.finish().unwrap()
}

#[test]
fn count_rollup_transitions_zero_one_two_and_dispatches_change() {
    let mut graph = Graph::new(Some(parent_child_schema()));
    let handle = graph.query(&QueryDef { root: "Parent".to_owned(), ..QueryDef::default() }).unwrap();

    let p = graph.insert("Parent", &[("id", Value::Int(1))]).unwrap().node_id;
    assert_eq!(graph.get(p).unwrap().unwrap().rollup("count"), Some(&Value::Int(0)));

    let c1 = graph.insert("Child", &[]).unwrap().node_id;
    let outcome = graph.link(p, "children", c1).unwrap();
    assert_eq!(graph.get(p).unwrap().unwrap().rollup("count"), Some(&Value::Int(1)));
    let events = outcome.query_events.get(&handle).cloned().unwrap_or_default();
    assert!(events.iter().any(|e| matches!(e, Event::Change { node, .. } if *node == p)));

    let c2 = graph.insert("Child", &[]).unwrap().node_id;
    let outcome = graph.link(p, "children", c2).unwrap();
    assert_eq!(graph.get(p).unwrap().unwrap().rollup("count"), Some(&Value::Int(2)));
    let events = outcome.query_events.get(&handle).cloned().unwrap_or_default();
    assert!(events.iter().any(|e| matches!(e, Event::Change { node, .. } if *node == p)));

    let outcome = graph.unlink(p, "children", c1).unwrap();
    assert_eq!(graph.get(p).unwrap().unwrap().rollup("count"), Some(&Value::Int(1)));
    let events = outcome.query_events.get(&handle).cloned().unwrap_or_default();
    assert!(events.iter().any(|e| matches!(e, Event::Change { node, .. } if *node == p)));
}
