// SPDX-License-Identifier: Apache-2.0
//! Expanding a declared edge materializes its targets depth-first (§8
//! scenario 3).

#![allow(clippy::expect_used, clippy::unwrap_used)]

use neograph::{EdgeSel, Event, Graph, QueryDef, Schema, Value, ValueKind};

fn user_post_schema() -> Schema {
    let mut b = Schema::builder();
    let user = b.add_type("User").unwrap();
    let post = b.add_type("Post").unwrap();
    b.add_property(post, "title", ValueKind::String).unwrap();
    b.add_edge(user, "posts", post, "author").unwrap();
    b.finish().unwrap()
}

#[test]
fn expand_materializes_children_depth_first() {
    let mut graph = Graph::new(Some(user_post_schema()));
    let alice = graph.insert("User", &[]).unwrap().node_id;
    let post1 = graph.insert("Post", &[("title", Value::String("P1".into()))]).unwrap().node_id;
    let post2 = graph.insert("Post", &[("title", Value::String("P2".into()))]).unwrap().node_id;
    graph.link(alice, "posts", post1).unwrap();
    graph.link(alice, "posts", post2).unwrap();

    let handle = graph
        .query(&QueryDef {
            root: "User".to_owned(),
            id: Some(alice),
            edges: vec![EdgeSel { name: "posts".to_owned(), ..EdgeSel::default() }],
            ..QueryDef::default()
        })
        .unwrap();

    assert_eq!(graph.query_total(handle).unwrap(), 1, "children start collapsed");

    let events = graph.query_expand(handle, alice, "posts").unwrap();
    assert_eq!(events, vec![Event::Enter { node: post1, index: 1 }, Event::Enter { node: post2, index: 2 }]);
    assert_eq!(graph.query_total(handle).unwrap(), 3);

    let items = graph.query_items(handle).unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].id, alice);
    assert_eq!(items[0].depth, 0);
    assert_eq!(items[1].depth, 1);
    assert_eq!(items[2].depth, 1);

    let events = graph.query_collapse(handle, alice, "posts").unwrap();
    assert!(events.iter().any(|e| matches!(e, Event::Leave { node, .. } if *node == post2)));
    assert!(events.iter().any(|e| matches!(e, Event::Leave { node, .. } if *node == post1)));
    assert_eq!(graph.query_total(handle).unwrap(), 1);
}

#[test]
fn toggle_flips_current_expansion_state() {
    let mut graph = Graph::new(Some(user_post_schema()));
    let alice = graph.insert("User", &[]).unwrap().node_id;
    let post1 = graph.insert("Post", &[]).unwrap().node_id;
    graph.link(alice, "posts", post1).unwrap();

    let handle = graph
        .query(&QueryDef {
            root: "User".to_owned(),
            id: Some(alice),
            edges: vec![EdgeSel { name: "posts".to_owned(), ..EdgeSel::default() }],
            ..QueryDef::default()
        })
        .unwrap();

    assert!(!graph.query_is_expanded(handle, alice, "posts").unwrap());
    graph.query_toggle(handle, alice, "posts").unwrap();
    assert!(graph.query_is_expanded(handle, alice, "posts").unwrap());
    graph.query_toggle(handle, alice, "posts").unwrap();
    assert!(!graph.query_is_expanded(handle, alice, "posts").unwrap());
}
