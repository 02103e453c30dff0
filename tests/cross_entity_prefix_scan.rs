// SPDX-License-Identifier: Apache-2.0
//! An edge-prefixed compound index lets a nested level scan one thread's
//! stacks without touching any other thread's entries (§8 scenario 5).

#![allow(clippy::expect_used, clippy::unwrap_used)]

use neograph::{EdgeSel, Graph, IndexField, QueryDef, Schema, Sort, Value, ValueKind};

fn thread_stack_schema() -> Schema {
    let mut b = Schema::builder();
    let thread = b.add_type("Thread").unwrap();
    let stack = b.add_type("Stack").unwrap();
    let ts = b.add_property(stack, "ts", ValueKind::Int).unwrap();
    let (_stacks, thread_edge) = b.add_edge(thread, "stacks", stack, "thread").unwrap();
    b.add_index(stack, vec![IndexField::Edge { edge: thread_edge }, IndexField::Property { property: ts, desc: true }]).unwrap();
    b.finish().unwrap()
}

#[test]
fn expanding_one_thread_scans_only_its_own_stacks_in_descending_ts() {
    let mut graph = Graph::new(Some(thread_stack_schema()));

    let t1 = graph.insert("Thread", &[]).unwrap().node_id;
    let t2 = graph.insert("Thread", &[]).unwrap().node_id;

    let mut t1_stacks = Vec::new();
    for ts in [10, 30, 20] {
        let s = graph.insert("Stack", &[("ts", Value::Int(ts))]).unwrap().node_id;
        graph.link(t1, "stacks", s).unwrap();
        t1_stacks.push((s, ts));
    }
    for ts in [99, 1] {
        let s = graph.insert("Stack", &[("ts", Value::Int(ts))]).unwrap().node_id;
        graph.link(t2, "stacks", s).unwrap();
    }

    let handle = graph
        .query(&QueryDef {
            root: "Thread".to_owned(),
            id: Some(t1),
            edges: vec![EdgeSel {
                name: "stacks".to_owned(),
                sorts: vec![Sort { field: "ts".to_owned(), desc: true }],
                ..EdgeSel::default()
            }],
            ..QueryDef::default()
        })
        .unwrap();
    graph.query_expand(handle, t1, "stacks").unwrap();

    let items = graph.query_items(handle).unwrap();
    // 1 thread root + its 3 stacks, none of t2's.
    assert_eq!(items.len(), 4);
    let stack_ids: Vec<_> = items[1..].iter().map(|i| i.id).collect();
    let expected: Vec<_> = {
        let mut sorted = t1_stacks;
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted.into_iter().map(|(id, _)| id).collect()
    };
    assert_eq!(stack_ids, expected);
}
