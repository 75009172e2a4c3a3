//! Merge reduction: additive, last-writer-wins set union over graphs.
//!
//! Merging never deletes. Nodes are keyed by id, edges by
//! [`identity_key`](crate::model::graph::Edge::identity_key); on a key
//! collision the incoming value replaces the existing one wholesale. The
//! union variant additionally drops edges left without endpoints, which is
//! the shape resolution and flattening want.
//!
//! Output is ordered by key for determinism. Callers must not read meaning
//! into that ordering; it matches neither input.

use std::collections::{BTreeMap, BTreeSet};

use super::graph::{Edge, Node};

/// Merge two node sets keyed by id; incoming wins collisions wholesale.
#[must_use]
pub fn merge_nodes(existing: &[Node], incoming: &[Node]) -> Vec<Node> {
    let mut merged: BTreeMap<String, Node> = BTreeMap::new();
    for node in existing.iter().chain(incoming) {
        merged.insert(node.id.clone(), node.clone());
    }
    merged.into_values().collect()
}

/// Merge two edge sets keyed by identity key; incoming wins collisions.
#[must_use]
pub fn merge_edges(existing: &[Edge], incoming: &[Edge]) -> Vec<Edge> {
    let mut merged: BTreeMap<String, Edge> = BTreeMap::new();
    for edge in existing.iter().chain(incoming) {
        merged.insert(edge.identity_key(), edge.clone());
    }
    merged.into_values().collect()
}

/// Merge both sets and drop edges whose endpoints are absent from the merged
/// node set.
#[must_use]
pub fn union_graph(
    existing_nodes: &[Node],
    existing_edges: &[Edge],
    incoming_nodes: &[Node],
    incoming_edges: &[Edge],
) -> (Vec<Node>, Vec<Edge>) {
    let nodes = merge_nodes(existing_nodes, incoming_nodes);
    let ids: BTreeSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let edges = merge_edges(existing_edges, incoming_edges)
        .into_iter()
        .filter(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
        .collect();
    (nodes, edges)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, label: &str) -> Node {
        Node::new(id, "service").with_label(label)
    }

    // -- merge_nodes --

    #[test]
    fn disjoint_nodes_union() {
        let merged = merge_nodes(&[node("a", "A")], &[node("b", "B")]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn colliding_node_incoming_wins() {
        let merged = merge_nodes(&[node("n1", "old")], &[node("n1", "new")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].label, "new");
    }

    #[test]
    fn incoming_replaces_wholesale() {
        let existing = node("db", "DB").with_data("dbType", "postgres");
        let incoming = node("db", "DB v2");
        let merged = merge_nodes(&[existing], &[incoming]);
        // No field-level blending: the old data bag is gone.
        assert!(merged[0].data.is_empty());
    }

    #[test]
    fn merge_nodes_empty_sides() {
        assert!(merge_nodes(&[], &[]).is_empty());
        assert_eq!(merge_nodes(&[node("a", "A")], &[]).len(), 1);
        assert_eq!(merge_nodes(&[], &[node("a", "A")]).len(), 1);
    }

    // -- merge_edges --

    #[test]
    fn colliding_edge_incoming_wins() {
        let merged = merge_edges(
            &[Edge::new("a", "b").with_protocol("http")],
            &[Edge::new("a", "b").with_protocol("grpc")],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].protocol.as_deref(), Some("grpc"));
    }

    #[test]
    fn labeled_edges_do_not_collide() {
        let merged = merge_edges(
            &[Edge::new("a", "b").with_label("reads")],
            &[Edge::new("a", "b").with_label("writes")],
        );
        assert_eq!(merged.len(), 2);
    }

    // -- union_graph --

    #[test]
    fn union_drops_dangling_edges() {
        let (nodes, edges) = union_graph(
            &[node("a", "A")],
            &[Edge::new("a", "ghost")],
            &[node("b", "B")],
            &[Edge::new("a", "b")],
        );
        assert_eq!(nodes.len(), 2);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].identity_key(), "a->b");
    }

    #[test]
    fn union_keeps_edges_whose_endpoints_span_sides() {
        // Edge from the existing side pointing at a node only the incoming
        // side carries survives the union.
        let (_, edges) = union_graph(
            &[node("a", "A")],
            &[Edge::new("a", "b")],
            &[node("b", "B")],
            &[],
        );
        assert_eq!(edges.len(), 1);
    }

    // -- algebra --

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_node() -> impl Strategy<Value = Node> {
            ("[a-e]", "[a-c]", "[a-z]{0,6}")
                .prop_map(|(id, kind, label)| Node::new(id, kind).with_label(label))
        }

        fn arb_nodes() -> impl Strategy<Value = Vec<Node>> {
            proptest::collection::vec(arb_node(), 0..8)
        }

        fn arb_edge() -> impl Strategy<Value = Edge> {
            ("[a-e]", "[a-e]", proptest::option::of("[a-c]"))
                .prop_map(|(source, target, label)| match label {
                    Some(l) => Edge::new(source, target).with_label(l),
                    None => Edge::new(source, target),
                })
        }

        fn arb_edges() -> impl Strategy<Value = Vec<Edge>> {
            proptest::collection::vec(arb_edge(), 0..8)
        }

        proptest! {
            #[test]
            fn merge_is_idempotent(nodes in arb_nodes()) {
                let once = merge_nodes(&nodes, &[]);
                let twice = merge_nodes(&once, &once);
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn merged_ids_are_the_id_union(a in arb_nodes(), b in arb_nodes()) {
                let merged = merge_nodes(&a, &b);
                let got: std::collections::BTreeSet<_> =
                    merged.iter().map(|n| n.id.clone()).collect();
                let want: std::collections::BTreeSet<_> =
                    a.iter().chain(&b).map(|n| n.id.clone()).collect();
                prop_assert_eq!(got, want);
            }

            #[test]
            fn incoming_always_wins(a in arb_nodes(), b in arb_nodes()) {
                let merged = merge_nodes(&a, &b);
                for node in &merged {
                    if let Some(last) = b.iter().rev().find(|n| n.id == node.id) {
                        prop_assert_eq!(node, last);
                    }
                }
            }

            #[test]
            fn merged_edge_keys_are_unique(a in arb_edges(), b in arb_edges()) {
                let merged = merge_edges(&a, &b);
                let keys: std::collections::BTreeSet<_> =
                    merged.iter().map(Edge::identity_key).collect();
                prop_assert_eq!(keys.len(), merged.len());
            }

            #[test]
            fn union_never_leaves_dangling_edges(
                an in arb_nodes(), ae in arb_edges(),
                bn in arb_nodes(), be in arb_edges(),
            ) {
                let (nodes, edges) = union_graph(&an, &ae, &bn, &be);
                let ids: std::collections::BTreeSet<_> =
                    nodes.iter().map(|n| n.id.as_str()).collect();
                for edge in &edges {
                    prop_assert!(ids.contains(edge.source.as_str()));
                    prop_assert!(ids.contains(edge.target.as_str()));
                }
            }
        }
    }
}
