//! Structural diff between two snapshot graphs.
//!
//! The delta is element-level, not byte-level: nodes match by id, edges by
//! identity key. A node counts as changed when any of its content differs
//! (type, label, position, data, extras). Edges have no changed bucket: an
//! edge whose key survives is not part of the delta even if its attributes
//! moved, and a key change shows up as one removal plus one addition.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::graph::{Edge, Node};
use super::snapshot::Snapshot;

// ---------------------------------------------------------------------------
// SnapshotDelta
// ---------------------------------------------------------------------------

/// A node present on both sides with differing content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedNode {
    /// The shared node id.
    pub id: String,
    /// The older side's version.
    pub before: Node,
    /// The newer side's version.
    pub after: Node,
}

/// The structural difference between two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDelta {
    /// Nodes only the newer side has.
    pub added_nodes: Vec<Node>,
    /// Nodes only the older side has.
    pub removed_nodes: Vec<Node>,
    /// Nodes on both sides with differing content.
    pub changed_nodes: Vec<ChangedNode>,
    /// Edges (by identity key) only the newer side has.
    pub added_edges: Vec<Edge>,
    /// Edges (by identity key) only the older side has.
    pub removed_edges: Vec<Edge>,
}

impl SnapshotDelta {
    /// Compute the delta between two snapshots (`from` is the older side).
    #[must_use]
    pub fn between(from: &Snapshot, to: &Snapshot) -> Self {
        delta(&from.nodes, &from.edges, &to.nodes, &to.edges)
    }

    /// Returns `true` if the two sides are structurally identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.changed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

impl fmt::Display for SnapshotDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} -{} ~{} node(s), +{} -{} edge(s)",
            self.added_nodes.len(),
            self.removed_nodes.len(),
            self.changed_nodes.len(),
            self.added_edges.len(),
            self.removed_edges.len()
        )
    }
}

// ---------------------------------------------------------------------------
// delta
// ---------------------------------------------------------------------------

/// Compute the structural delta between two graphs.
#[must_use]
pub fn delta(
    before_nodes: &[Node],
    before_edges: &[Edge],
    after_nodes: &[Node],
    after_edges: &[Edge],
) -> SnapshotDelta {
    // 1. Index both sides. Duplicate ids collapse last-wins, matching merge.
    let before: BTreeMap<&str, &Node> = before_nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let after: BTreeMap<&str, &Node> = after_nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    // 2. Classify nodes.
    let mut added_nodes = Vec::new();
    let mut changed_nodes = Vec::new();
    for (id, node) in &after {
        match before.get(id) {
            None => added_nodes.push((*node).clone()),
            Some(old) if old != node => changed_nodes.push(ChangedNode {
                id: (*id).to_owned(),
                before: (*old).clone(),
                after: (*node).clone(),
            }),
            Some(_) => {}
        }
    }
    let removed_nodes = before
        .iter()
        .filter(|(id, _)| !after.contains_key(*id))
        .map(|(_, n)| (*n).clone())
        .collect();

    // 3. Classify edges by identity key.
    let before_keys: BTreeMap<String, &Edge> =
        before_edges.iter().map(|e| (e.identity_key(), e)).collect();
    let after_keys: BTreeMap<String, &Edge> =
        after_edges.iter().map(|e| (e.identity_key(), e)).collect();

    let added_edges = after_keys
        .iter()
        .filter(|(key, _)| !before_keys.contains_key(*key))
        .map(|(_, e)| (*e).clone())
        .collect();
    let removed_edges = before_keys
        .iter()
        .filter(|(key, _)| !after_keys.contains_key(*key))
        .map(|(_, e)| (*e).clone())
        .collect();

    SnapshotDelta {
        added_nodes,
        removed_nodes,
        changed_nodes,
        added_edges,
        removed_edges,
    }
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

    #[test]
    fn identical_graphs_empty_delta() {
        let nodes = vec![node("a", "A"), node("b", "B")];
        let edges = vec![Edge::new("a", "b")];
        let d = delta(&nodes, &edges, &nodes, &edges);
        assert!(d.is_empty());
    }

    #[test]
    fn added_and_removed_nodes() {
        let d = delta(
            &[node("a", "A"), node("gone", "G")],
            &[],
            &[node("a", "A"), node("new", "N")],
            &[],
        );
        assert_eq!(d.added_nodes.len(), 1);
        assert_eq!(d.added_nodes[0].id, "new");
        assert_eq!(d.removed_nodes.len(), 1);
        assert_eq!(d.removed_nodes[0].id, "gone");
        assert!(d.changed_nodes.is_empty());
    }

    #[test]
    fn changed_node_by_label() {
        let d = delta(&[node("a", "old")], &[], &[node("a", "new")], &[]);
        assert_eq!(d.changed_nodes.len(), 1);
        assert_eq!(d.changed_nodes[0].before.label, "old");
        assert_eq!(d.changed_nodes[0].after.label, "new");
    }

    #[test]
    fn changed_node_by_position() {
        let before = node("a", "A").with_position(0.0, 0.0);
        let after = node("a", "A").with_position(10.0, 0.0);
        let d = delta(&[before], &[], &[after], &[]);
        assert_eq!(d.changed_nodes.len(), 1);
    }

    #[test]
    fn changed_node_by_data_field() {
        let before = node("db", "DB").with_data("dbType", "postgres");
        let after = node("db", "DB").with_data("dbType", "mysql");
        let d = delta(&[before], &[], &[after], &[]);
        assert_eq!(d.changed_nodes.len(), 1);
    }

    #[test]
    fn edge_label_change_is_remove_plus_add() {
        let a = node("a", "A");
        let b = node("b", "B");
        let d = delta(
            &[a.clone(), b.clone()],
            &[Edge::new("a", "b").with_label("reads")],
            &[a, b],
            &[Edge::new("a", "b").with_label("writes")],
        );
        assert_eq!(d.added_edges.len(), 1);
        assert_eq!(d.removed_edges.len(), 1);
    }

    #[test]
    fn edge_attribute_change_keeps_key_out_of_delta() {
        let nodes = vec![node("a", "A"), node("b", "B")];
        let d = delta(
            &nodes,
            &[Edge::new("a", "b").with_protocol("http")],
            &nodes,
            &[Edge::new("a", "b").with_protocol("grpc")],
        );
        assert!(d.added_edges.is_empty());
        assert!(d.removed_edges.is_empty());
    }

    #[test]
    fn display_counts() {
        let d = delta(&[node("gone", "G")], &[], &[node("new", "N")], &[]);
        assert_eq!(format!("{d}"), "+1 -1 ~0 node(s), +0 -0 edge(s)");
    }
}
