//! Structured conflict detection between a snapshot and a candidate graph.
//!
//! Detection is a pure function: no store, no clock, no short-circuit. Each
//! hit produces a [`ConflictRecord`] naming the offending node id or edge
//! key plus both values, so a reviewer can resolve it surgically instead of
//! staring at two whole graphs.
//!
//! # Rules
//!
//! Merging is additive, so absence never conflicts. A candidate element only
//! conflicts with an existing element that shares its identity:
//!
//! - node, same id, different `type`
//! - node, same id, a significant data field (`dbType`, `protocol`, `auth`)
//!   non-empty on both sides with different values
//! - edge, same identity key, `protocol` or `auth` non-empty on both sides
//!   with different values
//!
//! "Non-empty" means present, non-null, and not the empty string. A value on
//! one side and nothing on the other merges cleanly.
//!
//! # Example JSON
//!
//! ```json
//! {
//!   "id": "0a0f...",
//!   "nodeOrEdgeId": "orders-db",
//!   "reason": "node type mismatch",
//!   "existingValue": "database",
//!   "incomingValue": "cache"
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::graph::{Edge, Node};

/// Node `data` fields whose disagreement blocks a merge.
pub const SIGNIFICANT_DATA_FIELDS: &[&str] = &["dbType", "protocol", "auth"];

// ---------------------------------------------------------------------------
// ConflictRecord
// ---------------------------------------------------------------------------

/// One detected disagreement between the latest snapshot and a candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Unique record id.
    pub id: Uuid,

    /// The node id or edge identity key the conflict is about.
    pub node_or_edge_id: String,

    /// Short, stable reason (`"node type mismatch"`, `"data.dbType mismatch"`,
    /// `"edge protocol mismatch"`, ...).
    pub reason: String,

    /// The value the latest snapshot holds.
    pub existing_value: Value,

    /// The value the candidate proposes.
    pub incoming_value: Value,
}

impl ConflictRecord {
    /// Create a record for one disagreement.
    #[must_use]
    pub fn new(
        node_or_edge_id: impl Into<String>,
        reason: impl Into<String>,
        existing_value: impl Into<Value>,
        incoming_value: impl Into<Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_or_edge_id: node_or_edge_id.into(),
            reason: reason.into(),
            existing_value: existing_value.into(),
            incoming_value: incoming_value.into(),
        }
    }
}

impl fmt::Display for ConflictRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (existing {}, incoming {})",
            self.node_or_edge_id, self.reason, self.existing_value, self.incoming_value
        )
    }
}

// ---------------------------------------------------------------------------
// ConflictReport
// ---------------------------------------------------------------------------

/// The complete result of one detection pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    /// Every disagreement found, in detection order.
    pub conflicts: Vec<ConflictRecord>,
}

impl ConflictReport {
    /// Returns `true` if any conflict was found.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Returns `true` if the candidate merges cleanly.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no conflicts");
        }
        writeln!(f, "{} conflict(s):", self.len())?;
        for conflict in &self.conflicts {
            writeln!(f, "  - {conflict}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// detect
// ---------------------------------------------------------------------------

/// Compare the latest snapshot's graph against a candidate.
///
/// Pass empty slices for sides a caller does not have; empty inputs produce
/// an empty report.
#[must_use]
pub fn detect(
    existing_nodes: &[Node],
    incoming_nodes: &[Node],
    existing_edges: &[Edge],
    incoming_edges: &[Edge],
) -> ConflictReport {
    let mut conflicts = Vec::new();

    let by_id: BTreeMap<&str, &Node> = existing_nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    for incoming in incoming_nodes {
        let Some(existing) = by_id.get(incoming.id.as_str()) else {
            continue;
        };
        check_node_pair(existing, incoming, &mut conflicts);
    }

    let by_key: BTreeMap<String, &Edge> = existing_edges
        .iter()
        .map(|e| (e.identity_key(), e))
        .collect();
    for incoming in incoming_edges {
        let Some(existing) = by_key.get(&incoming.identity_key()) else {
            continue;
        };
        check_edge_pair(existing, incoming, &mut conflicts);
    }

    ConflictReport { conflicts }
}

fn check_node_pair(existing: &Node, incoming: &Node, conflicts: &mut Vec<ConflictRecord>) {
    if existing.kind != incoming.kind {
        conflicts.push(ConflictRecord::new(
            &incoming.id,
            "node type mismatch",
            existing.kind.as_str(),
            incoming.kind.as_str(),
        ));
    }
    for field in SIGNIFICANT_DATA_FIELDS {
        let a = existing.data_field(field).filter(|v| value_present(v));
        let b = incoming.data_field(field).filter(|v| value_present(v));
        if let (Some(a), Some(b)) = (a, b)
            && a != b
        {
            conflicts.push(ConflictRecord::new(
                &incoming.id,
                format!("data.{field} mismatch"),
                a.clone(),
                b.clone(),
            ));
        }
    }
}

fn check_edge_pair(existing: &Edge, incoming: &Edge, conflicts: &mut Vec<ConflictRecord>) {
    let key = incoming.identity_key();
    if let (Some(a), Some(b)) = (present(&existing.protocol), present(&incoming.protocol))
        && a != b
    {
        conflicts.push(ConflictRecord::new(
            &key,
            "edge protocol mismatch",
            a,
            b,
        ));
    }
    if let (Some(a), Some(b)) = (present(&existing.auth), present(&incoming.auth))
        && a != b
    {
        conflicts.push(ConflictRecord::new(&key, "edge auth mismatch", a, b));
    }
}

/// A JSON value counts as present unless it is null or an empty string.
fn value_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
