//! Graph primitives: nodes, edges, and candidate payloads.
//!
//! Architecture documents are graphs. Nodes carry a type (service, database,
//! queue, ...), a label, an optional canvas position, and an opaque `data` bag.
//! Edges connect node ids and optionally carry a label, protocol, and auth
//! scheme. Everything serializes as camelCase JSON, and unknown fields pass
//! through untouched so render-layer extras survive a round trip.
//!
//! # Edge identity
//!
//! Edge ids are optional in the wild, so edge identity everywhere in the crate
//! is the derived key `source->target` (or `source->target::label` when a
//! non-empty label is present). Two edges with the same key are the same edge.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A node's canvas position. Render-layer data, carried but never interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One element of an architecture graph.
///
/// # Example JSON
///
/// ```json
/// {
///   "id": "orders-db",
///   "type": "database",
///   "label": "Orders DB",
///   "position": { "x": 120.0, "y": 340.0 },
///   "data": { "dbType": "postgres" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Caller-assigned identifier; node identity for merge and conflict logic.
    pub id: String,

    /// Node type: `service`, `database`, `queue`, `cache`, ...
    #[serde(rename = "type")]
    pub kind: String,

    /// Display label.
    #[serde(default)]
    pub label: String,

    /// Canvas position, if the client supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    /// Opaque attribute bag. A few keys (`dbType`, `protocol`, `auth`) are
    /// significant to conflict detection; the rest ride along untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,

    /// Unrecognized top-level fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Node {
    /// Create a node with the given id and type.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            label: String::new(),
            position: None,
            data: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Set the display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the canvas position.
    #[must_use]
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    /// Set one `data` field.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Look up a `data` field.
    #[must_use]
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// A directed connection between two nodes.
///
/// # Example JSON
///
/// ```json
/// {
///   "source": "api",
///   "target": "orders-db",
///   "label": "reads",
///   "protocol": "tcp",
///   "auth": "mtls"
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Optional caller-assigned id. Identity is [`Edge::identity_key`], not
    /// this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Source node id.
    pub source: String,

    /// Target node id.
    pub target: String,

    /// Display label; participates in edge identity when non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Wire protocol (`http`, `grpc`, `amqp`, ...). Significant to conflict
    /// detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Auth scheme (`jwt`, `mtls`, `apiKey`, ...). Significant to conflict
    /// detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,

    /// Unrecognized top-level fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Edge {
    /// Create an edge between two node ids.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            label: None,
            protocol: None,
            auth: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Set the auth scheme.
    #[must_use]
    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    /// Derived identity key: `source->target`, or `source->target::label`
    /// when a non-empty label is present.
    #[must_use]
    pub fn identity_key(&self) -> String {
        match self.label.as_deref() {
            Some(label) if !label.is_empty() => {
                format!("{}->{}::{}", self.source, self.target, label)
            }
            _ => format!("{}->{}", self.source, self.target),
        }
    }
}

// ---------------------------------------------------------------------------
// GraphPayload
// ---------------------------------------------------------------------------

/// A candidate graph as submitted by a client or generator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPayload {
    /// Candidate nodes.
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Candidate edges.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphPayload {
    /// Create a payload from parts.
    #[must_use]
    pub const fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Returns `true` if the payload carries neither nodes nor edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Boundary normalization for untrusted payloads.
    ///
    /// - Nodes with an empty id are dropped; duplicate ids collapse,
    ///   last occurrence wins.
    /// - Edges with an empty endpoint, or an endpoint that names no node in
    ///   this payload, are dropped. Duplicate identity keys collapse, last
    ///   occurrence wins.
    ///
    /// Unknown fields are never a reason to reject anything. Output is
    /// ordered by id/key; callers must not read meaning into ordering.
    #[must_use]
    pub fn normalized(self) -> Self {
        let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
        for node in self.nodes {
            if node.id.is_empty() {
                continue;
            }
            nodes.insert(node.id.clone(), node);
        }

        let ids: BTreeSet<&String> = nodes.keys().collect();
        let mut edges: BTreeMap<String, Edge> = BTreeMap::new();
        for edge in self.edges {
            if edge.source.is_empty() || edge.target.is_empty() {
                continue;
            }
            if !ids.contains(&edge.source) || !ids.contains(&edge.target) {
                continue;
            }
            edges.insert(edge.identity_key(), edge);
        }

        Self {
            nodes: nodes.into_values().collect(),
            edges: edges.into_values().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
