//! Immutable snapshots: one versioned entry in a project's ledger.
//!
//! A snapshot is the full merged architecture of a project at a point in
//! time. Snapshots are never edited in place; every change appends a new one
//! with a strictly larger version. Rollback appends too, tagging the new
//! snapshot's metadata with [`ROLLED_BACK_FROM`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::graph::{Edge, GraphPayload, Node};
use super::module::{Module, ModuleStatus};
use super::types::ProjectId;

/// Metadata key marking a snapshot that replays an older version.
pub const ROLLED_BACK_FROM: &str = "rolledBackFrom";

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// A snapshot version: strictly increasing per project, never reused.
///
/// Values are wall-clock milliseconds when the clock cooperates and
/// `latest + 1` when it does not, so ordering is the only guarantee callers
/// may rely on.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Create a version from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Return the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The smallest version strictly after this one.
    #[must_use]
    pub const fn successor(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

// ---------------------------------------------------------------------------
// ModuleRef
// ---------------------------------------------------------------------------

/// A lightweight module listing embedded in a snapshot.
///
/// Snapshots record which modules existed and where their review stood when
/// the snapshot was taken; the full module documents live in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRef {
    /// Module id.
    pub id: String,
    /// Module display name.
    pub name: String,
    /// Flattening order.
    pub order: u32,
    /// Review state at snapshot time.
    pub status: ModuleStatus,
}

impl From<&Module> for ModuleRef {
    fn from(module: &Module) -> Self {
        Self {
            id: module.id.clone(),
            name: module.name.clone(),
            order: module.order,
            status: module.status,
        }
    }
}

// ---------------------------------------------------------------------------
// SnapshotContent
// ---------------------------------------------------------------------------

/// Everything a caller supplies when appending a snapshot; the ledger assigns
/// identity (project, version, creation time) on top.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotContent {
    /// Merged nodes.
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Merged edges.
    #[serde(default)]
    pub edges: Vec<Edge>,

    /// Module listing at snapshot time.
    #[serde(default)]
    pub modules: Vec<ModuleRef>,

    /// Free-form explanation of where this snapshot came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    /// Open metadata bag (`rolledBackFrom`, `mergedBy`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl SnapshotContent {
    /// Build content from a bare graph.
    #[must_use]
    pub fn from_graph(graph: GraphPayload) -> Self {
        Self {
            nodes: graph.nodes,
            edges: graph.edges,
            ..Self::default()
        }
    }

    /// Set the rationale.
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Set one metadata field.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One immutable entry in a project's ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Owning project.
    pub project_id: ProjectId,

    /// Ledger position; strictly increasing, never reused.
    pub version: Version,

    /// Merged nodes.
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Merged edges.
    #[serde(default)]
    pub edges: Vec<Edge>,

    /// Module listing at snapshot time.
    #[serde(default)]
    pub modules: Vec<ModuleRef>,

    /// Free-form explanation of where this snapshot came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    /// Open metadata bag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,

    /// When the snapshot was appended.
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Assemble a snapshot from content plus ledger-assigned identity.
    #[must_use]
    pub fn assemble(project_id: ProjectId, version: Version, content: SnapshotContent) -> Self {
        Self {
            project_id,
            version,
            nodes: content.nodes,
            edges: content.edges,
            modules: content.modules,
            rationale: content.rationale,
            metadata: content.metadata,
            created_at: Utc::now(),
        }
    }

    /// Copy this snapshot's caller-visible content back out.
    #[must_use]
    pub fn content(&self) -> SnapshotContent {
        SnapshotContent {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            modules: self.modules.clone(),
            rationale: self.rationale.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// The version this snapshot replays, if it was produced by a rollback.
    #[must_use]
    pub fn rolled_back_from(&self) -> Option<Version> {
        self.metadata
            .get(ROLLED_BACK_FROM)
            .and_then(Value::as_u64)
            .map(Version::new)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
