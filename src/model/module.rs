//! Module documents: reviewable sub-graphs with a proposal workflow.
//!
//! A project's architecture can be split into modules (auth, billing,
//! search, ...), each owning a slice of the graph. Modules move through a
//! review lifecycle, collect proposed edits from any actor, and flatten into
//! derived snapshots once every module is approved.
//!
//! # Lifecycle
//!
//! ```text
//! Proposed ──▶ Approved ──▶ Modified ──▶ Approved ...
//!     │            ▲    (accepted edit)     │
//!     ▼            └────────────────────────┘
//! Rejected (terminal)
//! ```
//!
//! Review actions move `Proposed` or `Modified` to `Approved` or `Rejected`.
//! Accepting an edit is not a review transition: it lands the module in
//! `Modified` from any non-terminal state and clears any approval stamp.
//! Edits may still be proposed against a `Rejected` module, but never
//! accepted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::graph::{Edge, GraphPayload, Node};
use super::types::ProjectId;

// ---------------------------------------------------------------------------
// ModuleStatus
// ---------------------------------------------------------------------------

/// Review state of a module.
///
/// Serialized as the capitalized variant name (`"Proposed"`, `"Modified"`,
/// ...); that spelling is wire contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleStatus {
    /// Authored but not yet reviewed.
    #[default]
    Proposed,
    /// Signed off by a reviewer.
    Approved,
    /// An edit was accepted since the last review (if any).
    Modified,
    /// Rejected by a reviewer. Terminal.
    Rejected,
}

impl ModuleStatus {
    /// Legal review transitions out of this status.
    ///
    /// Accepting an edit sets `Modified` directly and is not gated by this
    /// table; `Approved → Modified` is listed to record that an approved
    /// module is not frozen.
    #[must_use]
    pub const fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Proposed | Self::Modified => &[Self::Approved, Self::Rejected],
            Self::Approved => &[Self::Modified],
            Self::Rejected => &[],
        }
    }

    /// Check whether a transition to `target` is legal.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Returns `true` if no transition leaves this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected)
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposed => write!(f, "proposed"),
            Self::Approved => write!(f, "approved"),
            Self::Modified => write!(f, "modified"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

// ---------------------------------------------------------------------------
// EditStatus
// ---------------------------------------------------------------------------

/// Review state of a proposed edit. `Accepted` and `Rejected` are terminal;
/// a closed edit can never be reviewed again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditStatus {
    /// Awaiting review.
    #[default]
    Open,
    /// Merged into the module's canonical graph. Terminal.
    Accepted,
    /// Declined; canonical graph untouched. Terminal.
    Rejected,
}

impl EditStatus {
    /// Returns `true` if the edit is still reviewable.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if the edit has been decided.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

impl fmt::Display for EditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

// ---------------------------------------------------------------------------
// EditDiff
// ---------------------------------------------------------------------------

/// The additive payload of a proposed edit: nodes and edges to merge into
/// the module's canonical graph on acceptance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditDiff {
    /// Nodes to add or overwrite (matched by id).
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Edges to add or overwrite (matched by identity key).
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl EditDiff {
    /// Create a diff from parts.
    #[must_use]
    pub const fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Returns `true` if the diff changes nothing. Empty diffs are rejected
    /// at proposal time.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

impl From<GraphPayload> for EditDiff {
    fn from(payload: GraphPayload) -> Self {
        Self {
            nodes: payload.nodes,
            edges: payload.edges,
        }
    }
}

// ---------------------------------------------------------------------------
// ProposedEdit
// ---------------------------------------------------------------------------

/// One actor's proposed change to a module, awaiting review.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedEdit {
    /// Unique edit id.
    pub id: Uuid,

    /// Who proposed it (actor id, verbatim).
    pub author: String,

    /// What it changes.
    pub diff: EditDiff,

    /// When it was proposed.
    pub created_at: DateTime<Utc>,

    /// Review state.
    #[serde(default)]
    pub status: EditStatus,
}

impl ProposedEdit {
    /// Create a new open edit.
    #[must_use]
    pub fn new(author: impl Into<String>, diff: EditDiff) -> Self {
        Self {
            id: Uuid::new_v4(),
            author: author.into(),
            diff,
            created_at: Utc::now(),
            status: EditStatus::Open,
        }
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// A reviewable slice of a project's architecture.
///
/// The `revision` counter backs optimistic saves: the store bumps it on every
/// successful write and refuses writes whose expected revision is stale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Unique module id.
    pub id: String,

    /// Owning project.
    pub project_id: ProjectId,

    /// Display name (`auth`, `billing`, ...).
    pub name: String,

    /// Flattening order; lower comes first, later modules win collisions.
    pub order: u32,

    /// Review state.
    #[serde(default)]
    pub status: ModuleStatus,

    /// Canonical nodes of this module.
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Canonical edges of this module.
    #[serde(default)]
    pub edges: Vec<Edge>,

    /// Edits proposed against this module, open and closed.
    #[serde(default)]
    pub proposed_edits: Vec<ProposedEdit>,

    /// Reviewer who approved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,

    /// When approval happened, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    /// Optimistic-save counter, owned by the store.
    #[serde(default)]
    pub revision: u64,
}

impl Module {
    /// Create a fresh `Proposed` module with an initial graph.
    #[must_use]
    pub fn new(project_id: ProjectId, name: impl Into<String>, order: u32, graph: GraphPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id,
            name: name.into(),
            order,
            status: ModuleStatus::Proposed,
            nodes: graph.nodes,
            edges: graph.edges,
            proposed_edits: Vec::new(),
            approved_by: None,
            approved_at: None,
            revision: 0,
        }
    }

    /// Find an edit by id.
    #[must_use]
    pub fn find_edit(&self, edit_id: Uuid) -> Option<&ProposedEdit> {
        self.proposed_edits.iter().find(|e| e.id == edit_id)
    }

    /// Find an edit by id, mutably.
    #[must_use]
    pub fn find_edit_mut(&mut self, edit_id: Uuid) -> Option<&mut ProposedEdit> {
        self.proposed_edits.iter_mut().find(|e| e.id == edit_id)
    }

    /// Count edits still awaiting review.
    #[must_use]
    pub fn open_edit_count(&self) -> usize {
        self.proposed_edits
            .iter()
            .filter(|e| e.status.is_open())
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
