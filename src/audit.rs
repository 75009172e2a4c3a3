//! Append-only audit trail of every mutation.
//!
//! Each completed mutation produces exactly one [`AuditEntry`]: who did what
//! to which project, with enough detail to reconstruct the decision later.
//! A merge blocked by conflicts is itself a recorded event
//! ([`AuditAction::MergeConflictDetected`]), even though no snapshot was
//! written.
//!
//! Audit writes are best-effort: [`AuditTrail::record_or_warn`] logs a
//! warning on failure and never aborts or rolls back the operation that
//! produced the entry.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::model::types::ProjectId;
use crate::store::{ProjectStore, StoreError};

// ---------------------------------------------------------------------------
// AuditAction
// ---------------------------------------------------------------------------

/// What happened. Serialized snake_case; the spellings are wire contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A snapshot was appended to the ledger.
    SnapshotAppended,
    /// An old version was replayed as a new snapshot.
    RollbackPerformed,
    /// A module document was created.
    ModuleCreated,
    /// An edit was proposed against a module.
    EditProposed,
    /// An open edit was accepted and merged.
    EditAccepted,
    /// An open edit was rejected.
    EditRejected,
    /// A module was approved by a reviewer.
    ModuleApproved,
    /// A module was rejected by a reviewer.
    ModuleRejected,
    /// All approved modules were flattened into a snapshot.
    SnapshotDerived,
    /// A candidate merge was blocked by conflicts; nothing was written.
    MergeConflictDetected,
    /// A candidate merged cleanly into a new snapshot.
    MergeCompleted,
}

impl AuditAction {
    /// The wire spelling of this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SnapshotAppended => "snapshot_appended",
            Self::RollbackPerformed => "rollback_performed",
            Self::ModuleCreated => "module_created",
            Self::EditProposed => "edit_proposed",
            Self::EditAccepted => "edit_accepted",
            Self::EditRejected => "edit_rejected",
            Self::ModuleApproved => "module_approved",
            Self::ModuleRejected => "module_rejected",
            Self::SnapshotDerived => "snapshot_derived",
            Self::MergeConflictDetected => "merge_conflict_detected",
            Self::MergeCompleted => "merge_completed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// One recorded mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique entry id.
    pub id: Uuid,

    /// The project the mutation touched.
    pub project_id: ProjectId,

    /// Acting identity (actor id, verbatim).
    pub actor: String,

    /// What happened.
    pub action: AuditAction,

    /// Action-specific detail (new version, conflict list, counts, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,

    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an entry stamped now.
    #[must_use]
    pub fn new(project_id: ProjectId, actor: impl Into<String>, action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            actor: actor.into(),
            action,
            details: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach one detail field.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.project_id,
            self.action,
            self.actor
        )
    }
}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

/// Append/scan access to a project's audit history.
pub struct AuditTrail<'a, S: ProjectStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ProjectStore + ?Sized> AuditTrail<'a, S> {
    /// Wrap a store.
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Append an entry.
    ///
    /// # Errors
    /// Propagates the store failure. Primary operations should prefer
    /// [`Self::record_or_warn`].
    pub fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.store.append_audit(&entry)
    }

    /// Append an entry, logging a warning instead of failing.
    ///
    /// The audit trail is best-effort: the mutation it describes has already
    /// committed and must not be rolled back over a bookkeeping failure.
    pub fn record_or_warn(&self, entry: AuditEntry) {
        let action = entry.action;
        let project = entry.project_id.clone();
        if let Err(err) = self.record(entry) {
            warn!(%project, %action, error = %err, "audit write failed; continuing");
        }
    }

    /// The most recent entries for a project, newest first.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn recent(&self, project: &ProjectId, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let mut entries = self.store.audit_entries(project)?;
        entries.truncate(limit);
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn project() -> ProjectId {
        ProjectId::new("webshop").unwrap()
    }

    // -- AuditAction --

    #[test]
    fn action_wire_spellings() {
        assert_eq!(
            AuditAction::MergeConflictDetected.as_str(),
            "merge_conflict_detected"
        );
        assert_eq!(AuditAction::MergeCompleted.as_str(), "merge_completed");
        assert_eq!(AuditAction::SnapshotAppended.as_str(), "snapshot_appended");
    }

    #[test]
    fn action_serde_matches_as_str() {
        for action in [
            AuditAction::SnapshotAppended,
            AuditAction::RollbackPerformed,
            AuditAction::ModuleCreated,
            AuditAction::EditProposed,
            AuditAction::EditAccepted,
            AuditAction::EditRejected,
            AuditAction::ModuleApproved,
            AuditAction::ModuleRejected,
            AuditAction::SnapshotDerived,
            AuditAction::MergeConflictDetected,
            AuditAction::MergeCompleted,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
        }
    }

    // -- AuditEntry --

    #[test]
    fn entry_construction() {
        let entry = AuditEntry::new(project(), "alice", AuditAction::MergeCompleted)
            .with_detail("version", 42u64);
        assert_eq!(entry.actor, "alice");
        assert_eq!(entry.details.get("version"), Some(&Value::from(42u64)));
    }

    #[test]
    fn entry_serde_camel_case() {
        let entry = AuditEntry::new(project(), "alice", AuditAction::SnapshotAppended);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"projectId\":\"webshop\""));
        assert!(json.contains("\"action\":\"snapshot_appended\""));
        assert!(json.contains("\"timestamp\""));
        assert!(!json.contains("\"details\""));
    }

    // -- AuditTrail --

    #[test]
    fn record_and_read_back() {
        let store = MemoryStore::new();
        let trail = AuditTrail::new(&store);

        trail
            .record(AuditEntry::new(project(), "alice", AuditAction::ModuleCreated))
            .unwrap();
        trail
            .record(AuditEntry::new(project(), "bob", AuditAction::EditProposed))
            .unwrap();

        let entries = trail.recent(&project(), 10).unwrap();
        assert_eq!(entries.len(), 2);
        // Newest first.
        assert_eq!(entries[0].action, AuditAction::EditProposed);
        assert_eq!(entries[1].action, AuditAction::ModuleCreated);
    }

    #[test]
    fn recent_respects_limit() {
        let store = MemoryStore::new();
        let trail = AuditTrail::new(&store);
        for _ in 0..5 {
            trail
                .record(AuditEntry::new(project(), "alice", AuditAction::EditProposed))
                .unwrap();
        }
        assert_eq!(trail.recent(&project(), 2).unwrap().len(), 2);
    }

    #[test]
    fn recent_for_unknown_project_is_empty() {
        let store = MemoryStore::new();
        let trail = AuditTrail::new(&store);
        assert!(trail.recent(&project(), 10).unwrap().is_empty());
    }
}
