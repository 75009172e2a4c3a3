//! Append-only snapshot ledger.
//!
//! Every saved state of a project is a full [`Snapshot`] at a strictly
//! increasing version. The ledger never rewrites history: edits append, and
//! a rollback replays an old version as a brand-new head.
//!
//! Versions double as rough timestamps. A new version is
//! `max(now_ms, latest + 1)`, so concurrent writers on skewed clocks still
//! produce a strictly increasing sequence.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use rand::Rng as _;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::VellumError;
use crate::audit::{AuditAction, AuditEntry, AuditTrail};
use crate::model::snapshot::{ROLLED_BACK_FROM, Snapshot, SnapshotContent, Version};
use crate::model::types::{Actor, ProjectId};
use crate::store::{ProjectStore, StoreError};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry with full-jitter exponential backoff.
///
/// Used wherever a compare-and-append can lose to a concurrent writer.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts before giving up.
    pub max_attempts: u32,
    /// Backoff ceiling for the first retry; doubles per attempt.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Sleep duration before retry number `attempt` (1-based): uniformly
    /// random in `0..=base * 2^(attempt-1)`.
    ///
    /// The randomness is the point: two writers that lost to each other
    /// must not wake in lockstep and lose again.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(10);
        let ceiling = self
            .base_backoff
            .saturating_mul(1_u32 << shift)
            .as_millis();
        let ceiling = u64::try_from(ceiling).unwrap_or(u64::MAX);
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(0..=ceiling))
    }
}

// ---------------------------------------------------------------------------
// SnapshotLedger
// ---------------------------------------------------------------------------

/// Read/append access to one store's snapshot history.
pub struct SnapshotLedger<'a, S: ProjectStore + ?Sized> {
    store: &'a S,
    retry: RetryPolicy,
}

impl<'a, S: ProjectStore + ?Sized> SnapshotLedger<'a, S> {
    /// Wrap a store with the default retry policy.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Wrap a store with an explicit retry policy.
    pub const fn with_retry(store: &'a S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    fn audit(&self) -> AuditTrail<'a, S> {
        AuditTrail::new(self.store)
    }

    /// Append `content` as the project's new head.
    ///
    /// Reads the current head, assembles a snapshot one version past it, and
    /// compare-and-appends; lost races are retried with backoff until the
    /// policy is exhausted, then surface as [`VellumError::Contended`].
    ///
    /// # Errors
    /// `Contended` after exhausting retries; store failures otherwise.
    #[instrument(skip(self, content), fields(project = %project))]
    pub fn append(
        &self,
        project: &ProjectId,
        actor: &Actor,
        content: SnapshotContent,
    ) -> Result<Snapshot, VellumError> {
        self.append_audited(project, actor, content, AuditAction::SnapshotAppended, &[])
    }

    /// Append a fully assembled snapshot against an exact expected head.
    ///
    /// Single shot: no retry, no audit entry. Callers that need to pin the
    /// head they validated against (merge resolution does) drive their own
    /// retry loop around this.
    ///
    /// # Errors
    /// [`StoreError::HeadMoved`] when the head is no longer `expected_head`.
    pub fn append_at(
        &self,
        expected_head: Option<Version>,
        snapshot: &Snapshot,
    ) -> Result<(), StoreError> {
        self.store.append_snapshot(expected_head, snapshot)
    }

    /// The current head snapshot.
    ///
    /// # Errors
    /// [`VellumError::SnapshotNotFound`] for an empty or unknown project.
    pub fn latest(&self, project: &ProjectId) -> Result<Snapshot, VellumError> {
        self.store
            .latest_snapshot(project)?
            .ok_or_else(|| VellumError::SnapshotNotFound {
                project: project.clone(),
            })
    }

    /// One specific version.
    ///
    /// # Errors
    /// [`VellumError::VersionNotFound`] if that version was never written.
    pub fn get(&self, project: &ProjectId, version: Version) -> Result<Snapshot, VellumError> {
        self.store
            .snapshot(project, version)?
            .ok_or_else(|| VellumError::VersionNotFound {
                project: project.clone(),
                version,
            })
    }

    /// Every snapshot, newest first. Empty for an unknown project.
    ///
    /// # Errors
    /// Store failures only.
    pub fn history(&self, project: &ProjectId) -> Result<Vec<Snapshot>, VellumError> {
        Ok(self.store.snapshot_history(project)?)
    }

    /// Structural delta between two stored versions.
    ///
    /// # Errors
    /// [`VellumError::VersionNotFound`] if either endpoint is absent.
    pub fn diff(
        &self,
        project: &ProjectId,
        from: Version,
        to: Version,
    ) -> Result<crate::model::diff::SnapshotDelta, VellumError> {
        let before = self.get(project, from)?;
        let after = self.get(project, to)?;
        Ok(crate::model::diff::SnapshotDelta::between(&before, &after))
    }

    /// Replay version `to` as a new head snapshot.
    ///
    /// The replayed content is carried verbatim, including its rationale
    /// unless the caller supplies a new one. Metadata is rebuilt from
    /// scratch: exactly one `rolledBackFrom` marker pointing at the
    /// replayed version. History stays intact; nothing is deleted.
    ///
    /// # Errors
    /// [`VellumError::VersionNotFound`] if `to` is absent; `Contended` after
    /// exhausting retries.
    #[instrument(skip(self), fields(project = %project, to = %to))]
    pub fn rollback(
        &self,
        project: &ProjectId,
        actor: &Actor,
        to: Version,
        rationale: Option<String>,
    ) -> Result<Snapshot, VellumError> {
        let target = self.get(project, to)?;
        let mut content = target.content();
        if rationale.is_some() {
            content.rationale = rationale;
        }
        content.metadata = BTreeMap::from([(ROLLED_BACK_FROM.to_owned(), Value::from(to.get()))]);
        self.append_audited(
            project,
            actor,
            content,
            AuditAction::RollbackPerformed,
            &[("rolledBackFrom", Value::from(to.get()))],
        )
    }

    /// Shared append loop: read head, assemble, compare-and-append, audit
    /// once on success.
    pub(crate) fn append_audited(
        &self,
        project: &ProjectId,
        actor: &Actor,
        content: SnapshotContent,
        action: AuditAction,
        extra_details: &[(&str, Value)],
    ) -> Result<Snapshot, VellumError> {
        for attempt in 1..=self.retry.max_attempts {
            let expected = self.store.latest_snapshot(project)?.map(|s| s.version);
            let version = next_version(expected);
            let snapshot = Snapshot::assemble(project.clone(), version, content.clone());
            match self.store.append_snapshot(expected, &snapshot) {
                Ok(()) => {
                    let mut entry = AuditEntry::new(project.clone(), actor.id.clone(), action)
                        .with_detail("version", version.get());
                    for (key, value) in extra_details {
                        entry = entry.with_detail(*key, value.clone());
                    }
                    self.audit().record_or_warn(entry);
                    return Ok(snapshot);
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    debug!(attempt, error = %err, "append lost the head race; retrying");
                    std::thread::sleep(self.retry.backoff(attempt));
                }
                Err(err) if err.is_transient() => break,
                Err(err) => return Err(err.into()),
            }
        }
        Err(VellumError::Contended {
            project: project.clone(),
            attempts: self.retry.max_attempts,
        })
    }
}

/// Next version for a ledger whose head is `latest`: wall-clock milliseconds,
/// bumped past the head if the clock stalls or runs behind.
#[must_use]
pub fn next_version(latest: Option<Version>) -> Version {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    let floor = latest.map_or(1, |v| v.get() + 1);
    Version::new(now.max(floor))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{GraphPayload, Node};
    use crate::model::types::Role;
    use crate::store::MemoryStore;

    fn project() -> ProjectId {
        ProjectId::new("webshop").unwrap()
    }

    fn alice() -> Actor {
        Actor::new("alice", Role::Student)
    }

    fn graph_of(ids: &[&str]) -> GraphPayload {
        GraphPayload::new(
            ids.iter().map(|id| Node::new(*id, "service")).collect(),
            vec![],
        )
    }

    fn content_of(ids: &[&str]) -> SnapshotContent {
        SnapshotContent::from_graph(graph_of(ids))
    }

    // -- version scheme --

    #[test]
    fn version_tracks_wall_clock() {
        let before = u64::try_from(Utc::now().timestamp_millis()).unwrap();
        let version = next_version(None);
        let after = u64::try_from(Utc::now().timestamp_millis()).unwrap();
        assert!(version.get() >= before && version.get() <= after);
    }

    #[test]
    fn version_bumps_past_a_future_head() {
        let far_future = u64::MAX - 10;
        let version = next_version(Some(Version::new(far_future)));
        assert_eq!(version.get(), far_future + 1);
    }

    // -- append --

    #[test]
    fn append_then_latest_round_trips() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);

        let written = ledger
            .append(&project(), &alice(), content_of(&["api"]))
            .unwrap();
        let head = ledger.latest(&project()).unwrap();
        assert_eq!(head.version, written.version);
        assert_eq!(head.nodes.len(), 1);
    }

    #[test]
    fn appends_are_strictly_increasing() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);

        let first = ledger
            .append(&project(), &alice(), content_of(&["api"]))
            .unwrap();
        let second = ledger
            .append(&project(), &alice(), content_of(&["api", "db"]))
            .unwrap();
        assert!(second.version > first.version);
    }

    #[test]
    fn append_writes_one_audit_entry() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);

        let written = ledger
            .append(&project(), &alice(), content_of(&["api"]))
            .unwrap();

        let entries = AuditTrail::new(&store).recent(&project(), 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::SnapshotAppended);
        assert_eq!(
            entries[0].details.get("version"),
            Some(&Value::from(written.version.get()))
        );
    }

    #[test]
    fn latest_on_empty_project_is_not_found() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);
        let err = ledger.latest(&project()).unwrap_err();
        assert!(matches!(err, VellumError::SnapshotNotFound { .. }));
    }

    #[test]
    fn get_unknown_version_is_not_found() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);
        ledger
            .append(&project(), &alice(), content_of(&["api"]))
            .unwrap();
        let err = ledger.get(&project(), Version::new(1)).unwrap_err();
        assert!(matches!(err, VellumError::VersionNotFound { .. }));
    }

    // -- diff --

    #[test]
    fn diff_between_versions() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);

        let v1 = ledger
            .append(&project(), &alice(), content_of(&["api"]))
            .unwrap();
        let v2 = ledger
            .append(&project(), &alice(), content_of(&["api", "db"]))
            .unwrap();

        let delta = ledger.diff(&project(), v1.version, v2.version).unwrap();
        assert_eq!(delta.added_nodes.len(), 1);
        assert_eq!(delta.added_nodes[0].id, "db");
        assert!(delta.removed_nodes.is_empty());
    }

    // -- rollback --

    #[test]
    fn rollback_replays_old_content_as_new_head() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);

        let v1 = ledger
            .append(&project(), &alice(), content_of(&["api"]))
            .unwrap();
        let v2 = ledger
            .append(&project(), &alice(), content_of(&["api", "db"]))
            .unwrap();

        let restored = ledger
            .rollback(&project(), &alice(), v1.version, None)
            .unwrap();

        assert!(restored.version > v2.version);
        assert_eq!(restored.nodes.len(), 1);
        assert_eq!(restored.rolled_back_from(), Some(v1.version));
        // History keeps all three versions.
        assert_eq!(ledger.history(&project()).unwrap().len(), 3);
    }

    #[test]
    fn rollback_keeps_the_target_rationale() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);

        let mut content = content_of(&["api"]);
        content.rationale = Some("initial import".to_owned());
        let v1 = ledger.append(&project(), &alice(), content).unwrap();
        ledger
            .append(&project(), &alice(), content_of(&["api", "db"]))
            .unwrap();

        let restored = ledger
            .rollback(&project(), &alice(), v1.version, None)
            .unwrap();
        assert_eq!(restored.rationale.as_deref(), Some("initial import"));
    }

    #[test]
    fn rollback_rationale_override_wins() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);

        let mut content = content_of(&["api"]);
        content.rationale = Some("initial import".to_owned());
        let v1 = ledger.append(&project(), &alice(), content).unwrap();

        let restored = ledger
            .rollback(
                &project(),
                &alice(),
                v1.version,
                Some("undo the bad merge".to_owned()),
            )
            .unwrap();
        assert_eq!(restored.rationale.as_deref(), Some("undo the bad merge"));
    }

    #[test]
    fn rollback_does_not_inherit_old_metadata() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);

        let content = content_of(&["api"])
            .with_metadata("mergedBy", Value::from("bot"));
        let v1 = ledger.append(&project(), &alice(), content).unwrap();

        let restored = ledger
            .rollback(&project(), &alice(), v1.version, None)
            .unwrap();
        assert!(!restored.metadata.contains_key("mergedBy"));
        assert_eq!(restored.metadata.len(), 1);
    }

    #[test]
    fn rollback_audits_rollback_performed() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);

        let v1 = ledger
            .append(&project(), &alice(), content_of(&["api"]))
            .unwrap();
        ledger
            .rollback(&project(), &alice(), v1.version, None)
            .unwrap();

        let entries = AuditTrail::new(&store).recent(&project(), 10).unwrap();
        assert_eq!(entries[0].action, AuditAction::RollbackPerformed);
        assert_eq!(
            entries[0].details.get("rolledBackFrom"),
            Some(&Value::from(v1.version.get()))
        );
    }

    #[test]
    fn rollback_to_unknown_version_fails() {
        let store = MemoryStore::new();
        let ledger = SnapshotLedger::new(&store);
        let err = ledger
            .rollback(&project(), &alice(), Version::new(123), None)
            .unwrap_err();
        assert!(matches!(err, VellumError::VersionNotFound { .. }));
    }

    // -- contention --

    /// Store whose appends always lose the head race.
    struct CrowdedStore(MemoryStore);

    impl ProjectStore for CrowdedStore {
        fn append_snapshot(
            &self,
            expected_head: Option<Version>,
            snapshot: &Snapshot,
        ) -> Result<(), StoreError> {
            let _ = expected_head;
            Err(StoreError::head_moved(
                snapshot.project_id.clone(),
                expected_head,
                Some(Version::new(u64::MAX)),
            ))
        }
        fn snapshot(
            &self,
            project: &ProjectId,
            version: Version,
        ) -> Result<Option<Snapshot>, StoreError> {
            self.0.snapshot(project, version)
        }
        fn latest_snapshot(&self, project: &ProjectId) -> Result<Option<Snapshot>, StoreError> {
            self.0.latest_snapshot(project)
        }
        fn snapshot_history(&self, project: &ProjectId) -> Result<Vec<Snapshot>, StoreError> {
            self.0.snapshot_history(project)
        }
        fn put_module(
            &self,
            expected_revision: Option<u64>,
            module: &crate::model::module::Module,
        ) -> Result<crate::model::module::Module, StoreError> {
            self.0.put_module(expected_revision, module)
        }
        fn module(
            &self,
            project: &ProjectId,
            module_id: &str,
        ) -> Result<Option<crate::model::module::Module>, StoreError> {
            self.0.module(project, module_id)
        }
        fn modules(
            &self,
            project: &ProjectId,
        ) -> Result<Vec<crate::model::module::Module>, StoreError> {
            self.0.modules(project)
        }
        fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
            self.0.append_audit(entry)
        }
        fn audit_entries(&self, project: &ProjectId) -> Result<Vec<AuditEntry>, StoreError> {
            self.0.audit_entries(project)
        }
    }

    #[test]
    fn exhausted_retries_surface_as_contended() {
        let store = CrowdedStore(MemoryStore::new());
        let retry = RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        };
        let ledger = SnapshotLedger::with_retry(&store, retry);

        let err = ledger
            .append(&project(), &alice(), content_of(&["api"]))
            .unwrap_err();
        assert!(matches!(err, VellumError::Contended { attempts: 3, .. }));
    }

    #[test]
    fn backoff_stays_under_ceiling() {
        let retry = RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(8),
        };
        for attempt in 1..=5 {
            let ceiling = Duration::from_millis(8 * (1 << (attempt - 1)));
            for _ in 0..32 {
                assert!(retry.backoff(attempt) <= ceiling);
            }
        }
    }
}
