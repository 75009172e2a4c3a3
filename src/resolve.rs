//! Conflict-checked merging of candidate graphs into the ledger.
//!
//! [`ResolutionService::resolve`] is the write path every generated or
//! hand-drawn graph goes through: check the candidate against the current
//! head, and either merge it into a new snapshot or hand back the conflicts.
//! A blocked merge is a first-class outcome, not an error; the caller decides
//! whether to rework the candidate or override field by field.
//!
//! The check and the append are pinned to the same observed head. If another
//! writer lands a snapshot between the two, the compare-and-append loses and
//! the whole cycle reruns against the new head, so conflicts are always
//! judged against the state that was actually current at commit time.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::VellumError;
use crate::audit::{AuditAction, AuditEntry, AuditTrail};
use crate::ledger::{RetryPolicy, next_version};
use crate::model::conflict::{ConflictReport, detect};
use crate::model::graph::GraphPayload;
use crate::model::merge::union_graph;
use crate::model::snapshot::{Snapshot, SnapshotContent};
use crate::model::types::{Actor, ProjectId};
use crate::notify::{Notifier, NotifyEvent};
use crate::store::ProjectStore;

// ---------------------------------------------------------------------------
// Options and outcome
// ---------------------------------------------------------------------------

/// Caller-supplied trimmings for a merge attempt.
#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
    /// Why this change was made; lands on the snapshot verbatim.
    pub rationale: Option<String>,

    /// Extra snapshot metadata. The service's own `mergedBy` stamp wins a
    /// key collision.
    pub metadata: BTreeMap<String, Value>,
}

impl ResolveOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rationale.
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Add one metadata field.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// What a merge attempt produced.
#[derive(Clone, Debug)]
pub enum ResolveOutcome {
    /// The candidate merged cleanly; this snapshot is the new head.
    Merged(Snapshot),
    /// The candidate disagrees with the current state; nothing was written.
    Conflicted(ConflictReport),
}

impl ResolveOutcome {
    /// Returns `true` for a clean merge.
    #[must_use]
    pub const fn is_merged(&self) -> bool {
        matches!(self, Self::Merged(_))
    }

    /// The new snapshot, if the merge succeeded.
    #[must_use]
    pub const fn merged(&self) -> Option<&Snapshot> {
        match self {
            Self::Merged(snapshot) => Some(snapshot),
            Self::Conflicted(_) => None,
        }
    }

    /// The blocking conflicts, if any.
    #[must_use]
    pub const fn conflicts(&self) -> Option<&ConflictReport> {
        match self {
            Self::Merged(_) => None,
            Self::Conflicted(report) => Some(report),
        }
    }
}

// ---------------------------------------------------------------------------
// ResolutionService
// ---------------------------------------------------------------------------

/// The conflict-checked write path for candidate graphs.
pub struct ResolutionService<'a, S: ProjectStore + ?Sized> {
    store: &'a S,
    retry: RetryPolicy,
    notifier: Option<&'a dyn Notifier>,
}

impl<'a, S: ProjectStore + ?Sized> ResolutionService<'a, S> {
    /// Wrap a store with the default retry policy and no notifier.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            notifier: None,
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach a notification channel.
    #[must_use]
    pub const fn with_notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn audit(&self) -> AuditTrail<'a, S> {
        AuditTrail::new(self.store)
    }

    fn notify(&self, event: NotifyEvent) {
        if let Some(notifier) = self.notifier
            && let Err(err) = notifier.notify(&event)
        {
            warn!(error = %err, "notification failed; continuing");
        }
    }

    /// Merge `candidate` into the project, or report why it cannot merge.
    ///
    /// The project must already have a head snapshot; candidates are always
    /// judged against recorded state, never against nothing.
    ///
    /// Exactly one audit entry is written per call that reaches a decision:
    /// `merge_completed` with the new version, or `merge_conflict_detected`
    /// with the full conflict list.
    ///
    /// # Errors
    /// [`VellumError::SnapshotNotFound`] for an empty or unknown project;
    /// [`VellumError::Contended`] when every attempt lost the head race.
    /// Conflicts are NOT an error; they come back as
    /// [`ResolveOutcome::Conflicted`].
    #[instrument(skip(self, candidate, options), fields(project = %project, actor = %actor.id))]
    pub fn resolve(
        &self,
        project: &ProjectId,
        actor: &Actor,
        candidate: GraphPayload,
        options: &ResolveOptions,
    ) -> Result<ResolveOutcome, VellumError> {
        let candidate = candidate.normalized();

        for attempt in 1..=self.retry.max_attempts {
            let head = self.store.latest_snapshot(project)?.ok_or_else(|| {
                VellumError::SnapshotNotFound {
                    project: project.clone(),
                }
            })?;

            let report = detect(&head.nodes, &candidate.nodes, &head.edges, &candidate.edges);
            if report.has_conflicts() {
                info!(conflicts = report.len(), "merge blocked by conflicts");
                self.audit().record_or_warn(
                    AuditEntry::new(
                        project.clone(),
                        actor.id.clone(),
                        AuditAction::MergeConflictDetected,
                    )
                    .with_detail("conflictCount", report.len())
                    .with_detail(
                        "conflicts",
                        serde_json::to_value(&report.conflicts)
                            .unwrap_or_else(|_| Value::from(report.len())),
                    ),
                );
                self.notify(NotifyEvent::MergeBlocked {
                    project: project.clone(),
                    conflicts: report.len(),
                    actor: actor.id.clone(),
                });
                return Ok(ResolveOutcome::Conflicted(report));
            }

            let (nodes, edges) =
                union_graph(&head.nodes, &head.edges, &candidate.nodes, &candidate.edges);

            let mut content = SnapshotContent::from_graph(GraphPayload::new(nodes, edges));
            // Module listing carries over unchanged; merging a candidate graph
            // says nothing about module review state.
            content.modules = head.modules.clone();
            content.rationale = options.rationale.clone();
            content.metadata = options.metadata.clone();
            content
                .metadata
                .insert("mergedBy".to_owned(), Value::from(actor.id.clone()));

            let expected = Some(head.version);
            let version = next_version(expected);
            let snapshot = Snapshot::assemble(project.clone(), version, content);

            match self.store.append_snapshot(expected, &snapshot) {
                Ok(()) => {
                    self.audit().record_or_warn(
                        AuditEntry::new(
                            project.clone(),
                            actor.id.clone(),
                            AuditAction::MergeCompleted,
                        )
                        .with_detail("version", version.get())
                        .with_detail("nodes", snapshot.nodes.len())
                        .with_detail("edges", snapshot.edges.len()),
                    );
                    self.notify(NotifyEvent::SnapshotMerged {
                        project: project.clone(),
                        version,
                        actor: actor.id.clone(),
                    });
                    return Ok(ResolveOutcome::Merged(snapshot));
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    debug!(attempt, error = %err, "merge lost the head race; rechecking");
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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
