//! Outbound notifications for review-relevant events.
//!
//! Delivery is strictly after the state change commits and is fire-and-
//! forget: a failed notification is logged and dropped, never retried, and
//! never fails the operation that triggered it.

use std::fmt;

use crate::model::snapshot::Version;
use crate::model::types::ProjectId;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// NotifyEvent
// ---------------------------------------------------------------------------

/// Something a collaborator may want to hear about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotifyEvent {
    /// A new edit awaits review.
    EditProposed {
        project: ProjectId,
        module: String,
        edit: Uuid,
        author: String,
    },
    /// An edit was accepted or rejected.
    EditDecided {
        project: ProjectId,
        module: String,
        edit: Uuid,
        author: String,
        reviewer: String,
        accepted: bool,
    },
    /// A module was approved or rejected.
    ModuleDecided {
        project: ProjectId,
        module: String,
        reviewer: String,
        approved: bool,
    },
    /// A candidate graph merged into a new snapshot.
    SnapshotMerged {
        project: ProjectId,
        version: Version,
        actor: String,
    },
    /// A candidate graph was blocked by conflicts.
    MergeBlocked {
        project: ProjectId,
        conflicts: usize,
        actor: String,
    },
}

impl fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EditProposed {
                project,
                module,
                edit,
                author,
            } => write!(f, "{project}: {author} proposed edit {edit} on module '{module}'"),
            Self::EditDecided {
                project,
                module,
                edit,
                reviewer,
                accepted,
                ..
            } => {
                let verb = if *accepted { "accepted" } else { "rejected" };
                write!(f, "{project}: {reviewer} {verb} edit {edit} on module '{module}'")
            }
            Self::ModuleDecided {
                project,
                module,
                reviewer,
                approved,
            } => {
                let verb = if *approved { "approved" } else { "rejected" };
                write!(f, "{project}: {reviewer} {verb} module '{module}'")
            }
            Self::SnapshotMerged {
                project,
                version,
                actor,
            } => write!(f, "{project}: {actor} merged snapshot version {version}"),
            Self::MergeBlocked {
                project,
                conflicts,
                actor,
            } => write!(
                f,
                "{project}: merge by {actor} blocked by {conflicts} conflict(s)"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Delivery failure. Callers log it and move on.
#[derive(Debug)]
pub struct NotifyError {
    /// What the channel reported.
    pub reason: String,
}

impl NotifyError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification delivery failed: {}", self.reason)
    }
}

impl std::error::Error for NotifyError {}

/// A delivery channel for [`NotifyEvent`]s.
pub trait Notifier: Send + Sync {
    /// Deliver one event.
    ///
    /// # Errors
    /// Channel failures. The caller never retries; it logs and continues.
    fn notify(&self, event: &NotifyEvent) -> Result<(), NotifyError>;
}

/// Default channel: the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &NotifyEvent) -> Result<(), NotifyError> {
        tracing::info!(target: "vellum::notify", "{event}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
