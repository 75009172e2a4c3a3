//! Error types for vellum operations.
//!
//! Defines [`VellumError`], the unified error type for ledger, workflow, and
//! resolution operations. Error messages are written for the people (and
//! agents) driving the CLI: each variant describes what went wrong and what
//! to do next without additional context.
//!
//! Detected merge conflicts are NOT an error — they are a successful
//! [`ResolveOutcome::Conflicted`](crate::resolve::ResolveOutcome) result.
//! This enum covers the cases where an operation genuinely could not run.

use std::fmt;

use uuid::Uuid;

use crate::model::module::{EditStatus, ModuleStatus};
use crate::model::snapshot::Version;
use crate::model::types::{ProjectId, Role, ValidationError};
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// VellumError
// ---------------------------------------------------------------------------

/// Unified error type for vellum operations.
///
/// Each variant is self-contained: a caller receiving this error should be
/// able to understand what happened and what to do next without digging.
#[derive(Debug)]
pub enum VellumError {
    /// The project has no snapshots (unknown project or empty ledger).
    SnapshotNotFound {
        /// The project whose ledger is empty.
        project: ProjectId,
    },

    /// The requested snapshot version does not exist.
    VersionNotFound {
        /// The project that was searched.
        project: ProjectId,
        /// The version that was not found.
        version: Version,
    },

    /// The requested module does not exist.
    ModuleNotFound {
        /// The project that was searched.
        project: ProjectId,
        /// The module id or name that was not found.
        module: String,
    },

    /// A module with this name already exists in the project.
    ModuleExists {
        /// The project holding the duplicate.
        project: ProjectId,
        /// The name that is already taken.
        name: String,
    },

    /// The requested proposed edit does not exist on the module.
    EditNotFound {
        /// The module that was searched.
        module: String,
        /// The edit id that was not found.
        edit: Uuid,
    },

    /// The edit has already been accepted or rejected.
    EditClosed {
        /// The edit that is closed.
        edit: Uuid,
        /// Its final status.
        status: EditStatus,
    },

    /// The requested module status change is not a legal transition.
    InvalidTransition {
        /// The module whose status was challenged.
        module: String,
        /// Current status.
        from: ModuleStatus,
        /// Requested status.
        to: ModuleStatus,
    },

    /// The acting role may not perform this review action.
    ReviewRequired {
        /// What was attempted (e.g. `"accept edit"`).
        action: String,
        /// Who attempted it.
        actor: String,
        /// The role they carried.
        role: Role,
    },

    /// A proposed edit carried neither nodes nor edges.
    EmptyDiff,

    /// Flattening requires every module to be approved first.
    ModulesNotApproved {
        /// Names of modules still awaiting approval.
        pending: Vec<String>,
    },

    /// Optimistic retries were exhausted; another writer kept winning.
    Contended {
        /// The contended project.
        project: ProjectId,
        /// How many attempts were made before giving up.
        attempts: u32,
    },

    /// A graph source failed to produce a candidate.
    Generator {
        /// The source that failed.
        source: String,
        /// What it reported.
        reason: String,
    },

    /// An identifier failed validation.
    Validation(ValidationError),

    /// The persistence layer failed.
    Store(StoreError),
}

// ---------------------------------------------------------------------------
// Display — actionable error messages
// ---------------------------------------------------------------------------

impl fmt::Display for VellumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SnapshotNotFound { project } => {
                write!(
                    f,
                    "project '{project}' has no snapshots.\n  To fix: initialize the ledger first:\n    vellum init {project} --file graph.json"
                )
            }
            Self::VersionNotFound { project, version } => {
                write!(
                    f,
                    "version {version} not found in project '{project}'.\n  To fix: list known versions:\n    vellum history {project}"
                )
            }
            Self::ModuleNotFound { project, module } => {
                write!(
                    f,
                    "module '{module}' not found in project '{project}'.\n  To fix: list modules:\n    vellum module list {project}"
                )
            }
            Self::ModuleExists { project, name } => {
                write!(
                    f,
                    "module '{name}' already exists in project '{project}'.\n  To fix: pick a different name, or propose an edit against the existing module."
                )
            }
            Self::EditNotFound { module, edit } => {
                write!(
                    f,
                    "edit {edit} not found on module '{module}'.\n  To fix: list the module's edits:\n    vellum module list <project>"
                )
            }
            Self::EditClosed { edit, status } => {
                write!(
                    f,
                    "edit {edit} is already {status}.\n  Closed edits cannot be reviewed again; propose a new edit instead."
                )
            }
            Self::InvalidTransition { module, from, to } => {
                write!(
                    f,
                    "module '{module}' cannot move from {from} to {to}.\n  Reviews may approve or reject proposed and modified modules; rejected modules are final."
                )
            }
            Self::ReviewRequired {
                action,
                actor,
                role,
            } => {
                write!(
                    f,
                    "{action} requires a reviewer, but '{actor}' is a {role}.\n  To fix: ask a teacher or admin to review, or re-run with a reviewer identity."
                )
            }
            Self::EmptyDiff => {
                write!(
                    f,
                    "the proposed edit is empty.\n  To fix: include at least one node or edge in the diff."
                )
            }
            Self::ModulesNotApproved { pending } => {
                write!(f, "cannot flatten: {} module(s) await review:", pending.len())?;
                for name in pending {
                    write!(f, "\n  - {name}")?;
                }
                write!(f, "\n  To fix: approve or reject each listed module first.")
            }
            Self::Contended { project, attempts } => {
                write!(
                    f,
                    "project '{project}' is busy: gave up after {attempts} attempt(s).\n  Another writer kept winning the append race. To fix: retry shortly."
                )
            }
            Self::Generator { source, reason } => {
                write!(
                    f,
                    "graph source '{source}' produced no candidate: {reason}\n  To fix: check the source's input and rerun."
                )
            }
            Self::Validation(err) => {
                write!(f, "{err}")
            }
            Self::Store(err) => {
                write!(
                    f,
                    "storage error: {err}\n  To fix: check the store path, permissions, and disk space."
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// std::error::Error
// ---------------------------------------------------------------------------

impl std::error::Error for VellumError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

impl From<StoreError> for VellumError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<ValidationError> for VellumError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
