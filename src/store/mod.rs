//! Storage backends for snapshots, modules, and audit entries.
//!
//! Everything above this layer is generic over [`ProjectStore`], which keeps
//! the ledger, workflow, and resolution logic testable against the in-memory
//! backend while production runs on the filesystem one.
//!
//! The trait is deliberately small and optimistic: there are no locks in the
//! interface. Writers pass the state they based their work on (`expected_head`
//! for snapshots, `expected_revision` for modules) and the store refuses the
//! write if someone else got there first. Callers retry on
//! [`StoreError::is_transient`] failures.

use std::fmt;
use std::path::PathBuf;

use crate::audit::AuditEntry;
use crate::model::module::Module;
use crate::model::snapshot::{Snapshot, Version};
use crate::model::types::ProjectId;

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failures surfaced by a storage backend.
#[derive(Debug)]
pub enum StoreError {
    /// A compare-and-append lost: the project's head was not where the
    /// caller left it.
    HeadMoved {
        /// Project whose head moved.
        project: ProjectId,
        /// Head the caller expected (`None` = expected an empty ledger).
        expected: Option<Version>,
        /// Head actually found (`None` = ledger is empty).
        found: Option<Version>,
    },

    /// A revisioned module write lost: the stored revision is not the one
    /// the caller read.
    RevisionConflict {
        /// Module id.
        module: String,
        /// Revision the caller based its write on (`None` = create).
        expected: Option<u64>,
        /// Revision actually stored (`None` = module absent).
        found: Option<u64>,
    },

    /// Persisted data failed to parse.
    Malformed {
        /// Offending file (empty for non-file backends).
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },

    /// Underlying I/O failure.
    Io(std::io::Error),
}

impl StoreError {
    /// A lost snapshot compare-and-append.
    #[must_use]
    pub const fn head_moved(
        project: ProjectId,
        expected: Option<Version>,
        found: Option<Version>,
    ) -> Self {
        Self::HeadMoved {
            project,
            expected,
            found,
        }
    }

    /// A lost revisioned module write.
    #[must_use]
    pub fn revision_conflict(
        module: impl Into<String>,
        expected: Option<u64>,
        found: Option<u64>,
    ) -> Self {
        Self::RevisionConflict {
            module: module.into(),
            expected,
            found,
        }
    }

    /// Unparseable persisted data.
    #[must_use]
    pub fn malformed(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Whether retrying the whole read-modify-write cycle can succeed.
    ///
    /// True for the optimistic-concurrency losses (`HeadMoved`,
    /// `RevisionConflict`); false for I/O and corruption, which re-reading
    /// will not fix.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::HeadMoved { .. } | Self::RevisionConflict { .. })
    }
}

fn fmt_version(v: Option<Version>) -> String {
    v.map_or_else(|| "empty".to_owned(), |v| v.to_string())
}

fn fmt_revision(r: Option<u64>) -> String {
    r.map_or_else(|| "absent".to_owned(), |r| r.to_string())
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeadMoved {
                project,
                expected,
                found,
            } => write!(
                f,
                "snapshot head of '{project}' moved: expected {}, found {}",
                fmt_version(*expected),
                fmt_version(*found)
            ),
            Self::RevisionConflict {
                module,
                expected,
                found,
            } => write!(
                f,
                "module '{module}' changed underneath the write: expected revision {}, found {}",
                fmt_revision(*expected),
                fmt_revision(*found)
            ),
            Self::Malformed { path, detail } => {
                write!(f, "malformed store data at {}: {detail}", path.display())
            }
            Self::Io(err) => write!(f, "store i/o error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

// ---------------------------------------------------------------------------
// ProjectStore
// ---------------------------------------------------------------------------

/// Storage for one or more projects' snapshots, modules, and audit trail.
///
/// Implementations must be safe to share across threads; all methods take
/// `&self`. Object safety is deliberate so callers can hold
/// `&dyn ProjectStore`.
pub trait ProjectStore: Send + Sync {
    /// Append a snapshot if the project's head is where the caller left it.
    ///
    /// # Arguments
    /// * `expected_head` - Version the caller observed as latest, or `None`
    ///   if the caller observed an empty ledger.
    /// * `snapshot` - Fully assembled snapshot. Its version must be greater
    ///   than `expected_head`.
    ///
    /// # Invariants
    /// * The check against `expected_head` and the append are atomic with
    ///   respect to other appenders on the same store.
    /// * On success the snapshot is durably the new head.
    ///
    /// # Errors
    /// [`StoreError::HeadMoved`] if another writer appended first.
    fn append_snapshot(
        &self,
        expected_head: Option<Version>,
        snapshot: &Snapshot,
    ) -> Result<(), StoreError>;

    /// Fetch one snapshot by version, or `None` if that version was never
    /// written.
    ///
    /// # Errors
    /// I/O or corruption only; an unknown version is `Ok(None)`.
    fn snapshot(&self, project: &ProjectId, version: Version) -> Result<Option<Snapshot>, StoreError>;

    /// The current head snapshot, or `None` for an empty or unknown project.
    ///
    /// # Errors
    /// I/O or corruption only.
    fn latest_snapshot(&self, project: &ProjectId) -> Result<Option<Snapshot>, StoreError>;

    /// Every snapshot of a project, newest first. Empty for an unknown
    /// project.
    ///
    /// # Errors
    /// I/O or corruption only.
    fn snapshot_history(&self, project: &ProjectId) -> Result<Vec<Snapshot>, StoreError>;

    /// Write a module document if its stored revision is where the caller
    /// left it.
    ///
    /// # Arguments
    /// * `expected_revision` - Revision the caller read, or `None` to create
    ///   the module (fails if the id already exists).
    /// * `module` - Document to store. Its `revision` field is ignored; the
    ///   store assigns `expected_revision + 1` (or `1` on create).
    ///
    /// # Invariants
    /// * The revision check and the write are atomic with respect to other
    ///   writers on the same store.
    ///
    /// # Errors
    /// [`StoreError::RevisionConflict`] if the stored revision differs from
    /// `expected_revision`.
    fn put_module(&self, expected_revision: Option<u64>, module: &Module)
    -> Result<Module, StoreError>;

    /// Fetch one module by id, or `None` if absent.
    ///
    /// # Errors
    /// I/O or corruption only.
    fn module(&self, project: &ProjectId, module_id: &str) -> Result<Option<Module>, StoreError>;

    /// Every module of a project, ordered by `(order, name)`.
    ///
    /// # Errors
    /// I/O or corruption only.
    fn modules(&self, project: &ProjectId) -> Result<Vec<Module>, StoreError>;

    /// Append one audit entry.
    ///
    /// # Errors
    /// I/O only. Callers on the mutation path treat failures as
    /// warn-and-continue; see [`crate::audit::AuditTrail::record_or_warn`].
    fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Every audit entry of a project, newest first. Empty for an unknown
    /// project.
    ///
    /// # Errors
    /// I/O or corruption only.
    fn audit_entries(&self, project: &ProjectId) -> Result<Vec<AuditEntry>, StoreError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectId {
        ProjectId::new("webshop").unwrap()
    }

    #[test]
    fn head_moved_is_transient() {
        let err = StoreError::head_moved(project(), Some(Version::new(3)), Some(Version::new(4)));
        assert!(err.is_transient());
    }

    #[test]
    fn revision_conflict_is_transient() {
        let err = StoreError::revision_conflict("m-1", Some(2), Some(3));
        assert!(err.is_transient());
    }

    #[test]
    fn io_and_malformed_are_permanent() {
        let io = StoreError::from(std::io::Error::other("disk on fire"));
        assert!(!io.is_transient());
        let bad = StoreError::malformed("/tmp/x.json", "not json");
        assert!(!bad.is_transient());
    }

    #[test]
    fn head_moved_display_names_both_sides() {
        let err = StoreError::head_moved(project(), None, Some(Version::new(7)));
        let msg = err.to_string();
        assert!(msg.contains("webshop"));
        assert!(msg.contains("expected empty"));
        assert!(msg.contains("found 7"));
    }

    #[test]
    fn io_error_keeps_source() {
        use std::error::Error as _;
        let err = StoreError::from(std::io::Error::other("nope"));
        assert!(err.source().is_some());
    }
}
