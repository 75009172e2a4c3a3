//! Filesystem store: one directory per project.
//!
//! ```text
//! <root>/
//!   <project-id>/
//!     snapshots/<version>.json
//!     modules/<module-id>.json
//!     audit.ndjson
//! ```
//!
//! Snapshot files are written to a temporary sibling, fsynced, then
//! hard-linked into place, so a crash never leaves a partial snapshot at its
//! final path and a duplicate version is refused by the link step itself.
//! Concurrency control is a process-wide mutex; a store root is meant to be
//! owned by one process at a time.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::audit::AuditEntry;
use crate::model::module::Module;
use crate::model::snapshot::{Snapshot, Version};
use crate::model::types::ProjectId;

use super::{ProjectStore, StoreError};

const SNAPSHOTS_DIR: &str = "snapshots";
const MODULES_DIR: &str = "modules";
const AUDIT_FILE: &str = "audit.ndjson";

/// Durable [`ProjectStore`] rooted at a directory.
pub struct FsStore {
    root: PathBuf,
    guard: Mutex<()>,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    /// I/O failures creating the root directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            guard: Mutex::new(()),
        })
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn project_dir(&self, project: &ProjectId) -> PathBuf {
        self.root.join(project.as_str())
    }

    fn snapshots_dir(&self, project: &ProjectId) -> PathBuf {
        self.project_dir(project).join(SNAPSHOTS_DIR)
    }

    fn modules_dir(&self, project: &ProjectId) -> PathBuf {
        self.project_dir(project).join(MODULES_DIR)
    }

    fn audit_path(&self, project: &ProjectId) -> PathBuf {
        self.project_dir(project).join(AUDIT_FILE)
    }

    /// All snapshot versions on disk, ascending. Missing dir reads as empty.
    fn versions(&self, project: &ProjectId) -> Result<Vec<u64>, StoreError> {
        let dir = self.snapshots_dir(project);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Ok(version) = stem.parse::<u64>()
            {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn head(&self, project: &ProjectId) -> Result<Option<Version>, StoreError> {
        Ok(self.versions(project)?.last().copied().map(Version::new))
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::malformed(path, e.to_string()))
    }

    /// Write `value` to a temporary sibling of `path`, fsync, then rename.
    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::malformed(path, e.to_string()))?;
        let tmp = tmp_sibling(path)?;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Like [`Self::write_json`], but claims the final path with a hard link
    /// so an existing file is refused instead of replaced.
    fn write_json_new<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::malformed(path, e.to_string()))?;
        let tmp = tmp_sibling(path)?;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        let linked = fs::hard_link(&tmp, path);
        let _ = fs::remove_file(&tmp);
        linked?;
        Ok(())
    }
}

fn tmp_sibling(path: &Path) -> Result<PathBuf, StoreError> {
    let dir = path.parent().ok_or_else(|| {
        StoreError::malformed(path, "no parent directory")
    })?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::malformed(path, "unusable file name"))?;
    // Same directory keeps the rename on one filesystem.
    Ok(dir.join(format!(".{name}.tmp")))
}

impl ProjectStore for FsStore {
    fn append_snapshot(
        &self,
        expected_head: Option<Version>,
        snapshot: &Snapshot,
    ) -> Result<(), StoreError> {
        let _guard = self.lock();
        let project = &snapshot.project_id;
        let found = self.head(project)?;
        if found != expected_head {
            return Err(StoreError::head_moved(
                project.clone(),
                expected_head,
                found,
            ));
        }
        let dir = self.snapshots_dir(project);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", snapshot.version.get()));
        match Self::write_json_new(&path, snapshot) {
            Ok(()) => Ok(()),
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Another process claimed the version between our head check
                // and the link.
                Err(StoreError::head_moved(
                    project.clone(),
                    expected_head,
                    Some(snapshot.version),
                ))
            }
            Err(e) => Err(e),
        }
    }

    fn snapshot(
        &self,
        project: &ProjectId,
        version: Version,
    ) -> Result<Option<Snapshot>, StoreError> {
        let _guard = self.lock();
        let path = self.snapshots_dir(project).join(format!("{}.json", version.get()));
        Self::read_json(&path)
    }

    fn latest_snapshot(&self, project: &ProjectId) -> Result<Option<Snapshot>, StoreError> {
        let _guard = self.lock();
        let Some(version) = self.versions(project)?.last().copied() else {
            return Ok(None);
        };
        let path = self.snapshots_dir(project).join(format!("{version}.json"));
        Self::read_json(&path)
    }

    fn snapshot_history(&self, project: &ProjectId) -> Result<Vec<Snapshot>, StoreError> {
        let _guard = self.lock();
        let mut snapshots = Vec::new();
        for version in self.versions(project)?.into_iter().rev() {
            let path = self.snapshots_dir(project).join(format!("{version}.json"));
            if let Some(snapshot) = Self::read_json(&path)? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    fn put_module(
        &self,
        expected_revision: Option<u64>,
        module: &Module,
    ) -> Result<Module, StoreError> {
        let _guard = self.lock();
        let dir = self.modules_dir(&module.project_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", module.id));
        let found = Self::read_json::<Module>(&path)?.map(|m| m.revision);
        match (expected_revision, found) {
            (None, None) => {}
            (Some(expected), Some(found)) if expected == found => {}
            _ => {
                return Err(StoreError::revision_conflict(
                    module.id.clone(),
                    expected_revision,
                    found,
                ));
            }
        }
        let mut stored = module.clone();
        stored.revision = expected_revision.unwrap_or(0) + 1;
        Self::write_json(&path, &stored)?;
        Ok(stored)
    }

    fn module(&self, project: &ProjectId, module_id: &str) -> Result<Option<Module>, StoreError> {
        let _guard = self.lock();
        let path = self.modules_dir(project).join(format!("{module_id}.json"));
        Self::read_json(&path)
    }

    fn modules(&self, project: &ProjectId) -> Result<Vec<Module>, StoreError> {
        let _guard = self.lock();
        let dir = self.modules_dir(project);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut modules = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(module) = Self::read_json::<Module>(&path)?
            {
                modules.push(module);
            }
        }
        modules.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        Ok(modules)
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let _guard = self.lock();
        let dir = self.project_dir(&entry.project_id);
        fs::create_dir_all(&dir)?;
        let path = self.audit_path(&entry.project_id);
        let mut line = serde_json::to_string(entry)
            .map_err(|e| StoreError::malformed(&path, e.to_string()))?;
        line.push('\n');
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn audit_entries(&self, project: &ProjectId) -> Result<Vec<AuditEntry>, StoreError> {
        let _guard = self.lock();
        let path = self.audit_path(project);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(line)
                .map_err(|e| StoreError::malformed(&path, e.to_string()))?;
            entries.push(entry);
        }
        entries.reverse();
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditEntry};
    use crate::model::graph::{GraphPayload, Node};
    use crate::model::snapshot::SnapshotContent;
    use tempfile::tempdir;

    fn project() -> ProjectId {
        ProjectId::new("webshop").unwrap()
    }

    fn snapshot_at(version: u64) -> Snapshot {
        let graph = GraphPayload::new(vec![Node::new("api", "service")], vec![]);
        Snapshot::assemble(
            project(),
            Version::new(version),
            SnapshotContent::from_graph(graph),
        )
    }

    #[test]
    fn round_trips_a_snapshot() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();

        store.append_snapshot(None, &snapshot_at(1700000000000)).unwrap();

        let head = store.latest_snapshot(&project()).unwrap().unwrap();
        assert_eq!(head.version, Version::new(1700000000000));
        assert_eq!(head.nodes.len(), 1);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FsStore::open(dir.path()).unwrap();
            store.append_snapshot(None, &snapshot_at(1)).unwrap();
        }
        let store = FsStore::open(dir.path()).unwrap();
        assert!(store.latest_snapshot(&project()).unwrap().is_some());
    }

    #[test]
    fn stale_head_is_rejected() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.append_snapshot(None, &snapshot_at(1)).unwrap();
        store
            .append_snapshot(Some(Version::new(1)), &snapshot_at(2))
            .unwrap();

        let err = store
            .append_snapshot(Some(Version::new(1)), &snapshot_at(3))
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn history_is_numeric_not_lexicographic() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.append_snapshot(None, &snapshot_at(9)).unwrap();
        store
            .append_snapshot(Some(Version::new(9)), &snapshot_at(10))
            .unwrap();

        let versions: Vec<u64> = store
            .snapshot_history(&project())
            .unwrap()
            .iter()
            .map(|s| s.version.get())
            .collect();
        assert_eq!(versions, vec![10, 9]);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.append_snapshot(None, &snapshot_at(1)).unwrap();

        let names: Vec<String> = fs::read_dir(store.snapshots_dir(&project()))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["1.json"]);
    }

    #[test]
    fn malformed_snapshot_file_is_reported_with_path() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.append_snapshot(None, &snapshot_at(1)).unwrap();

        let path = store.snapshots_dir(&project()).join("1.json");
        fs::write(&path, "{ not json").unwrap();

        let err = store.latest_snapshot(&project()).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { path: p, .. } if p == path));
    }

    fn module_named(name: &str, order: u32) -> Module {
        Module::new(project(), name, order, GraphPayload::new(vec![], vec![]))
    }

    #[test]
    fn module_create_and_revisioned_update() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let module = module_named("auth", 0);

        let stored = store.put_module(None, &module).unwrap();
        assert_eq!(stored.revision, 1);

        let again = store.put_module(Some(1), &stored).unwrap();
        assert_eq!(again.revision, 2);

        let err = store.put_module(Some(1), &stored).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn modules_listing_ordered() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.put_module(None, &module_named("zeta", 0)).unwrap();
        store.put_module(None, &module_named("alpha", 1)).unwrap();

        let names: Vec<String> = store
            .modules(&project())
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn audit_appends_ndjson_newest_first() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store
            .append_audit(&AuditEntry::new(project(), "alice", AuditAction::ModuleCreated))
            .unwrap();
        store
            .append_audit(&AuditEntry::new(project(), "bob", AuditAction::EditProposed))
            .unwrap();

        let entries = store.audit_entries(&project()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].actor, "bob");

        let raw = fs::read_to_string(store.audit_path(&project())).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }
}
