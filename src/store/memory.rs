//! In-memory store, for tests and embedding.
//!
//! All data lives behind one mutex, which also serializes the
//! compare-and-append checks. Nothing survives the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::audit::AuditEntry;
use crate::model::module::Module;
use crate::model::snapshot::{Snapshot, Version};
use crate::model::types::ProjectId;

use super::{ProjectStore, StoreError};

#[derive(Default)]
struct ProjectRecords {
    snapshots: BTreeMap<u64, Snapshot>,
    modules: BTreeMap<String, Module>,
    audit: Vec<AuditEntry>,
}

impl ProjectRecords {
    fn head(&self) -> Option<Version> {
        self.snapshots.keys().next_back().copied().map(Version::new)
    }
}

/// Volatile [`ProjectStore`] backed by maps.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<ProjectId, ProjectRecords>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ProjectId, ProjectRecords>> {
        // A poisoned lock only means another test thread panicked mid-write;
        // the map itself is still coherent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProjectStore for MemoryStore {
    fn append_snapshot(
        &self,
        expected_head: Option<Version>,
        snapshot: &Snapshot,
    ) -> Result<(), StoreError> {
        let mut map = self.lock();
        let records = map.entry(snapshot.project_id.clone()).or_default();
        let found = records.head();
        if found != expected_head {
            return Err(StoreError::head_moved(
                snapshot.project_id.clone(),
                expected_head,
                found,
            ));
        }
        records
            .snapshots
            .insert(snapshot.version.get(), snapshot.clone());
        Ok(())
    }

    fn snapshot(
        &self,
        project: &ProjectId,
        version: Version,
    ) -> Result<Option<Snapshot>, StoreError> {
        let map = self.lock();
        Ok(map
            .get(project)
            .and_then(|r| r.snapshots.get(&version.get()))
            .cloned())
    }

    fn latest_snapshot(&self, project: &ProjectId) -> Result<Option<Snapshot>, StoreError> {
        let map = self.lock();
        Ok(map
            .get(project)
            .and_then(|r| r.snapshots.values().next_back())
            .cloned())
    }

    fn snapshot_history(&self, project: &ProjectId) -> Result<Vec<Snapshot>, StoreError> {
        let map = self.lock();
        Ok(map
            .get(project)
            .map(|r| r.snapshots.values().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn put_module(
        &self,
        expected_revision: Option<u64>,
        module: &Module,
    ) -> Result<Module, StoreError> {
        let mut map = self.lock();
        let records = map.entry(module.project_id.clone()).or_default();
        let found = records.modules.get(&module.id).map(|m| m.revision);
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
        records.modules.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn module(&self, project: &ProjectId, module_id: &str) -> Result<Option<Module>, StoreError> {
        let map = self.lock();
        Ok(map
            .get(project)
            .and_then(|r| r.modules.get(module_id))
            .cloned())
    }

    fn modules(&self, project: &ProjectId) -> Result<Vec<Module>, StoreError> {
        let map = self.lock();
        let mut modules: Vec<Module> = map
            .get(project)
            .map(|r| r.modules.values().cloned().collect())
            .unwrap_or_default();
        modules.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        Ok(modules)
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut map = self.lock();
        let records = map.entry(entry.project_id.clone()).or_default();
        records.audit.push(entry.clone());
        Ok(())
    }

    fn audit_entries(&self, project: &ProjectId) -> Result<Vec<AuditEntry>, StoreError> {
        let map = self.lock();
        Ok(map
            .get(project)
            .map(|r| r.audit.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{GraphPayload, Node};
    use crate::model::snapshot::SnapshotContent;

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

    fn module_named(name: &str, order: u32) -> Module {
        Module::new(project(), name, order, GraphPayload::new(vec![], vec![]))
    }

    // -- snapshots --

    #[test]
    fn append_to_empty_requires_no_expected_head() {
        let store = MemoryStore::new();
        store.append_snapshot(None, &snapshot_at(1)).unwrap();
        let head = store.latest_snapshot(&project()).unwrap().unwrap();
        assert_eq!(head.version, Version::new(1));
    }

    #[test]
    fn append_with_stale_head_is_rejected() {
        let store = MemoryStore::new();
        store.append_snapshot(None, &snapshot_at(1)).unwrap();
        store
            .append_snapshot(Some(Version::new(1)), &snapshot_at(2))
            .unwrap();

        let err = store
            .append_snapshot(Some(Version::new(1)), &snapshot_at(3))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::HeadMoved {
                expected: Some(e),
                found: Some(f),
                ..
            } if e == Version::new(1) && f == Version::new(2)
        ));
    }

    #[test]
    fn append_expecting_empty_ledger_fails_once_populated() {
        let store = MemoryStore::new();
        store.append_snapshot(None, &snapshot_at(1)).unwrap();
        let err = store.append_snapshot(None, &snapshot_at(2)).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn history_is_newest_first() {
        let store = MemoryStore::new();
        store.append_snapshot(None, &snapshot_at(5)).unwrap();
        store
            .append_snapshot(Some(Version::new(5)), &snapshot_at(9))
            .unwrap();

        let history = store.snapshot_history(&project()).unwrap();
        let versions: Vec<u64> = history.iter().map(|s| s.version.get()).collect();
        assert_eq!(versions, vec![9, 5]);
    }

    #[test]
    fn unknown_project_reads_are_empty() {
        let store = MemoryStore::new();
        assert!(store.latest_snapshot(&project()).unwrap().is_none());
        assert!(store.snapshot_history(&project()).unwrap().is_empty());
        assert!(
            store
                .snapshot(&project(), Version::new(1))
                .unwrap()
                .is_none()
        );
        assert!(store.modules(&project()).unwrap().is_empty());
    }

    #[test]
    fn racing_appends_admit_exactly_one_winner() {
        let store = MemoryStore::new();
        let results: Vec<Result<(), StoreError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = &store;
                    scope.spawn(move || store.append_snapshot(None, &snapshot_at(100 + i)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(StoreError::is_transient)
        );
    }

    // -- modules --

    #[test]
    fn create_assigns_revision_one() {
        let store = MemoryStore::new();
        let stored = store.put_module(None, &module_named("auth", 0)).unwrap();
        assert_eq!(stored.revision, 1);
    }

    #[test]
    fn create_twice_conflicts() {
        let store = MemoryStore::new();
        let module = module_named("auth", 0);
        store.put_module(None, &module).unwrap();
        let err = store.put_module(None, &module).unwrap_err();
        assert!(matches!(
            err,
            StoreError::RevisionConflict {
                expected: None,
                found: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn update_bumps_revision() {
        let store = MemoryStore::new();
        let stored = store.put_module(None, &module_named("auth", 0)).unwrap();
        let again = store.put_module(Some(stored.revision), &stored).unwrap();
        assert_eq!(again.revision, 2);
    }

    #[test]
    fn stale_update_conflicts() {
        let store = MemoryStore::new();
        let stored = store.put_module(None, &module_named("auth", 0)).unwrap();
        store.put_module(Some(1), &stored).unwrap();
        let err = store.put_module(Some(1), &stored).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn modules_ordered_by_order_then_name() {
        let store = MemoryStore::new();
        store.put_module(None, &module_named("zeta", 0)).unwrap();
        store.put_module(None, &module_named("alpha", 1)).unwrap();
        store.put_module(None, &module_named("beta", 0)).unwrap();

        let names: Vec<String> = store
            .modules(&project())
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["beta", "zeta", "alpha"]);
    }
}
