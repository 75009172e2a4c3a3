//! Shared helpers for vellum integration tests.
//!
//! Every test opens its own store under a temp directory; nothing
//! touches the working tree. Keep the `TempDir` alive for the duration
//! of the test: dropping it deletes the store.

use tempfile::TempDir;

use vellum::ledger::SnapshotLedger;
use vellum::model::graph::GraphPayload;
use vellum::model::snapshot::{Snapshot, SnapshotContent};
use vellum::model::types::{Actor, ProjectId, Role};
use vellum::store::FsStore;

/// Open a fresh on-disk store in its own temp directory.
pub fn open_store() -> (TempDir, FsStore) {
    let dir = TempDir::new().expect("create temp dir");
    let store = FsStore::open(dir.path()).expect("open store");
    (dir, store)
}

/// Append an initial snapshot so the project exists in the ledger.
pub fn init_project(store: &FsStore, project: &ProjectId, graph: GraphPayload) -> Snapshot {
    SnapshotLedger::new(store)
        .append(
            project,
            &student("init"),
            SnapshotContent::from_graph(graph),
        )
        .expect("seed project")
}

/// A validated project id.
pub fn project(name: &str) -> ProjectId {
    ProjectId::new(name).expect("valid project id")
}

/// An actor without review privileges.
pub fn student(id: &str) -> Actor {
    Actor::new(id, Role::Student)
}
