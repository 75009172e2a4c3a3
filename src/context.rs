use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use vellum::config::VellumConfig;
use vellum::ledger::{RetryPolicy, SnapshotLedger};
use vellum::model::types::{Actor, Role};
use vellum::notify::LogNotifier;
use vellum::resolve::ResolutionService;
use vellum::store::FsStore;
use vellum::workflow::ModuleWorkflow;

/// Notifications go to the log. A deployment with a real channel swaps
/// in its own [`vellum::notify::Notifier`].
static NOTIFIER: LogNotifier = LogNotifier;

/// Shared wiring for every subcommand: an open store, the acting
/// identity, and the retry policy from config.
pub struct CliContext {
    pub store: FsStore,
    pub actor: Actor,
    pub retry: RetryPolicy,
}

impl CliContext {
    /// Load the config file, apply the store override, and open the store.
    ///
    /// A missing config file is fine (defaults apply); a malformed one
    /// is not.
    pub fn open(
        actor: String,
        role: Role,
        store_override: Option<PathBuf>,
        config_path: &Path,
    ) -> Result<Self> {
        let config = VellumConfig::load(config_path)?;
        let root = store_override.unwrap_or(config.store.root);
        let store = FsStore::open(root.as_path())
            .with_context(|| format!("opening store at {}", root.display()))?;
        Ok(Self {
            store,
            actor: Actor::new(actor, role),
            retry: config.merge.retry_policy(),
        })
    }

    pub const fn ledger(&self) -> SnapshotLedger<'_, FsStore> {
        SnapshotLedger::with_retry(&self.store, self.retry)
    }

    pub fn workflow(&self) -> ModuleWorkflow<'_, FsStore> {
        ModuleWorkflow::new(&self.store)
            .with_retry(self.retry)
            .with_notifier(&NOTIFIER)
    }

    pub fn resolver(&self) -> ResolutionService<'_, FsStore> {
        ResolutionService::new(&self.store)
            .with_retry(self.retry)
            .with_notifier(&NOTIFIER)
    }
}
