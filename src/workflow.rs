//! Module lifecycle: propose, review, approve, flatten.
//!
//! A project can be split into modules that move through review
//! independently. Anyone may propose an edit against a module; accepting or
//! rejecting an edit, and approving or rejecting the module itself, needs a
//! reviewer role. Once every module is approved, [`ModuleWorkflow::flatten`]
//! unions them into one snapshot on the project ledger.
//!
//! All module writes go through a revision check, so two reviewers racing on
//! the same module cannot silently drop each other's decisions.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::VellumError;
use crate::audit::{AuditAction, AuditEntry, AuditTrail};
use crate::ledger::{RetryPolicy, SnapshotLedger};
use crate::model::graph::GraphPayload;
use crate::model::merge::union_graph;
use crate::model::module::{EditDiff, EditStatus, Module, ModuleStatus, ProposedEdit};
use crate::model::snapshot::{ModuleRef, Snapshot, SnapshotContent};
use crate::model::types::{Actor, ProjectId};
use crate::notify::{Notifier, NotifyEvent};
use crate::store::ProjectStore;

/// Review operations over a project's modules.
pub struct ModuleWorkflow<'a, S: ProjectStore + ?Sized> {
    store: &'a S,
    retry: RetryPolicy,
    notifier: Option<&'a dyn Notifier>,
}

impl<'a, S: ProjectStore + ?Sized> ModuleWorkflow<'a, S> {
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

    // -----------------------------------------------------------------------
    // Creation and lookup
    // -----------------------------------------------------------------------

    /// Create a module with an initial graph. Names are unique per project.
    ///
    /// # Errors
    /// [`VellumError::ModuleExists`] when the name is taken.
    #[instrument(skip(self, graph), fields(project = %project, name))]
    pub fn create_module(
        &self,
        project: &ProjectId,
        actor: &Actor,
        name: &str,
        order: u32,
        graph: GraphPayload,
    ) -> Result<Module, VellumError> {
        let taken = self.store.modules(project)?.iter().any(|m| m.name == name);
        if taken {
            return Err(VellumError::ModuleExists {
                project: project.clone(),
                name: name.to_owned(),
            });
        }
        let module = Module::new(project.clone(), name, order, graph.normalized());
        let stored = self.store.put_module(None, &module)?;
        self.audit().record_or_warn(
            AuditEntry::new(project.clone(), actor.id.clone(), AuditAction::ModuleCreated)
                .with_detail("module", stored.id.clone())
                .with_detail("name", stored.name.clone()),
        );
        Ok(stored)
    }

    /// Every module of the project, in flattening order.
    ///
    /// # Errors
    /// Store failures only.
    pub fn modules(&self, project: &ProjectId) -> Result<Vec<Module>, VellumError> {
        Ok(self.store.modules(project)?)
    }

    /// Resolve a module by id, falling back to name.
    ///
    /// # Errors
    /// [`VellumError::ModuleNotFound`] when neither matches.
    pub fn find(&self, project: &ProjectId, key: &str) -> Result<Module, VellumError> {
        if let Some(module) = self.store.module(project, key)? {
            return Ok(module);
        }
        self.store
            .modules(project)?
            .into_iter()
            .find(|m| m.name == key)
            .ok_or_else(|| VellumError::ModuleNotFound {
                project: project.clone(),
                module: key.to_owned(),
            })
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    /// Queue an edit against a module. Any actor may propose, whatever the
    /// module's review state; the gate sits at acceptance.
    ///
    /// # Errors
    /// [`VellumError::EmptyDiff`] for a no-op diff.
    #[instrument(skip(self, diff), fields(project = %project, module = module_id))]
    pub fn propose_edit(
        &self,
        project: &ProjectId,
        actor: &Actor,
        module_id: &str,
        diff: EditDiff,
    ) -> Result<ProposedEdit, VellumError> {
        if diff.is_empty() {
            return Err(VellumError::EmptyDiff);
        }
        let edit = ProposedEdit::new(actor.id.clone(), diff);
        let stored = self.update_module(project, module_id, |module| {
            module.proposed_edits.push(edit.clone());
            Ok(())
        })?;
        self.audit().record_or_warn(
            AuditEntry::new(project.clone(), actor.id.clone(), AuditAction::EditProposed)
                .with_detail("module", stored.id.clone())
                .with_detail("edit", edit.id.to_string()),
        );
        self.notify(NotifyEvent::EditProposed {
            project: project.clone(),
            module: stored.name.clone(),
            edit: edit.id,
            author: actor.id.clone(),
        });
        Ok(stored.find_edit(edit.id).cloned().unwrap_or(edit))
    }

    /// Accept an open edit: merge its diff into the module and close it.
    ///
    /// The module lands in `Modified` whatever its status was before. For an
    /// `Approved` module that means demotion and a cleared approval stamp;
    /// the reviewer must approve the new content again. A `Rejected` module
    /// is terminal and refuses acceptance.
    ///
    /// # Errors
    /// [`VellumError::ReviewRequired`] for non-reviewers;
    /// [`VellumError::EditNotFound`] / [`VellumError::EditClosed`] for
    /// missing or already-decided edits;
    /// [`VellumError::InvalidTransition`] on a rejected module.
    #[instrument(skip(self), fields(project = %project, module = module_id, edit = %edit_id))]
    pub fn accept_edit(
        &self,
        project: &ProjectId,
        actor: &Actor,
        module_id: &str,
        edit_id: Uuid,
    ) -> Result<Module, VellumError> {
        require_reviewer(actor, "accept edit")?;
        let stored = self.update_module(project, module_id, |module| {
            if module.status == ModuleStatus::Rejected {
                return Err(VellumError::InvalidTransition {
                    module: module.name.clone(),
                    from: ModuleStatus::Rejected,
                    to: ModuleStatus::Modified,
                });
            }
            let index = find_open_edit(module, edit_id)?;
            let diff = module.proposed_edits[index].diff.clone();
            let (nodes, edges) =
                union_graph(&module.nodes, &module.edges, &diff.nodes, &diff.edges);
            module.nodes = nodes;
            module.edges = edges;
            module.proposed_edits[index].status = EditStatus::Accepted;
            module.status = ModuleStatus::Modified;
            module.approved_by = None;
            module.approved_at = None;
            Ok(())
        })?;
        self.record_edit_decision(project, actor, &stored, edit_id, true);
        Ok(stored)
    }

    /// Reject an open edit. The module's content and status are untouched.
    ///
    /// # Errors
    /// Same surface as [`Self::accept_edit`].
    #[instrument(skip(self), fields(project = %project, module = module_id, edit = %edit_id))]
    pub fn reject_edit(
        &self,
        project: &ProjectId,
        actor: &Actor,
        module_id: &str,
        edit_id: Uuid,
    ) -> Result<Module, VellumError> {
        require_reviewer(actor, "reject edit")?;
        let stored = self.update_module(project, module_id, |module| {
            let index = find_open_edit(module, edit_id)?;
            module.proposed_edits[index].status = EditStatus::Rejected;
            Ok(())
        })?;
        self.record_edit_decision(project, actor, &stored, edit_id, false);
        Ok(stored)
    }

    fn record_edit_decision(
        &self,
        project: &ProjectId,
        actor: &Actor,
        module: &Module,
        edit_id: Uuid,
        accepted: bool,
    ) {
        let action = if accepted {
            AuditAction::EditAccepted
        } else {
            AuditAction::EditRejected
        };
        self.audit().record_or_warn(
            AuditEntry::new(project.clone(), actor.id.clone(), action)
                .with_detail("module", module.id.clone())
                .with_detail("edit", edit_id.to_string()),
        );
        let author = module
            .find_edit(edit_id)
            .map(|e| e.author.clone())
            .unwrap_or_default();
        self.notify(NotifyEvent::EditDecided {
            project: project.clone(),
            module: module.name.clone(),
            edit: edit_id,
            author,
            reviewer: actor.id.clone(),
            accepted,
        });
    }

    // -----------------------------------------------------------------------
    // Module review
    // -----------------------------------------------------------------------

    /// Approve a module, stamping who and when.
    ///
    /// # Errors
    /// [`VellumError::ReviewRequired`] for non-reviewers;
    /// [`VellumError::InvalidTransition`] when the status machine forbids it.
    #[instrument(skip(self), fields(project = %project, module = module_id))]
    pub fn approve_module(
        &self,
        project: &ProjectId,
        actor: &Actor,
        module_id: &str,
    ) -> Result<Module, VellumError> {
        require_reviewer(actor, "approve module")?;
        let stored = self.update_module(project, module_id, |module| {
            transition(module, ModuleStatus::Approved)?;
            module.approved_by = Some(actor.id.clone());
            module.approved_at = Some(Utc::now());
            Ok(())
        })?;
        self.record_module_decision(project, actor, &stored, true);
        Ok(stored)
    }

    /// Reject a module. Terminal: no further edits or approvals.
    ///
    /// # Errors
    /// Same surface as [`Self::approve_module`].
    #[instrument(skip(self), fields(project = %project, module = module_id))]
    pub fn reject_module(
        &self,
        project: &ProjectId,
        actor: &Actor,
        module_id: &str,
    ) -> Result<Module, VellumError> {
        require_reviewer(actor, "reject module")?;
        let stored = self.update_module(project, module_id, |module| {
            transition(module, ModuleStatus::Rejected)
        })?;
        self.record_module_decision(project, actor, &stored, false);
        Ok(stored)
    }

    fn record_module_decision(
        &self,
        project: &ProjectId,
        actor: &Actor,
        module: &Module,
        approved: bool,
    ) {
        let action = if approved {
            AuditAction::ModuleApproved
        } else {
            AuditAction::ModuleRejected
        };
        self.audit().record_or_warn(
            AuditEntry::new(project.clone(), actor.id.clone(), action)
                .with_detail("module", module.id.clone())
                .with_detail("name", module.name.clone()),
        );
        self.notify(NotifyEvent::ModuleDecided {
            project: project.clone(),
            module: module.name.clone(),
            reviewer: actor.id.clone(),
            approved,
        });
    }

    // -----------------------------------------------------------------------
    // Flatten
    // -----------------------------------------------------------------------

    /// Union every approved module, in order, into a new ledger snapshot.
    ///
    /// Later modules win id collisions. The snapshot records each module's
    /// id, name, order, and status, and is marked `derivedFrom: "modules"`.
    ///
    /// # Errors
    /// [`VellumError::ModulesNotApproved`] naming every unapproved module.
    #[instrument(skip(self), fields(project = %project))]
    pub fn flatten(
        &self,
        project: &ProjectId,
        actor: &Actor,
        rationale: Option<String>,
    ) -> Result<Snapshot, VellumError> {
        let modules = self.store.modules(project)?;
        let pending: Vec<String> = modules
            .iter()
            .filter(|m| m.status != ModuleStatus::Approved)
            .map(|m| m.name.clone())
            .collect();
        if !pending.is_empty() {
            return Err(VellumError::ModulesNotApproved { pending });
        }

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for module in &modules {
            let (merged_nodes, merged_edges) =
                union_graph(&nodes, &edges, &module.nodes, &module.edges);
            nodes = merged_nodes;
            edges = merged_edges;
        }

        let mut content = SnapshotContent::from_graph(GraphPayload::new(nodes, edges))
            .with_metadata("derivedFrom", "modules");
        content.rationale = rationale;
        content.modules = modules.iter().map(ModuleRef::from).collect();

        let ledger = SnapshotLedger::with_retry(self.store, self.retry);
        ledger.append_audited(
            project,
            actor,
            content,
            AuditAction::SnapshotDerived,
            &[("moduleCount", Value::from(modules.len()))],
        )
    }

    // -----------------------------------------------------------------------
    // Shared write loop
    // -----------------------------------------------------------------------

    /// Load, mutate, and save a module under its revision check, retrying
    /// lost races from a fresh load.
    fn update_module<F>(
        &self,
        project: &ProjectId,
        module_id: &str,
        mut mutate: F,
    ) -> Result<Module, VellumError>
    where
        F: FnMut(&mut Module) -> Result<(), VellumError>,
    {
        for attempt in 1..=self.retry.max_attempts {
            let Some(mut module) = self.store.module(project, module_id)? else {
                return Err(VellumError::ModuleNotFound {
                    project: project.clone(),
                    module: module_id.to_owned(),
                });
            };
            let expected = module.revision;
            mutate(&mut module)?;
            match self.store.put_module(Some(expected), &module) {
                Ok(stored) => return Ok(stored),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    debug!(attempt, module = module_id, error = %err, "module write lost the revision race; retrying");
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

fn require_reviewer(actor: &Actor, action: &str) -> Result<(), VellumError> {
    if actor.can_review() {
        Ok(())
    } else {
        Err(VellumError::ReviewRequired {
            action: action.to_owned(),
            actor: actor.id.clone(),
            role: actor.role,
        })
    }
}

/// Index of an edit that is present and still open.
fn find_open_edit(module: &Module, edit_id: Uuid) -> Result<usize, VellumError> {
    let Some(index) = module.proposed_edits.iter().position(|e| e.id == edit_id) else {
        return Err(VellumError::EditNotFound {
            module: module.name.clone(),
            edit: edit_id,
        });
    };
    let status = module.proposed_edits[index].status;
    if !status.is_open() {
        return Err(VellumError::EditClosed {
            edit: edit_id,
            status,
        });
    }
    Ok(index)
}

/// Apply a status transition or explain why it is forbidden.
fn transition(module: &mut Module, to: ModuleStatus) -> Result<(), VellumError> {
    if !module.status.can_transition_to(to) {
        return Err(VellumError::InvalidTransition {
            module: module.name.clone(),
            from: module.status,
            to,
        });
    }
    module.status = to;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
