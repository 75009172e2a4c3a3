use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Subcommand;
use uuid::Uuid;

use vellum::model::module::{EditDiff, ProposedEdit};
use vellum::model::types::ProjectId;

use crate::context::CliContext;

/// Edit subcommands
#[derive(Subcommand)]
pub enum EditCommands {
    /// Propose an edit against a module
    ///
    /// The diff file is JSON with `nodes` and `edges` arrays. Entries
    /// are additive: on acceptance they extend or overwrite the
    /// module's graph by id, never remove from it.
    Propose {
        /// Owning project
        project: ProjectId,

        /// Module id or name
        module: String,

        /// Diff JSON file
        #[arg(long)]
        file: PathBuf,
    },

    /// List a module's edits, open and decided
    List {
        /// Owning project
        project: ProjectId,

        /// Module id or name
        module: String,
    },

    /// Accept an open edit, folding its diff into the module (reviewers only)
    Accept {
        /// Owning project
        project: ProjectId,

        /// Module id or name
        module: String,

        /// Edit id (shown by 'edit list')
        edit: Uuid,
    },

    /// Reject an open edit, leaving the module untouched (reviewers only)
    Reject {
        /// Owning project
        project: ProjectId,

        /// Module id or name
        module: String,

        /// Edit id (shown by 'edit list')
        edit: Uuid,
    },
}

pub fn run(cmd: EditCommands, ctx: &CliContext) -> Result<()> {
    match cmd {
        EditCommands::Propose {
            project,
            module,
            file,
        } => propose(ctx, &project, &module, &file),
        EditCommands::List { project, module } => list(ctx, &project, &module),
        EditCommands::Accept {
            project,
            module,
            edit,
        } => decide(ctx, &project, &module, edit, true),
        EditCommands::Reject {
            project,
            module,
            edit,
        } => decide(ctx, &project, &module, edit, false),
    }
}

fn propose(ctx: &CliContext, project: &ProjectId, key: &str, file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let diff: EditDiff = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {} as an edit diff", file.display()))?;

    let workflow = ctx.workflow();
    let module = workflow.find(project, key)?;
    let edit = workflow.propose_edit(project, &ctx.actor, &module.id, diff)?;
    println!(
        "Proposed edit {} against '{}' ({} node(s), {} edge(s))",
        edit.id,
        module.name,
        edit.diff.nodes.len(),
        edit.diff.edges.len()
    );
    Ok(())
}

fn list(ctx: &CliContext, project: &ProjectId, key: &str) -> Result<()> {
    let module = ctx.workflow().find(project, key)?;
    if module.proposed_edits.is_empty() {
        println!("No edits proposed against '{}'", module.name);
        return Ok(());
    }
    for edit in &module.proposed_edits {
        println!("{}", describe(edit));
    }
    Ok(())
}

fn decide(ctx: &CliContext, project: &ProjectId, key: &str, edit: Uuid, accept: bool) -> Result<()> {
    let workflow = ctx.workflow();
    let module = workflow.find(project, key)?;
    let stored = if accept {
        workflow.accept_edit(project, &ctx.actor, &module.id, edit)?
    } else {
        workflow.reject_edit(project, &ctx.actor, &module.id, edit)?
    };
    let verdict = if accept { "accepted" } else { "rejected" };
    println!(
        "Edit {edit} {verdict}; '{}' is now {} with {} node(s), {} edge(s)",
        stored.name,
        stored.status,
        stored.nodes.len(),
        stored.edges.len()
    );
    Ok(())
}

fn describe(edit: &ProposedEdit) -> String {
    format!(
        "{}  {}  {} by {}: +{} node(s), +{} edge(s)",
        edit.id,
        edit.created_at.format("%Y-%m-%d %H:%M:%S"),
        edit.status,
        edit.author,
        edit.diff.nodes.len(),
        edit.diff.edges.len()
    )
}
