use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Subcommand;

use vellum::model::graph::GraphPayload;
use vellum::model::module::Module;
use vellum::model::types::ProjectId;

use crate::context::CliContext;
use crate::project::read_graph;

/// Module subcommands
#[derive(Subcommand)]
pub enum ModuleCommands {
    /// Create a module with an initial graph
    ///
    /// Modules split a large architecture into independently reviewable
    /// pieces. Flattening unions them in --order (lower first), so a
    /// later module wins when two modules claim the same node id.
    Add {
        /// Owning project
        project: ProjectId,

        /// Module name, unique within the project
        name: String,

        /// Initial graph JSON (defaults to an empty graph)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Position in flattening order
        #[arg(long, default_value_t = 0)]
        order: u32,
    },

    /// List modules with their review state
    List {
        /// Owning project
        project: ProjectId,
    },

    /// Approve a module (requires a reviewer role)
    Approve {
        /// Owning project
        project: ProjectId,

        /// Module id or name
        module: String,
    },

    /// Reject a module (requires a reviewer role; terminal)
    Reject {
        /// Owning project
        project: ProjectId,

        /// Module id or name
        module: String,
    },

    /// Union every approved module into a new snapshot
    ///
    /// Every module must be approved first; stragglers are listed in
    /// the error.
    Flatten {
        /// Owning project
        project: ProjectId,

        /// Explanation recorded on the snapshot
        #[arg(long)]
        rationale: Option<String>,
    },
}

pub fn run(cmd: ModuleCommands, ctx: &CliContext) -> Result<()> {
    match cmd {
        ModuleCommands::Add {
            project,
            name,
            file,
            order,
        } => add(ctx, &project, &name, file.as_deref(), order),
        ModuleCommands::List { project } => list(ctx, &project),
        ModuleCommands::Approve { project, module } => decide(ctx, &project, &module, true),
        ModuleCommands::Reject { project, module } => decide(ctx, &project, &module, false),
        ModuleCommands::Flatten { project, rationale } => flatten(ctx, &project, rationale),
    }
}

fn add(
    ctx: &CliContext,
    project: &ProjectId,
    name: &str,
    file: Option<&Path>,
    order: u32,
) -> Result<()> {
    let graph = if let Some(path) = file {
        read_graph(path)?
    } else {
        GraphPayload::default()
    };
    let module = ctx
        .workflow()
        .create_module(project, &ctx.actor, name, order, graph)?;
    println!(
        "Created module '{}' (id {}, order {}, {} node(s), {} edge(s))",
        module.name,
        module.id,
        module.order,
        module.nodes.len(),
        module.edges.len()
    );
    Ok(())
}

fn list(ctx: &CliContext, project: &ProjectId) -> Result<()> {
    let modules = ctx.workflow().modules(project)?;
    if modules.is_empty() {
        println!("No modules in '{project}'");
        return Ok(());
    }
    for module in &modules {
        println!("{}", describe(module));
    }
    Ok(())
}

fn decide(ctx: &CliContext, project: &ProjectId, key: &str, approve: bool) -> Result<()> {
    let workflow = ctx.workflow();
    let module = workflow.find(project, key)?;
    let stored = if approve {
        workflow.approve_module(project, &ctx.actor, &module.id)?
    } else {
        workflow.reject_module(project, &ctx.actor, &module.id)?
    };
    println!("Module '{}' is now {}", stored.name, stored.status);
    Ok(())
}

fn flatten(ctx: &CliContext, project: &ProjectId, rationale: Option<String>) -> Result<()> {
    let snapshot = ctx.workflow().flatten(project, &ctx.actor, rationale)?;
    println!(
        "Flattened {} module(s) into '{project}' version {} ({} node(s), {} edge(s))",
        snapshot.modules.len(),
        snapshot.version,
        snapshot.nodes.len(),
        snapshot.edges.len()
    );
    Ok(())
}

fn describe(module: &Module) -> String {
    let mut line = format!(
        "[{}] {} ({}): {} node(s), {} edge(s)",
        module.order,
        module.name,
        module.status,
        module.nodes.len(),
        module.edges.len()
    );
    let open = module.open_edit_count();
    if open > 0 {
        line.push_str(&format!(", {open} open edit(s)"));
    }
    if let Some(by) = &module.approved_by {
        line.push_str(&format!(", approved by {by}"));
    }
    line
}
