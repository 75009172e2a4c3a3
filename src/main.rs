use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use vellum::model::types::{ProjectId, Role};

mod context;
mod edit;
mod module;
mod project;

/// Versioned snapshot store for collaborative architecture graphs
///
/// Vellum records a project's architecture as an append-only ledger of
/// graph snapshots. Candidate graphs (hand-edited or generated) are
/// checked for semantic conflicts against the current head before they
/// merge. Nothing is rewritten in place, so history, diff, and rollback
/// are always available.
///
/// KEY POINTS:
///   - Conflicts are data, not errors: a blocked merge prints the
///     conflict list and exits 1 without touching the ledger
///   - Versions are opaque and strictly increasing, never reused
///   - Rollback replays an old version as a NEW head; history stays
///
/// QUICK START:
///
///   vellum init my-system --file seed.json
///   vellum resolve my-system --file candidate.json
///   vellum history my-system
///
/// MODULE REVIEW:
///
///   vellum module add my-system auth --file auth.json
///   vellum edit propose my-system auth --file more-auth.json
///   vellum edit accept my-system auth <edit-id> --role teacher
///   vellum module approve my-system auth --role teacher
///   vellum module flatten my-system
#[derive(Parser)]
#[command(name = "vellum")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'vellum <command> --help' for more information on a specific command.")]
struct Cli {
    /// Identity recorded on snapshots and audit entries
    #[arg(long, global = true, env = "VELLUM_ACTOR", default_value = "anonymous")]
    actor: String,

    /// Role of the actor: guest, student, teacher, admin
    #[arg(long, global = true, env = "VELLUM_ROLE", default_value = "student")]
    role: Role,

    /// Store root directory (overrides the config file)
    #[arg(long, global = true, env = "VELLUM_STORE")]
    store: Option<PathBuf>,

    /// Config file path
    #[arg(long, global = true, env = "VELLUM_CONFIG", default_value = "vellum.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a project ledger with an initial snapshot
    ///
    /// Fails if the project already has snapshots. The initial graph
    /// may come from a JSON file; without one the ledger starts empty.
    Init {
        /// Project to create
        project: ProjectId,

        /// Initial graph JSON
        #[arg(long)]
        file: Option<PathBuf>,

        /// Explanation recorded on the snapshot
        #[arg(long)]
        rationale: Option<String>,
    },

    /// Merge a candidate graph into the project head
    ///
    /// The candidate is checked for semantic conflicts against the
    /// current head. Clean candidates merge field-by-field (last write
    /// wins on overlap) and append a new snapshot; conflicted ones are
    /// printed and nothing is written.
    Resolve {
        /// Target project
        project: ProjectId,

        /// Candidate graph JSON
        #[arg(long)]
        file: PathBuf,

        /// Explanation recorded on the snapshot
        #[arg(long)]
        rationale: Option<String>,

        /// Print the merged snapshot (or the conflict list) as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge a generated candidate, stamping its provenance
    ///
    /// Reads a generator's output file: a graph plus optional rationale
    /// and confidence. The merge path is the same as 'resolve'; the
    /// snapshot additionally records which source produced it.
    Ingest {
        /// Target project
        project: ProjectId,

        /// Generator output JSON
        #[arg(long)]
        file: PathBuf,

        /// Source name recorded on the snapshot
        #[arg(long, default_value = "file")]
        source: String,

        /// Prompt to hand to the source (file sources ignore it)
        #[arg(long)]
        prompt: Option<String>,
    },

    /// List the snapshot ledger, newest first
    History {
        /// Project to inspect
        project: ProjectId,

        /// Maximum snapshots to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print one snapshot as JSON (the head when no version is given)
    Show {
        /// Project to inspect
        project: ProjectId,

        /// Snapshot version
        #[arg(long)]
        version: Option<u64>,
    },

    /// Structural difference between two snapshot versions
    Diff {
        /// Project to inspect
        project: ProjectId,

        /// Older version
        from: u64,

        /// Newer version
        to: u64,

        /// Print the delta as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay an old version as the new head
    ///
    /// History is never rewritten: the target's content is appended as
    /// a fresh snapshot that records which version it replays.
    Rollback {
        /// Target project
        project: ProjectId,

        /// Version to replay
        version: u64,

        /// Explanation recorded on the snapshot
        #[arg(long)]
        rationale: Option<String>,
    },

    /// Show recent audit entries, newest first
    Audit {
        /// Project to inspect
        project: ProjectId,

        /// Maximum entries to print
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage reviewable modules
    #[command(subcommand)]
    Module(module::ModuleCommands),

    /// Alias for 'module' (shorter to type)
    #[command(subcommand, name = "mod")]
    Mod(module::ModuleCommands),

    /// Propose and review edits against a module
    #[command(subcommand)]
    Edit(edit::EditCommands),

    /// Generate shell completions
    Completions {
        /// Shell to generate for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    vellum::telemetry::init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "vellum", &mut io::stdout());
        return Ok(());
    }

    let ctx = context::CliContext::open(cli.actor, cli.role, cli.store, &cli.config)?;

    match cli.command {
        Commands::Init {
            project,
            file,
            rationale,
        } => project::init(&ctx, &project, file.as_deref(), rationale),
        Commands::Resolve {
            project,
            file,
            rationale,
            json,
        } => project::resolve(&ctx, &project, &file, rationale, json),
        Commands::Ingest {
            project,
            file,
            source,
            prompt,
        } => project::ingest(&ctx, &project, file, &source, prompt.as_deref()),
        Commands::History { project, limit } => project::history(&ctx, &project, limit),
        Commands::Show { project, version } => project::show(&ctx, &project, version),
        Commands::Diff {
            project,
            from,
            to,
            json,
        } => project::diff(&ctx, &project, from, to, json),
        Commands::Rollback {
            project,
            version,
            rationale,
        } => project::rollback(&ctx, &project, version, rationale),
        Commands::Audit {
            project,
            limit,
            json,
        } => project::audit(&ctx, &project, limit, json),
        Commands::Module(cmd) | Commands::Mod(cmd) => module::run(cmd, &ctx),
        Commands::Edit(cmd) => edit::run(cmd, &ctx),
        // Handled before the store is opened.
        Commands::Completions { .. } => Ok(()),
    }
}
