use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use serde_json::Value;

use vellum::audit::AuditTrail;
use vellum::generator::{self, FileSource};
use vellum::model::graph::{Edge, GraphPayload};
use vellum::model::snapshot::{Snapshot, SnapshotContent, Version};
use vellum::model::types::ProjectId;
use vellum::resolve::{ResolveOptions, ResolveOutcome};
use vellum::store::ProjectStore as _;

use crate::context::CliContext;

/// Seed a project with its first snapshot.
pub fn init(
    ctx: &CliContext,
    project: &ProjectId,
    file: Option<&Path>,
    rationale: Option<String>,
) -> Result<()> {
    if let Some(head) = ctx.store.latest_snapshot(project)? {
        bail!(
            "project '{project}' already has snapshots (head is version {}); \
             use 'vellum resolve' to submit changes",
            head.version
        );
    }
    let graph = if let Some(path) = file {
        read_graph(path)?
    } else {
        GraphPayload::default()
    };
    let mut content = SnapshotContent::from_graph(graph.normalized());
    content.rationale = rationale;
    let snapshot = ctx.ledger().append(project, &ctx.actor, content)?;
    print_snapshot("Initialized", &snapshot);
    Ok(())
}

/// Merge a candidate graph file into the project head.
pub fn resolve(
    ctx: &CliContext,
    project: &ProjectId,
    file: &Path,
    rationale: Option<String>,
    json: bool,
) -> Result<()> {
    let graph = read_graph(file)?;
    let mut options = ResolveOptions::new();
    if let Some(rationale) = rationale {
        options = options.with_rationale(rationale);
    }
    let outcome = ctx.resolver().resolve(project, &ctx.actor, graph, &options)?;
    report(&outcome, json)
}

/// Merge a generator's output file, stamping its provenance.
pub fn ingest(
    ctx: &CliContext,
    project: &ProjectId,
    file: PathBuf,
    source: &str,
    prompt: Option<&str>,
) -> Result<()> {
    let source = FileSource::new(file, source);
    let resolver = ctx.resolver();
    let outcome = generator::ingest(
        &resolver,
        project,
        &ctx.actor,
        &source,
        prompt.unwrap_or_default(),
    )?;
    report(&outcome, false)
}

/// Print the snapshot ledger, newest first.
pub fn history(ctx: &CliContext, project: &ProjectId, limit: usize) -> Result<()> {
    let mut snapshots = ctx.ledger().history(project)?;
    if snapshots.is_empty() {
        println!("No snapshots for '{project}'");
        return Ok(());
    }
    let total = snapshots.len();
    snapshots.truncate(limit);
    for snapshot in &snapshots {
        println!(
            "{}  {}  {} node(s), {} edge(s){}",
            snapshot.version,
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.nodes.len(),
            snapshot.edges.len(),
            marker(snapshot)
        );
        if let Some(rationale) = &snapshot.rationale {
            println!("        {rationale}");
        }
    }
    if total > limit {
        println!("({} older snapshot(s) not shown)", total - limit);
    }
    Ok(())
}

/// Print one snapshot as JSON (the head when no version is given).
pub fn show(ctx: &CliContext, project: &ProjectId, version: Option<u64>) -> Result<()> {
    let ledger = ctx.ledger();
    let snapshot = if let Some(raw) = version {
        ledger.get(project, Version::new(raw))?
    } else {
        ledger.latest(project)?
    };
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Print the structural difference between two stored versions.
pub fn diff(ctx: &CliContext, project: &ProjectId, from: u64, to: u64, json: bool) -> Result<()> {
    let delta = ctx
        .ledger()
        .diff(project, Version::new(from), Version::new(to))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&delta)?);
        return Ok(());
    }
    if delta.is_empty() {
        println!("No structural difference between {from} and {to}");
        return Ok(());
    }
    println!("{delta}");
    for node in &delta.added_nodes {
        println!("  + node {} ({})", node.id, node.kind);
    }
    for node in &delta.removed_nodes {
        println!("  - node {} ({})", node.id, node.kind);
    }
    for change in &delta.changed_nodes {
        println!("  ~ node {}", change.id);
    }
    for edge in &delta.added_edges {
        println!("  + edge {}", edge_desc(edge));
    }
    for edge in &delta.removed_edges {
        println!("  - edge {}", edge_desc(edge));
    }
    Ok(())
}

/// Replay an old version as the new head.
pub fn rollback(
    ctx: &CliContext,
    project: &ProjectId,
    version: u64,
    rationale: Option<String>,
) -> Result<()> {
    let snapshot = ctx
        .ledger()
        .rollback(project, &ctx.actor, Version::new(version), rationale)?;
    println!(
        "Rolled '{project}' back to version {version}; new head is {}",
        snapshot.version
    );
    Ok(())
}

/// Print recent audit entries, newest first.
pub fn audit(ctx: &CliContext, project: &ProjectId, limit: usize, json: bool) -> Result<()> {
    let entries = AuditTrail::new(&ctx.store).recent(project, limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No audit entries for '{project}'");
        return Ok(());
    }
    for entry in &entries {
        println!("{entry}");
        if !entry.details.is_empty() {
            println!("        {}", serde_json::to_string(&entry.details)?);
        }
    }
    Ok(())
}

/// Read a graph payload from a JSON file.
pub fn read_graph(path: &Path) -> Result<GraphPayload> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {} as a graph", path.display()))
}

/// Print a merge outcome. A blocked merge exits 1: the ledger was not
/// touched, and the conflict list is the output.
fn report(outcome: &ResolveOutcome, json: bool) -> Result<()> {
    match outcome {
        ResolveOutcome::Merged(snapshot) => {
            if json {
                println!("{}", serde_json::to_string_pretty(snapshot)?);
            } else {
                print_snapshot("Merged", snapshot);
            }
            Ok(())
        }
        ResolveOutcome::Conflicted(conflicts) => {
            if json {
                println!("{}", serde_json::to_string_pretty(conflicts)?);
            } else {
                print!("Merge blocked: {conflicts}");
            }
            std::process::exit(1);
        }
    }
}

fn print_snapshot(verb: &str, snapshot: &Snapshot) {
    println!(
        "{verb} '{}' at version {} ({} node(s), {} edge(s))",
        snapshot.project_id,
        snapshot.version,
        snapshot.nodes.len(),
        snapshot.edges.len()
    );
}

fn marker(snapshot: &Snapshot) -> String {
    if let Some(from) = snapshot.rolled_back_from() {
        return format!("  [rolled back from {from}]");
    }
    if snapshot.metadata.contains_key("derivedFrom") {
        return "  [flattened from modules]".to_owned();
    }
    if let Some(source) = snapshot.metadata.get("generatedBy").and_then(Value::as_str) {
        return format!("  [generated by {source}]");
    }
    String::new()
}

fn edge_desc(edge: &Edge) -> String {
    edge.label.as_ref().map_or_else(
        || format!("{} -> {}", edge.source, edge.target),
        |label| format!("{} -> {} ({label})", edge.source, edge.target),
    )
}
