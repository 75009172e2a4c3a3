//! Feeding machine-generated graphs through the merge pipeline.
//!
//! A [`GraphSource`] is anything that can turn a prompt into a candidate
//! graph: an LLM behind an HTTP API, a layout heuristic, or a file someone
//! exported. [`ingest`] runs the candidate through the same
//! [`ResolutionService`] as a hand-drawn change, stamped with where it came
//! from. Generated output gets no shortcut around conflict detection.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::VellumError;
use crate::model::graph::GraphPayload;
use crate::model::types::{Actor, ProjectId};
use crate::resolve::{ResolutionService, ResolveOptions, ResolveOutcome};
use crate::store::ProjectStore;

// ---------------------------------------------------------------------------
// GraphSource
// ---------------------------------------------------------------------------

/// A candidate graph plus whatever the source knows about it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GeneratedGraph {
    /// The candidate itself.
    #[serde(flatten)]
    pub graph: GraphPayload,

    /// The source's explanation of the change.
    #[serde(default)]
    pub rationale: Option<String>,

    /// Source confidence in `0.0..=1.0`, if it reports one.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Something that produces candidate graphs.
pub trait GraphSource {
    /// Short name for audit and metadata stamps (`"layout-bot"`, `"file"`).
    fn name(&self) -> &str;

    /// Produce a candidate for the given prompt.
    ///
    /// # Errors
    /// Whatever stops the source from producing a graph; surfaced to the
    /// caller as [`VellumError::Generator`].
    fn generate(&self, prompt: &str) -> Result<GeneratedGraph, VellumError>;
}

/// Reads a pre-generated candidate from a JSON file.
///
/// The file is an ordinary graph document (`nodes`, `edges`) with optional
/// top-level `rationale` and `confidence` fields. The prompt is ignored.
pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    /// A source that reads `path`, reported under `name`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    fn fail(&self, reason: impl Into<String>) -> VellumError {
        VellumError::Generator {
            source: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl GraphSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, _prompt: &str) -> Result<GeneratedGraph, VellumError> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| self.fail(format!("read {}: {e}", self.path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| self.fail(format!("parse {}: {e}", self.path.display())))
    }
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// Run a source's candidate through conflict-checked merging.
///
/// The resulting snapshot (if the merge succeeds) carries `generatedBy` and,
/// when the source reports one, `confidence` in its metadata, alongside the
/// service's usual `mergedBy` stamp.
///
/// # Errors
/// [`VellumError::Generator`] when the source fails; otherwise the same
/// surface as [`ResolutionService::resolve`]. Conflicts are an outcome, not
/// an error.
pub fn ingest<S: ProjectStore + ?Sized>(
    service: &ResolutionService<'_, S>,
    project: &ProjectId,
    actor: &Actor,
    source: &dyn GraphSource,
    prompt: &str,
) -> Result<ResolveOutcome, VellumError> {
    let generated = source.generate(prompt)?;
    info!(
        source = source.name(),
        nodes = generated.graph.nodes.len(),
        edges = generated.graph.edges.len(),
        "ingesting generated graph"
    );

    let mut options = ResolveOptions::new().with_metadata("generatedBy", source.name());
    if let Some(rationale) = generated.rationale {
        options = options.with_rationale(rationale);
    }
    if let Some(confidence) = generated.confidence {
        options = options.with_metadata("confidence", Value::from(confidence));
    }
    service.resolve(project, actor, generated.graph, &options)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
