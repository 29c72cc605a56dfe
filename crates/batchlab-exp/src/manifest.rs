//! Batch and experiment manifests persisted next to the generated inputs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use batchlab_core::serde::{from_json_slice, to_canonical_json_pretty};
use batchlab_core::{io_error, BatchError, BatchLayout, DocumentFormat};
use batchlab_doc::{Mutation, Scalar};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// File name of the batch manifest under `exp-inputs`.
pub const BATCH_MANIFEST: &str = "batch.json";

/// File name of each experiment manifest.
pub const EXPERIMENT_MANIFEST: &str = "manifest.json";

/// One experiment as listed in the batch manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentEntry {
    /// Experiment index.
    pub index: usize,
    /// Point label.
    pub label: String,
    /// Criteria name to value.
    pub params: BTreeMap<String, Scalar>,
}

/// Description of the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchManifest {
    /// Canonical criteria specifications.
    pub criteria: Vec<String>,
    /// Points per criteria axis.
    pub dimensions: Vec<usize>,
    /// Template file name.
    pub template: String,
    /// Hex SHA256 of the template source.
    pub template_hash: String,
    /// Fingerprint of the canonical pipeline configuration.
    pub config_hash: String,
    /// Runs per experiment.
    pub runs: usize,
    /// Experiments in index order.
    pub experiments: Vec<ExperimentEntry>,
}

/// One materialized run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run index.
    pub run: usize,
    /// Seed injected into the run documents.
    pub seed: u64,
    /// Document file names, main document first.
    pub documents: Vec<String>,
    /// Raw output directory, relative to the batch root.
    pub output_dir: String,
}

/// Audit record of one generated experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentManifest {
    /// Experiment index.
    pub index: usize,
    /// Point label.
    pub label: String,
    /// Criteria name to value.
    pub params: BTreeMap<String, Scalar>,
    /// Run-invariant edits, in application order.
    pub mutations: Vec<Mutation>,
    /// Template format.
    pub format: DocumentFormat,
    /// Hex SHA256 of the template source.
    pub template_hash: String,
    /// Runs in index order.
    pub runs: Vec<RunRecord>,
}

impl ExperimentManifest {
    /// Seeds in run order.
    pub fn seeds(&self) -> Vec<u64> {
        self.runs.iter().map(|run| run.seed).collect()
    }
}

/// Writes `value` as canonical, indented JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), BatchError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_error("manifest.dir", parent, err))?;
    }
    let bytes = to_canonical_json_pretty(value)?;
    fs::write(path, bytes).map_err(|err| io_error("manifest.write", path, err))
}

/// Reads the batch manifest of a generated batch.
pub fn read_batch_manifest(layout: &BatchLayout) -> Result<BatchManifest, BatchError> {
    let path = layout.input_root.join(BATCH_MANIFEST);
    let bytes = fs::read(&path).map_err(|err| io_error("manifest.read", &path, err))?;
    from_json_slice(&bytes).map_err(|err| err.with_context("file", path.display().to_string()))
}

/// Reads the manifest of experiment `index`.
pub fn read_experiment_manifest(
    layout: &BatchLayout,
    index: usize,
) -> Result<ExperimentManifest, BatchError> {
    let path = layout.exp_input_dir(index).join(EXPERIMENT_MANIFEST);
    let bytes = fs::read(&path).map_err(|err| io_error("manifest.read", &path, err))?;
    from_json_slice(&bytes).map_err(|err| {
        err.with_context("file", path.display().to_string())
            .with_context("experiment", index.to_string())
    })
}

/// Seeds persisted by a previous generation of experiment `index`, if any.
/// An unreadable manifest is reported and treated as absent.
pub fn prior_seeds(layout: &BatchLayout, index: usize) -> Option<Vec<u64>> {
    let path = layout.exp_input_dir(index).join(EXPERIMENT_MANIFEST);
    if !path.exists() {
        return None;
    }
    match read_experiment_manifest(layout, index) {
        Ok(manifest) => Some(manifest.seeds()),
        Err(err) => {
            warn!(experiment = index, error = %err, "ignoring unreadable prior manifest");
            None
        }
    }
}
