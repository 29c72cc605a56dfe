//! Turns experiment points into per-run documents on disk.
//!
//! Each experiment is written into a staging directory and renamed into
//! place, so `exp-inputs/exp<i>` is either complete or absent. Experiments
//! share nothing but the read-only template and can be materialized
//! concurrently.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use batchlab_core::{
    content_hash, io_error, stable_hash_string, BatchError, BatchLayout, ErrorInfo, PipelineConfig,
};
use batchlab_doc::{BackendRegistry, DocumentTree, FormatBackend, Mutation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::commands::{render_command, COMMANDS_FILE};
use crate::criteria::{BatchCriteria, CriteriaRegistry, ExperimentPoint};
use crate::manifest::{
    prior_seeds, write_json, BatchManifest, ExperimentEntry, ExperimentManifest, RunRecord,
    BATCH_MANIFEST, EXPERIMENT_MANIFEST,
};
use crate::seeds::{assign_seeds, SeedSource};
use crate::tokens::{replicate, TokenMap, CONTROLLER_TOKEN};

/// Leaf name of the raw output directory of one run.
pub fn run_output_leaf(stem: &str, run: usize) -> String {
    format!("{stem}_run{run}_output")
}

/// Run index encoded in a raw output directory name.
pub fn parse_run_leaf(name: &str) -> Option<usize> {
    let body = name.strip_suffix("_output")?;
    let (_, run) = body.rsplit_once("_run")?;
    run.parse().ok()
}

/// Parsed template together with its identity.
#[derive(Debug, Clone)]
pub struct Template {
    tree: DocumentTree,
    hash: String,
    file_name: String,
    stem: String,
    extension: String,
}

impl Template {
    /// Reads and parses the template named by `config`.
    pub fn load(config: &PipelineConfig, registry: &BackendRegistry) -> Result<Self, BatchError> {
        let path = config.template_path();
        let format = config.template_format()?;
        let source = fs::read_to_string(&path).map_err(|err| io_error("exp.template_read", &path, err))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("template.{}", format.as_str()));
        Self::from_source(&name, &source, registry.get(format)?)
            .map_err(|err| err.with_context("file", path.display().to_string()))
    }

    /// Parses `source`, naming generated files after `file_name`.
    pub fn from_source(
        file_name: &str,
        source: &str,
        backend: Arc<dyn FormatBackend>,
    ) -> Result<Self, BatchError> {
        let extension = Path::new(file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| backend.format().as_str().to_string());
        let stem = Path::new(file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "template".to_string());
        let tree = DocumentTree::parse(source, backend)?;
        debug!(template = file_name, "parsed template");
        Ok(Self {
            tree,
            hash: content_hash(source.as_bytes()),
            file_name: file_name.to_string(),
            stem,
            extension,
        })
    }

    /// Parsed tree; never mutated.
    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    /// Hex SHA256 of the template source.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Stem used for run file names.
    pub fn stem(&self) -> &str {
        &self.stem
    }
}

/// Independent unit of materialization: one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Experiment index.
    pub index: usize,
    /// Point to realise.
    pub point: ExperimentPoint,
}

/// One serialized document of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// File name inside the experiment directory.
    pub file_name: String,
    /// Serialized contents.
    pub contents: String,
}

/// A materialized run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentRun {
    /// Experiment index.
    pub experiment: usize,
    /// Run index.
    pub run: usize,
    /// Injected seed.
    pub seed: u64,
    /// Written documents, main document first.
    pub documents: Vec<PathBuf>,
    /// Raw output directory handed to the executed program.
    pub output_dir: PathBuf,
}

/// Expands `criteria` into one work item per experiment.
pub fn plan_batch(criteria: &BatchCriteria, template: &Template) -> Result<Vec<WorkItem>, BatchError> {
    let points = criteria.expand(template.tree())?;
    info!(criteria = ?criteria.specs(), experiments = points.len(), "planned batch");
    Ok(points
        .into_iter()
        .enumerate()
        .map(|(index, point)| WorkItem { index, point })
        .collect())
}

/// Edits shared by every run of an experiment.
#[derive(Debug, Clone)]
struct EditPlan {
    tokens: TokenMap,
    head: Vec<Mutation>,
    duration: Option<Mutation>,
    tail: Vec<Mutation>,
}

impl EditPlan {
    fn run_invariant(&self) -> Vec<Mutation> {
        self.head
            .iter()
            .chain(self.duration.iter())
            .chain(self.tail.iter())
            .cloned()
            .collect()
    }
}

/// Materializes work items of one batch.
#[derive(Debug)]
pub struct Materializer<'a> {
    config: &'a PipelineConfig,
    template: &'a Template,
    layout: BatchLayout,
    seeds: SeedSource,
}

impl<'a> Materializer<'a> {
    /// Binds a configuration to a parsed template.
    pub fn new(config: &'a PipelineConfig, template: &'a Template) -> Self {
        Self {
            config,
            template,
            layout: config.layout(),
            seeds: SeedSource::from_master(config.master_seed),
        }
    }

    /// Directory layout of the batch.
    pub fn layout(&self) -> &BatchLayout {
        &self.layout
    }

    /// Fails when generated inputs already exist and overwrite is off.
    pub fn check_destination(&self) -> Result<(), BatchError> {
        let root = &self.layout.input_root;
        if self.config.overwrite || !root.exists() {
            return Ok(());
        }
        let mut entries = fs::read_dir(root).map_err(|err| io_error("exp.destination_read", root, err))?;
        if entries.next().is_some() {
            return Err(BatchError::DestinationNotEmpty(
                ErrorInfo::new("exp.destination_not_empty", "generated inputs already exist")
                    .with_context("path", root.display().to_string())
                    .with_hint("set `overwrite: true` to regenerate the batch"),
            ));
        }
        Ok(())
    }

    /// Runs the overwrite guard and writes the batch manifest. Must succeed
    /// before any work item is materialized.
    pub fn prepare(&self, criteria: &BatchCriteria, items: &[WorkItem]) -> Result<BatchManifest, BatchError> {
        self.check_destination()?;
        let manifest = BatchManifest {
            criteria: criteria.specs(),
            dimensions: criteria.dimensions(),
            template: self.template.file_name.clone(),
            template_hash: self.template.hash.clone(),
            config_hash: stable_hash_string(self.config)?,
            runs: self.config.runs,
            experiments: items
                .iter()
                .map(|item| ExperimentEntry {
                    index: item.index,
                    label: item.point.label.clone(),
                    params: item.point.params.clone(),
                })
                .collect(),
        };
        write_json(&self.layout.input_root.join(BATCH_MANIFEST), &manifest)?;
        Ok(manifest)
    }

    fn agent_count(&self, item: &WorkItem) -> Result<usize, BatchError> {
        let agents = &self.config.engine.agents;
        item.point
            .params
            .get(&agents.param)
            .and_then(|value| value.as_i64())
            .and_then(|count| usize::try_from(count).ok())
            .or(agents.count)
            .ok_or_else(|| {
                BatchError::Config(
                    ErrorInfo::new("exp.agent_count", "replication needs an agent count")
                        .with_context("experiment", item.index.to_string())
                        .with_context("param", agents.param.clone())
                        .with_hint("vary the agent parameter or set `engine.agents.count`"),
                )
            })
    }

    fn edit_plan(&self, item: &WorkItem) -> Result<EditPlan, BatchError> {
        let engine = &self.config.engine;
        let mut tokens = TokenMap::new();
        let mut head = Vec::new();
        if let Some(controller) = &engine.controller {
            tokens = tokens.with(CONTROLLER_TOKEN, controller.name.clone());
            head.push(Mutation::ChangeTag {
                path: controller.placeholder.clone(),
                tag: controller.name.clone(),
            });
        }
        head.extend(item.point.mutations.iter().map(|mutation| tokens.substitute(mutation)));
        let duration = engine.duration.as_ref().map(|duration| {
            Mutation::set_attribute(tokens.apply(&duration.path), duration.attr.clone(), duration.value)
        });
        let mut tail = Vec::new();
        if !engine.agents.replicate.is_empty() {
            let count = self.agent_count(item)?;
            for rule in &engine.agents.replicate {
                tail.extend(
                    replicate(rule, &engine.agents.token, count)
                        .iter()
                        .map(|mutation| tokens.substitute(mutation)),
                );
            }
        }
        Ok(EditPlan {
            tokens,
            head,
            duration,
            tail,
        })
    }

    fn run_output_dir(&self, experiment: usize, run: usize) -> PathBuf {
        self.layout
            .exp_output_dir(experiment)
            .join(run_output_leaf(&self.template.stem, run))
    }

    fn render_with(
        &self,
        plan: &EditPlan,
        item: &WorkItem,
        run: usize,
        seed: u64,
    ) -> Result<Vec<RenderedDocument>, BatchError> {
        let engine = &self.config.engine;
        let tokens = &plan.tokens;
        let mut tree = self.template.tree.clone();
        tree.apply_all(&plan.head)?;
        if let Some(target) = &engine.seed {
            tree.set_attribute(&tokens.apply(&target.path), &target.attr, seed)?;
        }
        if let Some(duration) = &plan.duration {
            tree.apply(duration)?;
        }
        if let Some(target) = &engine.output_dir {
            let output = self.run_output_dir(item.index, run);
            tree.set_attribute(&tokens.apply(&target.path), &target.attr, output.display().to_string())?;
        }
        tree.apply_all(&plan.tail)?;

        let base = format!("{}_run{run}", self.template.stem);
        let extension = &self.template.extension;
        let mut documents = Vec::with_capacity(engine.splits.len() + 1);
        let mut parts = Vec::with_capacity(engine.splits.len());
        for split in &engine.splits {
            let part = tree.split_off(&tokens.apply(&split.path))?;
            parts.push(RenderedDocument {
                file_name: format!("{base}{}.{extension}", split.suffix),
                contents: part.into_string()?,
            });
        }
        documents.push(RenderedDocument {
            file_name: format!("{base}.{extension}"),
            contents: tree.into_string()?,
        });
        documents.extend(parts);
        Ok(documents)
    }

    /// Renders the documents of one run without touching the filesystem.
    pub fn render_run(&self, item: &WorkItem, run: usize, seed: u64) -> Result<Vec<RenderedDocument>, BatchError> {
        let plan = self.edit_plan(item)?;
        self.render_with(&plan, item, run, seed).map_err(|err| {
            err.with_context("experiment", item.index.to_string())
                .with_context("run", run.to_string())
        })
    }

    /// Writes every run of `item`, its manifest and command list.
    pub fn materialize(&self, item: &WorkItem) -> Result<Vec<ExperimentRun>, BatchError> {
        let with_experiment =
            |err: BatchError| err.with_context("experiment", item.index.to_string());
        let plan = self.edit_plan(item).map_err(with_experiment)?;
        let prior = if self.config.preserve_seeds {
            prior_seeds(&self.layout, item.index)
        } else {
            None
        };
        let seeds = assign_seeds(self.seeds, item.index, self.config.runs, prior.as_deref());

        let final_dir = self.layout.exp_input_dir(item.index);
        if final_dir.exists() && !self.config.overwrite {
            return Err(BatchError::DestinationNotEmpty(
                ErrorInfo::new("exp.destination_not_empty", "experiment inputs already exist")
                    .with_context("experiment", item.index.to_string())
                    .with_context("path", final_dir.display().to_string())
                    .with_hint("set `overwrite: true` to regenerate the experiment"),
            ));
        }
        let staging = self
            .layout
            .input_root
            .join(format!("{}.tmp", BatchLayout::exp_dir_name(item.index)));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|err| io_error("exp.staging_clear", &staging, err))?;
        }
        fs::create_dir_all(&staging).map_err(|err| io_error("exp.staging_create", &staging, err))?;

        let runs = match self.stage(item, &plan, &seeds, &staging, &final_dir) {
            Ok(runs) => runs,
            Err(err) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    warn!(path = %staging.display(), error = %cleanup, "staging directory left behind");
                }
                return Err(err);
            }
        };

        if final_dir.exists() {
            fs::remove_dir_all(&final_dir).map_err(|err| io_error("exp.replace", &final_dir, err))?;
        }
        fs::rename(&staging, &final_dir).map_err(|err| io_error("exp.commit", &final_dir, err))?;
        info!(
            experiment = item.index,
            label = %item.point.label,
            runs = runs.len(),
            "materialized experiment"
        );
        Ok(runs)
    }

    /// Writes every document, the command list and the manifest of `item`
    /// into `staging`. Document paths point at `final_dir`.
    fn stage(
        &self,
        item: &WorkItem,
        plan: &EditPlan,
        seeds: &[u64],
        staging: &Path,
        final_dir: &Path,
    ) -> Result<Vec<ExperimentRun>, BatchError> {
        let with_experiment =
            |err: BatchError| err.with_context("experiment", item.index.to_string());
        let mut runs = Vec::with_capacity(seeds.len());
        let mut records = Vec::with_capacity(seeds.len());
        let mut commands = String::new();
        for (run, seed) in seeds.iter().copied().enumerate() {
            let documents = self.render_with(plan, item, run, seed).map_err(|err| {
                with_experiment(err).with_context("run", run.to_string())
            })?;
            for document in &documents {
                let path = staging.join(&document.file_name);
                fs::write(&path, &document.contents).map_err(|err| io_error("exp.document_write", &path, err))?;
            }
            let output_dir = self.run_output_dir(item.index, run);
            let paths: Vec<PathBuf> = documents
                .iter()
                .map(|document| final_dir.join(&document.file_name))
                .collect();
            if let (Some(command), Some(input)) = (&self.config.exec.command, paths.first()) {
                commands.push_str(&render_command(command, input, run, seed, &output_dir));
                commands.push('\n');
            }
            records.push(RunRecord {
                run,
                seed,
                documents: documents.into_iter().map(|document| document.file_name).collect(),
                output_dir: self.relative(&output_dir),
            });
            runs.push(ExperimentRun {
                experiment: item.index,
                run,
                seed,
                documents: paths,
                output_dir,
            });
        }
        if !commands.is_empty() {
            let path = staging.join(COMMANDS_FILE);
            fs::write(&path, commands).map_err(|err| io_error("exp.commands_write", &path, err))?;
        }
        let manifest = ExperimentManifest {
            index: item.index,
            label: item.point.label.clone(),
            params: item.point.params.clone(),
            mutations: plan.run_invariant(),
            format: self.template.tree.format(),
            template_hash: self.template.hash.clone(),
            runs: records,
        };
        write_json(&staging.join(EXPERIMENT_MANIFEST), &manifest)?;
        Ok(runs)
    }

    fn relative(&self, path: &Path) -> String {
        let batch_root = self.layout.input_root.parent().unwrap_or_else(|| Path::new(""));
        path.strip_prefix(batch_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Outcome of generating a whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedBatch {
    /// Batch manifest as written.
    pub manifest: BatchManifest,
    /// Every materialized run, in experiment then run order.
    pub runs: Vec<ExperimentRun>,
}

/// Generates the batch described by `config` and `specs` sequentially.
///
/// Criteria are resolved and the destination guard checked before anything
/// is written.
pub fn generate_batch<S: AsRef<str>>(config: &PipelineConfig, specs: &[S]) -> Result<GeneratedBatch, BatchError> {
    config.validate()?;
    let template = Template::load(config, &BackendRegistry::default())?;
    let criteria = BatchCriteria::parse(&CriteriaRegistry::from_config(config), specs)?;
    let items = plan_batch(&criteria, &template)?;
    let materializer = Materializer::new(config, &template);
    let manifest = materializer.prepare(&criteria, &items)?;
    let mut runs = Vec::with_capacity(items.len() * config.runs);
    for item in &items {
        runs.extend(materializer.materialize(item)?);
    }
    Ok(GeneratedBatch { manifest, runs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_leaf_roundtrip() {
        assert_eq!(run_output_leaf("arena", 3), "arena_run3_output");
        assert_eq!(parse_run_leaf("arena_run3_output"), Some(3));
        assert_eq!(parse_run_leaf("my_run_file_run12_output"), Some(12));
        assert_eq!(parse_run_leaf("arena_run3"), None);
    }
}
