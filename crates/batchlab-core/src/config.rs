//! Immutable pipeline configuration and the batch directory layout.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{io_error, BatchError, ErrorInfo};
use crate::serde::{from_yaml_slice, to_yaml_string};

/// Token replaced by the agent index when replicating per-agent tags.
pub const DEFAULT_AGENT_TOKEN: &str = "__UUID__";

/// Point parameter read for the agent count unless configured otherwise.
pub const DEFAULT_AGENT_PARAM: &str = "population_size";

fn config_error(code: &str, message: impl Into<String>) -> BatchError {
    BatchError::Config(ErrorInfo::new(code, message))
}

/// Serialization format of the template document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Element/attribute markup.
    Xml,
    /// JSON objects, arrays and scalars.
    Json,
    /// YAML mappings, sequences and scalars.
    Yaml,
}

impl DocumentFormat {
    /// Infers the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "xml" | "argos" | "launch" | "world" => Some(Self::Xml),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Infers the format from the extension of `path`.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Stable lowercase identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

/// Kind of value an axis writes into its target attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Values are rounded to integers.
    #[default]
    Int,
    /// Values are written as floating point numbers.
    Float,
}

/// An attribute on the element(s) selected by `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrTarget {
    /// Element path inside the template.
    pub path: String,
    /// Attribute name on that element.
    pub attr: String,
}

/// Experiment duration written into every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSpec {
    /// Element path inside the template.
    pub path: String,
    /// Attribute name on that element.
    pub attr: String,
    /// Duration value, in the executed program's own units.
    pub value: u64,
}

/// Controller substitution at the reserved placeholder path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSpec {
    /// Path of the placeholder element, e.g. `.//controllers/__CONTROLLER__`.
    pub placeholder: String,
    /// Tag the placeholder element is renamed to.
    pub name: String,
}

/// A tag added once per agent, with the agent token substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateRule {
    /// Parent element path.
    pub parent: String,
    /// Tag of the replicated element.
    pub tag: String,
    /// Attributes of the replicated element.
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

/// Per-agent replication settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPolicy {
    /// Point parameter holding the agent count.
    #[serde(default = "AgentPolicy::default_param")]
    pub param: String,
    /// Fixed agent count used when the point does not carry `param`.
    #[serde(default)]
    pub count: Option<usize>,
    /// Token replaced by the agent index.
    #[serde(default = "AgentPolicy::default_token")]
    pub token: String,
    /// Tags replicated once per agent.
    #[serde(default)]
    pub replicate: Vec<ReplicateRule>,
}

impl AgentPolicy {
    fn default_param() -> String {
        DEFAULT_AGENT_PARAM.to_string()
    }

    fn default_token() -> String {
        DEFAULT_AGENT_TOKEN.to_string()
    }
}

impl Default for AgentPolicy {
    fn default() -> Self {
        Self {
            param: Self::default_param(),
            count: None,
            token: Self::default_token(),
            replicate: Vec::new(),
        }
    }
}

/// Moves a subtree into its own physical document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRule {
    /// Path of the element detached from the main document.
    pub path: String,
    /// Suffix appended to the run file stem, e.g. `_robots`.
    pub suffix: String,
}

/// Engine-mandatory insertions applied to every generated run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnginePolicy {
    /// Where the run seed is written.
    #[serde(default)]
    pub seed: Option<AttrTarget>,
    /// Experiment duration.
    #[serde(default)]
    pub duration: Option<DurationSpec>,
    /// Controller substitution.
    #[serde(default)]
    pub controller: Option<ControllerSpec>,
    /// Where the per-run output directory is written.
    #[serde(default)]
    pub output_dir: Option<AttrTarget>,
    /// Target of the built-in `population_size` criteria.
    #[serde(default)]
    pub population: Option<AttrTarget>,
    /// Per-agent replication.
    #[serde(default)]
    pub agents: AgentPolicy,
    /// Split rules applied before serialization.
    #[serde(default)]
    pub splits: Vec<SplitRule>,
}

/// User-registered criteria axis target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisTargetSpec {
    /// Element path inside the template.
    pub path: String,
    /// Attribute name on that element.
    pub attr: String,
    /// Value kind written by the axis.
    #[serde(default)]
    pub kind: ValueKind,
}

/// Command list handed to the external executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExecSpec {
    /// Command template with `{input}`, `{run}`, `{seed}` and `{output}` placeholders.
    #[serde(default)]
    pub command: Option<String>,
}

/// Which distribution statistics reducers emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatsKind {
    /// Mean only.
    None,
    /// Mean, standard deviation and 95% confidence bounds.
    #[default]
    Conf95,
    /// Box and whisker statistics.
    Bw,
    /// Union of `conf95` and `bw`.
    All,
}

/// Declares the (stem, column) pairs downstream products consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSpec {
    /// Raw output file stem.
    pub stem: String,
    /// Columns of interest within that file.
    pub columns: Vec<String>,
}

/// Reduction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceSpec {
    /// Statistics emitted per processed stem.
    #[serde(default)]
    pub stats: StatsKind,
    /// Table field delimiter.
    #[serde(default = "ReduceSpec::default_delimiter")]
    pub delimiter: char,
    /// Table file extension, without the dot.
    #[serde(default = "ReduceSpec::default_extension")]
    pub extension: String,
    /// Products of interest; empty means exhaustive reduction.
    #[serde(default)]
    pub products: Vec<ProductSpec>,
}

impl ReduceSpec {
    fn default_delimiter() -> char {
        ';'
    }

    fn default_extension() -> String {
        "csv".to_string()
    }
}

impl Default for ReduceSpec {
    fn default() -> Self {
        Self {
            stats: StatsKind::default(),
            delimiter: Self::default_delimiter(),
            extension: Self::default_extension(),
            products: Vec::new(),
        }
    }
}

/// Directory layout derived from the batch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    /// Generated experiment definitions.
    pub input_root: PathBuf,
    /// Raw outputs written by the executed program.
    pub output_root: PathBuf,
    /// Processed and collated summary files.
    pub stat_root: PathBuf,
}

impl BatchLayout {
    /// Builds the layout rooted at `batch_root`.
    pub fn new(batch_root: &Path) -> Self {
        Self {
            input_root: batch_root.join("exp-inputs"),
            output_root: batch_root.join("exp-outputs"),
            stat_root: batch_root.join("statistics"),
        }
    }

    /// Directory name of experiment `index`.
    pub fn exp_dir_name(index: usize) -> String {
        format!("exp{index}")
    }

    /// Generated inputs of experiment `index`.
    pub fn exp_input_dir(&self, index: usize) -> PathBuf {
        self.input_root.join(Self::exp_dir_name(index))
    }

    /// Raw outputs of experiment `index`.
    pub fn exp_output_dir(&self, index: usize) -> PathBuf {
        self.output_root.join(Self::exp_dir_name(index))
    }

    /// Processed statistics of experiment `index`.
    pub fn exp_stat_dir(&self, index: usize) -> PathBuf {
        self.stat_root.join(Self::exp_dir_name(index))
    }

    /// Inter-experiment summaries.
    pub fn inter_stat_dir(&self) -> PathBuf {
        self.stat_root.join("inter")
    }
}

/// Immutable configuration threaded through every pipeline entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Template document path.
    pub template: PathBuf,
    /// Template format; inferred from the extension when omitted.
    #[serde(default)]
    pub format: Option<DocumentFormat>,
    /// Runs per experiment.
    #[serde(default = "PipelineConfig::default_runs")]
    pub runs: usize,
    /// Root of the batch directory layout.
    pub batch_root: PathBuf,
    /// Master seed; fresh entropy is used when absent.
    #[serde(default)]
    pub master_seed: Option<u64>,
    /// Reuse seeds recorded by a previous generation.
    #[serde(default = "PipelineConfig::default_preserve_seeds")]
    pub preserve_seeds: bool,
    /// Allow replacing previously generated experiments.
    #[serde(default)]
    pub overwrite: bool,
    /// Engine-mandatory insertions.
    #[serde(default)]
    pub engine: EnginePolicy,
    /// User-registered criteria axes.
    #[serde(default)]
    pub criteria: BTreeMap<String, AxisTargetSpec>,
    /// Executor command list.
    #[serde(default)]
    pub exec: ExecSpec,
    /// Reduction settings.
    #[serde(default)]
    pub reduce: ReduceSpec,
    /// Directory containing the configuration on disk (ignored when serializing).
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl PipelineConfig {
    const fn default_runs() -> usize {
        1
    }

    const fn default_preserve_seeds() -> bool {
        true
    }

    /// Minimal configuration for a template and batch root.
    pub fn new(template: impl Into<PathBuf>, batch_root: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            format: None,
            runs: Self::default_runs(),
            batch_root: batch_root.into(),
            master_seed: None,
            preserve_seeds: Self::default_preserve_seeds(),
            overwrite: false,
            engine: EnginePolicy::default(),
            criteria: BTreeMap::new(),
            exec: ExecSpec::default(),
            reduce: ReduceSpec::default(),
            base_dir: PathBuf::new(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Resolved template path.
    pub fn template_path(&self) -> PathBuf {
        self.resolve(&self.template)
    }

    /// Template format, explicit or inferred.
    pub fn template_format(&self) -> Result<DocumentFormat, BatchError> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        DocumentFormat::from_path(&self.template).ok_or_else(|| {
            BatchError::Config(
                ErrorInfo::new("config.format", "cannot infer template format")
                    .with_context("path", self.template.display().to_string())
                    .with_hint("set `format: xml|json|yaml`"),
            )
        })
    }

    /// Stable directory layout of the batch.
    pub fn layout(&self) -> BatchLayout {
        BatchLayout::new(&self.resolve(&self.batch_root))
    }

    /// Rejects configurations that cannot produce a well-formed batch.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.runs == 0 {
            return Err(config_error("config.runs", "at least one run per experiment is required"));
        }
        if self.template.as_os_str().is_empty() {
            return Err(config_error("config.template", "template path is empty"));
        }
        if self.batch_root.as_os_str().is_empty() {
            return Err(config_error("config.batch_root", "batch root is empty"));
        }
        let token = &self.engine.agents.token;
        if token.is_empty() && !self.engine.agents.replicate.is_empty() {
            return Err(config_error("config.agent_token", "agent token is empty"));
        }
        for rule in &self.engine.agents.replicate {
            let mentions_token = rule.parent.contains(token.as_str())
                || rule.tag.contains(token.as_str())
                || rule.attrs.values().any(|value| value.contains(token.as_str()));
            if !mentions_token {
                return Err(BatchError::Config(
                    ErrorInfo::new(
                        "config.replicate_token",
                        "replicated tag never references the agent token",
                    )
                    .with_context("tag", rule.tag.clone())
                    .with_context("token", token.clone()),
                ));
            }
        }
        for split in &self.engine.splits {
            if split.suffix.is_empty() {
                return Err(config_error("config.split_suffix", "split suffix is empty")
                    .with_context("path", split.path.clone()));
            }
        }
        let delimiter = self.reduce.delimiter;
        if !delimiter.is_ascii() || delimiter == '"' || delimiter == '\n' {
            return Err(config_error("config.delimiter", "delimiter must be one ASCII byte")
                .with_context("delimiter", delimiter.to_string()));
        }
        if self.reduce.extension.is_empty() || self.reduce.extension.starts_with('.') {
            return Err(config_error("config.extension", "extension must be non-empty, without dot"));
        }
        Ok(())
    }

    /// Produces a YAML representation of the configuration.
    pub fn to_yaml_string(&self) -> Result<String, BatchError> {
        to_yaml_string(self)
    }
}

/// Loads and validates a configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, BatchError> {
    let config_path = path.as_ref();
    let bytes = fs::read(config_path).map_err(|err| io_error("config.read", config_path, err))?;
    let mut config: PipelineConfig = from_yaml_slice(&bytes)
        .map_err(|err| err.with_context("path", config_path.display().to_string()))?;
    config.base_dir = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    config.validate()?;
    Ok(config)
}
