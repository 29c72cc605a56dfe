//! Statistics and collation over a reduction group.
//!
//! Statistics and raw collations never share a file: each statistic of a
//! stem gets `<stem>.<stat>.<ext>` and each collated column gets its own
//! file under `collated/`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use batchlab_core::{BatchError, BatchLayout, ErrorInfo, PipelineConfig, ReduceSpec};
use batchlab_exp::read_batch_manifest;
use tracing::{debug, info, warn};

use crate::group::{intra_groups, GroupInput, ReductionGroup, Scope, SourceKey};
use crate::selection::Selection;
use crate::stats::{Statistic, Summary};
use crate::table::{delimiter_byte, write_records, Table};

/// Stem of the inter-experiment identity table.
pub const EXPERIMENT_INDEX: &str = "experiments";

/// Files written for one group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupReport {
    /// Group name, `exp<i>` or `inter`.
    pub group: String,
    /// Statistic files.
    pub processed: Vec<PathBuf>,
    /// Collated files.
    pub collated: Vec<PathBuf>,
    /// Identity table, inter group only.
    pub experiments: Option<PathBuf>,
}

/// Reduces groups according to a [`ReduceSpec`].
#[derive(Debug, Clone)]
pub struct Reducer {
    stats: &'static [Statistic],
    delimiter: u8,
    extension: String,
    selection: Selection,
}

/// Tables of one source across the inputs that have it.
struct Gathered<'g> {
    members: Vec<(&'g GroupInput, Table)>,
    columns: Vec<String>,
}

impl Gathered<'_> {
    fn rows(&self) -> usize {
        self.members.iter().map(|(_, table)| table.len()).max().unwrap_or(0)
    }
}

impl Reducer {
    /// Reducer for `spec`; products narrow the selection.
    pub fn new(spec: &ReduceSpec) -> Result<Self, BatchError> {
        Ok(Self {
            stats: Statistic::for_kind(spec.stats),
            delimiter: delimiter_byte(spec.delimiter)?,
            extension: spec.extension.clone(),
            selection: Selection::from_products(&spec.products),
        })
    }

    /// Replaces the selection.
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Active selection.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Statistic files, then collations.
    pub fn reduce(&self, group: &ReductionGroup) -> Result<GroupReport, BatchError> {
        let processed = self.reduce_statistics(group)?;
        let collated = self.collate(group)?;
        info!(
            group = %group.name(),
            inputs = group.len(),
            processed = processed.len(),
            collated = collated.len(),
            "reduced group"
        );
        Ok(GroupReport {
            group: group.name(),
            processed,
            collated,
            experiments: None,
        })
    }

    /// Writes every configured statistic of every selected stem.
    pub fn reduce_statistics(&self, group: &ReductionGroup) -> Result<Vec<PathBuf>, BatchError> {
        self.in_group(group, || {
            let sources = self.discover(group)?;
            let variant = match group.scope {
                Scope::Run => None,
                Scope::Experiment => Some(Statistic::Mean),
            };
            let mut written = Vec::new();
            for stem in self.selection.stems(&available(&sources, variant)) {
                let Some(gathered) = self.gather(group, &sources, &stem, variant)? else {
                    continue;
                };
                let summaries = summarize(&gathered);
                for stat in self.stats {
                    let mut table = Table::new(gathered.columns.clone());
                    for row in &summaries {
                        table.push_row(row.iter().map(|summary| summary.get(*stat)).collect());
                    }
                    let path = group
                        .output_dir
                        .join(format!("{stem}.{stat}.{}", self.extension));
                    table.write(&path, self.delimiter)?;
                    debug!(path = %path.display(), "wrote statistic");
                    written.push(path);
                }
            }
            Ok(written)
        })
    }

    /// Writes one file per selected (stem, column) holding that column from
    /// every input, side by side and unreduced.
    pub fn collate(&self, group: &ReductionGroup) -> Result<Vec<PathBuf>, BatchError> {
        self.in_group(group, || {
            let sources = self.discover(group)?;
            let variants: Vec<Option<Statistic>> = match group.scope {
                Scope::Run => vec![None],
                Scope::Experiment => self.stats.iter().copied().map(Some).collect(),
            };
            let mut written = Vec::new();
            for variant in variants {
                for stem in self.selection.stems(&available(&sources, variant)) {
                    let Some(gathered) = self.gather(group, &sources, &stem, variant)? else {
                        continue;
                    };
                    let header: Vec<String> = gathered
                        .members
                        .iter()
                        .map(|(input, _)| input.identity.clone())
                        .collect();
                    for column in &gathered.columns {
                        let mut table = Table::new(header.clone());
                        for row in 0..gathered.rows() {
                            table.push_row(
                                gathered
                                    .members
                                    .iter()
                                    .map(|(_, source)| cell(source, row, column))
                                    .collect(),
                            );
                        }
                        let name = match variant {
                            Some(stat) => format!("{stem}-{column}.{stat}.{}", self.extension),
                            None => format!("{stem}-{column}.{}", self.extension),
                        };
                        let path = group.collate_dir().join(name);
                        table.write(&path, self.delimiter)?;
                        debug!(path = %path.display(), "wrote collation");
                        written.push(path);
                    }
                }
            }
            Ok(written)
        })
    }

    /// Writes `experiments.<ext>` mapping experiment identities to their
    /// label and criteria parameters.
    pub fn write_experiment_index(&self, layout: &BatchLayout) -> Result<PathBuf, BatchError> {
        let manifest = read_batch_manifest(layout)?;
        let params: BTreeSet<&String> = manifest
            .experiments
            .iter()
            .flat_map(|entry| entry.params.keys())
            .collect();
        let mut header = vec!["experiment".to_string(), "label".to_string()];
        header.extend(params.iter().map(|name| name.to_string()));
        let rows = manifest.experiments.iter().map(|entry| {
            let mut row = vec![BatchLayout::exp_dir_name(entry.index), entry.label.clone()];
            row.extend(params.iter().map(|name| {
                entry
                    .params
                    .get(*name)
                    .map(|value| value.to_string())
                    .unwrap_or_default()
            }));
            row
        });
        let path = layout
            .inter_stat_dir()
            .join(format!("{EXPERIMENT_INDEX}.{}", self.extension));
        write_records(&path, &header, rows, self.delimiter)?;
        Ok(path)
    }

    fn in_group<T>(
        &self,
        group: &ReductionGroup,
        body: impl FnOnce() -> Result<T, BatchError>,
    ) -> Result<T, BatchError> {
        body().map_err(|err| match group.experiment {
            Some(index) => err.with_context("experiment", index.to_string()),
            None => err.with_context("group", group.name()),
        })
    }

    fn discover(&self, group: &ReductionGroup) -> Result<Vec<BTreeMap<SourceKey, PathBuf>>, BatchError> {
        group
            .inputs
            .iter()
            .map(|input| input.tables(group.scope, &self.extension))
            .collect()
    }

    /// Reads `stem` from every input that has it and checks the column sets
    /// agree. `None` when no input has the stem or nothing is selected.
    fn gather<'g>(
        &self,
        group: &'g ReductionGroup,
        sources: &[BTreeMap<SourceKey, PathBuf>],
        stem: &str,
        variant: Option<Statistic>,
    ) -> Result<Option<Gathered<'g>>, BatchError> {
        let key: SourceKey = (stem.to_string(), variant);
        let mut members: Vec<(&GroupInput, Table)> = Vec::new();
        let mut missing = Vec::new();
        for (input, tables) in group.inputs.iter().zip(sources) {
            let Some(path) = tables.get(&key) else {
                missing.push(input.identity.as_str());
                continue;
            };
            let table = Table::read(path, self.delimiter)
                .map_err(|err| err.with_context("input", input.identity.clone()))?;
            if let Some((first, reference)) = members.first() {
                if !same_column_set(table.columns(), reference.columns()) {
                    return Err(BatchError::SchemaMismatch(
                        ErrorInfo::new("reduce.schema", "inputs disagree on the column set")
                            .with_context("stem", stem)
                            .with_context("input", input.identity.clone())
                            .with_context("file", path.display().to_string())
                            .with_hint(format!(
                                "{} has [{}], {} has [{}]",
                                first.identity,
                                reference.columns().join(", "),
                                input.identity,
                                table.columns().join(", ")
                            )),
                    ));
                }
            }
            members.push((input, table));
        }
        if members.is_empty() {
            warn!(group = %group.name(), stem, "no input provides the stem");
            return Ok(None);
        }
        if !missing.is_empty() {
            warn!(group = %group.name(), stem, missing = ?missing, "stem missing from some inputs");
        }
        let columns = self.selection.columns(stem, members[0].1.columns())?;
        if columns.is_empty() {
            return Ok(None);
        }
        Ok(Some(Gathered { members, columns }))
    }
}

/// Column order may differ between inputs; cells are looked up by name.
fn same_column_set(left: &[String], right: &[String]) -> bool {
    let left: BTreeSet<&str> = left.iter().map(String::as_str).collect();
    let right: BTreeSet<&str> = right.iter().map(String::as_str).collect();
    left == right
}

/// Stems present in any input for `variant`.
fn available(sources: &[BTreeMap<SourceKey, PathBuf>], variant: Option<Statistic>) -> BTreeSet<String> {
    sources
        .iter()
        .flat_map(|tables| tables.keys())
        .filter(|(_, stat)| *stat == variant)
        .map(|(stem, _)| stem.clone())
        .collect()
}

/// Per row, per selected column summary across the members that have the row.
fn summarize(gathered: &Gathered<'_>) -> Vec<Vec<Summary>> {
    (0..gathered.rows())
        .map(|row| {
            gathered
                .columns
                .iter()
                .map(|column| {
                    let values: Vec<f64> = gathered
                        .members
                        .iter()
                        .map(|(_, table)| cell(table, row, column))
                        .collect();
                    Summary::of(&values)
                })
                .collect()
        })
        .collect()
}

fn cell(table: &Table, row: usize, column: &str) -> f64 {
    table
        .column_index(column)
        .and_then(|index| table.rows().get(row).map(|values| values[index]))
        .unwrap_or(f64::NAN)
}

/// Reduces every experiment of the batch in index order.
pub fn reduce_intra(config: &PipelineConfig) -> Result<Vec<GroupReport>, BatchError> {
    let reducer = Reducer::new(&config.reduce)?;
    let groups = intra_groups(&config.layout())?;
    let mut reports = Vec::with_capacity(groups.len());
    for group in &groups {
        if group.is_empty() {
            warn!(group = %group.name(), "experiment has no run outputs");
            continue;
        }
        reports.push(reducer.reduce(group)?);
    }
    Ok(reports)
}

/// Reduces the per-experiment statistics across the batch and writes the
/// experiment identity table.
pub fn reduce_inter(config: &PipelineConfig) -> Result<GroupReport, BatchError> {
    let layout = config.layout();
    let reducer = Reducer::new(&config.reduce)?;
    let group = ReductionGroup::inter(&layout)?;
    let mut report = reducer.reduce(&group)?;
    report.experiments = Some(reducer.write_experiment_index(&layout)?);
    Ok(report)
}
