//! Reduction groups: the inputs reduced together and where results go.
//!
//! An intra group is one experiment whose inputs are its run output
//! directories; the inter group is the whole batch whose inputs are the
//! per-experiment statistics directories. Groups own disjoint output
//! subtrees and can be reduced concurrently.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use batchlab_core::{io_error, BatchError, BatchLayout};
use batchlab_exp::parse_run_leaf;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::stats::Statistic;

/// Directory holding collated files inside a group output directory.
pub const COLLATED_DIR: &str = "collated";

/// Granularity of the inputs of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Inputs are runs of one experiment.
    Run,
    /// Inputs are experiments of one batch.
    Experiment,
}

/// Identifies a table inside one input: file stem plus, for processed
/// inputs, the statistic it holds.
pub type SourceKey = (String, Option<Statistic>);

/// One member of a reduction group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInput {
    /// Run or experiment index.
    pub index: usize,
    /// Column name used for this input in collated files, e.g. `run0`.
    pub identity: String,
    /// Directory holding the input tables.
    pub dir: PathBuf,
}

impl GroupInput {
    /// Tables in this input, keyed by stem and statistic.
    pub fn tables(&self, scope: Scope, extension: &str) -> Result<BTreeMap<SourceKey, PathBuf>, BatchError> {
        let suffix = format!(".{extension}");
        let mut tables = BTreeMap::new();
        for entry in list(&self.dir)? {
            if !entry.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some(body) = name.strip_suffix(&suffix) else {
                continue;
            };
            if body.is_empty() || body.starts_with('.') {
                continue;
            }
            let key = match scope {
                Scope::Run => (body.to_string(), None),
                Scope::Experiment => match body.rsplit_once('.') {
                    Some((stem, stat)) if !stem.is_empty() => match Statistic::parse(stat) {
                        Some(stat) => (stem.to_string(), Some(stat)),
                        None => continue,
                    },
                    _ => continue,
                },
            };
            tables.insert(key, entry);
        }
        Ok(tables)
    }
}

/// Inputs reduced together plus their output locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionGroup {
    /// Input granularity.
    pub scope: Scope,
    /// Experiment index for intra groups.
    pub experiment: Option<usize>,
    /// Inputs ordered by index.
    pub inputs: Vec<GroupInput>,
    /// Processed statistics directory.
    pub output_dir: PathBuf,
}

impl ReductionGroup {
    /// Runs of experiment `index`, from `exp-outputs/exp<index>`.
    pub fn intra(layout: &BatchLayout, index: usize) -> Result<Self, BatchError> {
        let root = layout.exp_output_dir(index);
        let mut inputs = Vec::new();
        for dir in list(&root)? {
            if !dir.is_dir() {
                continue;
            }
            let leaf = dir.file_name().and_then(|name| name.to_str()).unwrap_or_default();
            match parse_run_leaf(leaf) {
                Some(run) => inputs.push(GroupInput {
                    index: run,
                    identity: format!("run{run}"),
                    dir,
                }),
                None => debug!(dir = %dir.display(), "skipping non-run directory"),
            }
        }
        inputs.sort_by_key(|input| input.index);
        Ok(Self {
            scope: Scope::Run,
            experiment: Some(index),
            inputs,
            output_dir: layout.exp_stat_dir(index),
        })
    }

    /// Experiments of the batch, from `statistics/exp<i>`.
    pub fn inter(layout: &BatchLayout) -> Result<Self, BatchError> {
        let inputs = experiment_dirs(&layout.stat_root)?
            .into_iter()
            .map(|(index, dir)| GroupInput {
                index,
                identity: BatchLayout::exp_dir_name(index),
                dir,
            })
            .collect();
        Ok(Self {
            scope: Scope::Experiment,
            experiment: None,
            inputs,
            output_dir: layout.inter_stat_dir(),
        })
    }

    /// Collated files directory.
    pub fn collate_dir(&self) -> PathBuf {
        self.output_dir.join(COLLATED_DIR)
    }

    /// Short name used in logs and error context.
    pub fn name(&self) -> String {
        match self.experiment {
            Some(index) => BatchLayout::exp_dir_name(index),
            None => "inter".to_string(),
        }
    }

    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// True when there is nothing to reduce.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// One intra group per `exp-outputs/exp<i>`, ordered by experiment index.
pub fn intra_groups(layout: &BatchLayout) -> Result<Vec<ReductionGroup>, BatchError> {
    experiment_dirs(&layout.output_root)?
        .into_iter()
        .map(|(index, _)| ReductionGroup::intra(layout, index))
        .collect()
}

fn experiment_dirs(root: &Path) -> Result<Vec<(usize, PathBuf)>, BatchError> {
    let mut dirs: Vec<(usize, PathBuf)> = list(root)?
        .into_iter()
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let index = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix("exp"))
                .and_then(|digits| digits.parse().ok())?;
            Some((index, path))
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn list(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            entry
                .map(|entry| entry.into_path())
                .map_err(|err| io_error("reduce.list", dir, err))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn intra_inputs_follow_run_order() {
        let dir = tempdir().expect("tmp dir");
        let layout = BatchLayout::new(dir.path());
        for run in [10, 2, 0] {
            fs::create_dir_all(layout.exp_output_dir(1).join(format!("arena_run{run}_output"))).expect("mkdir");
        }
        fs::create_dir_all(layout.exp_output_dir(1).join("logs")).expect("mkdir");
        let group = ReductionGroup::intra(&layout, 1).expect("group");
        let identities: Vec<_> = group.inputs.iter().map(|input| input.identity.as_str()).collect();
        assert_eq!(identities, ["run0", "run2", "run10"]);
        assert_eq!(group.output_dir, layout.exp_stat_dir(1));
        assert_eq!(group.name(), "exp1");
    }

    #[test]
    fn experiment_tables_are_keyed_by_statistic() {
        let dir = tempdir().expect("tmp dir");
        let input = GroupInput {
            index: 0,
            identity: "exp0".into(),
            dir: dir.path().to_path_buf(),
        };
        for name in ["pos.mean.csv", "pos.stddev.csv", "pos.csv", "a.b.max.csv", "notes.txt"] {
            fs::write(dir.path().join(name), "x\n1\n").expect("write");
        }
        let tables = input.tables(Scope::Experiment, "csv").expect("tables");
        let keys: Vec<_> = tables.keys().cloned().collect();
        assert_eq!(
            keys,
            [
                ("a.b".to_string(), Some(Statistic::Max)),
                ("pos".to_string(), Some(Statistic::Mean)),
                ("pos".to_string(), Some(Statistic::Stddev)),
            ]
        );
        let raw = input.tables(Scope::Run, "csv").expect("tables");
        assert!(raw.contains_key(&("pos.mean".to_string(), None)));
    }

    #[test]
    fn inter_skips_its_own_output_dir() {
        let dir = tempdir().expect("tmp dir");
        let layout = BatchLayout::new(dir.path());
        for index in [1, 0] {
            fs::create_dir_all(layout.exp_stat_dir(index)).expect("mkdir");
        }
        fs::create_dir_all(layout.inter_stat_dir()).expect("mkdir");
        let group = ReductionGroup::inter(&layout).expect("group");
        assert_eq!(group.len(), 2);
        assert_eq!(group.inputs[1].identity, "exp1");
        assert_eq!(group.collate_dir(), layout.inter_stat_dir().join("collated"));
    }
}
