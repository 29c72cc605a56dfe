#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use batchlab_core::{load_config, BatchLayout, PipelineConfig};
use batchlab_exp::{generate_batch, run_output_leaf};
use walkdir::WalkDir;

pub const TEMPLATE: &str = r#"<?xml version="1.0"?>
<sim>
  <experiment seed="0"/>
  <population size="0"/>
</sim>
"#;

const CONFIG: &str = r#"template: sim.xml
runs: 3
batch_root: batch
master_seed: 1
engine:
  seed: { path: ./experiment, attr: seed }
  population: { path: ./population, attr: size }
"#;

/// Writes template and configuration, appending `reduce` verbatim.
pub fn config(dir: &Path, reduce: &str) -> PipelineConfig {
    fs::write(dir.join("sim.xml"), TEMPLATE).expect("write template");
    let path = dir.join("batch.yaml");
    fs::write(&path, format!("{CONFIG}{reduce}")).expect("write config");
    load_config(&path).expect("load config")
}

/// Generates three experiments (population 10, 20, 30) of three runs.
pub fn generated(dir: &Path, reduce: &str) -> PipelineConfig {
    let config = config(dir, reduce);
    generate_batch(&config, &["population_size.Linear30.C3"]).expect("generate");
    config
}

/// Writes a raw output table for one run.
pub fn write_raw(layout: &BatchLayout, exp: usize, run: usize, file: &str, contents: &str) {
    let dir = layout.exp_output_dir(exp).join(run_output_leaf("sim", run));
    fs::create_dir_all(&dir).expect("run dir");
    fs::write(dir.join(file), contents).expect("raw table");
}

/// `F.csv` with column X = 2, 4, 6 across runs in row 0 (offset by ten per
/// experiment) and Y = experiment index.
pub fn write_standard_outputs(layout: &BatchLayout) {
    for exp in 0..3 {
        for run in 0..3 {
            let x = 2 * (run + 1) + 10 * exp;
            write_raw(layout, exp, run, "F.csv", &format!("X;Y\n{x};{exp}\n1;{run}\n"));
        }
    }
}

/// Every file under `root`, with its contents, relative to `root`.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.expect("walk"))
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).expect("prefix").to_path_buf();
            let bytes = fs::read(entry.path()).expect("read");
            (relative, bytes)
        })
        .collect()
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
