#![allow(dead_code)]

use std::fs;
use std::path::Path;

use batchlab_core::{load_config, PipelineConfig};

pub const ARENA: &str = r#"<?xml version="1.0"?>
<argos-configuration>
  <framework>
    <experiment length="0" random_seed="0"/>
  </framework>
  <controllers>
    <__CONTROLLER__ id="fb">
      <params speed="1"/>
    </__CONTROLLER__>
  </controllers>
  <arena size="10, 10, 2">
    <distribute>
      <entity quantity="0"/>
    </distribute>
  </arena>
  <loop_functions output="none"/>
</argos-configuration>
"#;

pub const CONFIG: &str = r#"template: arena.argos
runs: 2
batch_root: batch
master_seed: 42
engine:
  seed: { path: ./framework/experiment, attr: random_seed }
  duration: { path: ./framework/experiment, attr: length, value: 600 }
  controller: { placeholder: ./controllers/__CONTROLLER__, name: foraging }
  output_dir: { path: ./loop_functions, attr: output }
  population: { path: ./arena/distribute/entity, attr: quantity }
  agents:
    replicate:
      - parent: ./arena
        tag: robot
        attrs: { id: "fb__UUID__" }
criteria:
  speed: { path: ./controllers/__CONTROLLER__/params, attr: speed, kind: float }
exec:
  command: "argos3 -c {input} --seed {seed}"
"#;

/// Writes the arena template and configuration into `dir` and loads it.
pub fn arena_config(dir: &Path) -> PipelineConfig {
    fs::write(dir.join("arena.argos"), ARENA).expect("write template");
    let path = dir.join("batch.yaml");
    fs::write(&path, CONFIG).expect("write config");
    load_config(&path).expect("load config")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
