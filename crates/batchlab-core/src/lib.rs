#![deny(missing_docs)]
#![doc = "Core error taxonomy, configuration, hashing and seeding shared by the batchlab crates."]

pub mod config;
pub mod errors;
pub mod hash;
pub mod rng;
/// Canonical JSON and YAML serde helpers.
pub mod serde;

pub use config::{
    load_config, AgentPolicy, AttrTarget, AxisTargetSpec, BatchLayout, ControllerSpec,
    DocumentFormat, DurationSpec, EnginePolicy, ExecSpec, PipelineConfig, ProductSpec,
    ReduceSpec, ReplicateRule, SplitRule, StatsKind, ValueKind,
};
pub use errors::{io_error, BatchError, ErrorInfo};
pub use hash::{content_hash, stable_hash_string};
pub use rng::{derive_run_seed, derive_substream_seed, RngHandle, SEED_LIMIT};
