#![deny(missing_docs)]
#![doc = "Criteria expansion and experiment materialization for batchlab batches."]

/// Command lines for the external executor.
pub mod commands;
pub mod criteria;
pub mod manifest;
pub mod materialize;
pub mod seeds;
pub mod tokens;

pub use criteria::{
    compose, grid_index, AxisSpec, AxisTarget, BatchCriteria, Criteria, CriteriaRegistry,
    ExperimentPoint, Spacing, DEFAULT_CARDINALITY, POPULATION_SIZE,
};
pub use manifest::{
    read_batch_manifest, read_experiment_manifest, BatchManifest, ExperimentEntry,
    ExperimentManifest, RunRecord, BATCH_MANIFEST, EXPERIMENT_MANIFEST,
};
pub use materialize::{
    generate_batch, parse_run_leaf, plan_batch, run_output_leaf, ExperimentRun, GeneratedBatch,
    Materializer, RenderedDocument, Template, WorkItem,
};
pub use seeds::{assign_seeds, SeedSource};
pub use tokens::{replicate, TokenMap, CONTROLLER_TOKEN};
