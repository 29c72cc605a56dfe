mod common;

use std::fs;

use batchlab_core::BatchError;
use batchlab_doc::BackendRegistry;
use batchlab_exp::{
    generate_batch, plan_batch, read_experiment_manifest, BatchCriteria, CriteriaRegistry,
    Materializer, Template,
};
use tempfile::tempdir;

const SPEC: [&str; 1] = ["population_size.Linear3.C3"];

#[test]
fn existing_inputs_are_left_untouched_without_overwrite() {
    let dir = tempdir().expect("tmp dir");
    let config = common::arena_config(dir.path());
    generate_batch(&config, &SPEC).expect("first generation");
    let layout = config.layout();
    let run_doc = layout.exp_input_dir(0).join("arena_run0.argos");
    let before = fs::read(&run_doc).expect("read run doc");
    let manifest_before = fs::read(layout.input_root.join("batch.json")).expect("batch manifest");

    let err = generate_batch(&config, &["population_size.Linear30.C3"]).expect_err("guarded");
    assert!(matches!(err, BatchError::DestinationNotEmpty(_)));
    assert_eq!(err.info().code, "exp.destination_not_empty");
    assert!(err.info().hint.is_some());

    assert_eq!(fs::read(&run_doc).expect("reread"), before);
    assert_eq!(
        fs::read(layout.input_root.join("batch.json")).expect("reread manifest"),
        manifest_before
    );
}

#[test]
fn overwrite_preserves_persisted_seeds() {
    let dir = tempdir().expect("tmp dir");
    let mut config = common::arena_config(dir.path());
    config.master_seed = None;
    generate_batch(&config, &["population_size.Linear3.C3"]).expect("first generation");
    let layout = config.layout();
    let first: Vec<Vec<u64>> = (0..3)
        .map(|index| read_experiment_manifest(&layout, index).expect("manifest").seeds())
        .collect();

    config.overwrite = true;
    config.runs = 3;
    generate_batch(&config, &["population_size.Linear3.C3"]).expect("regeneration");
    for (index, seeds) in first.iter().enumerate() {
        let again = read_experiment_manifest(&layout, index).expect("manifest").seeds();
        assert_eq!(again.len(), 3);
        assert_eq!(&again[..2], seeds.as_slice());
        assert!(!again[..2].contains(&again[2]));
    }
}

#[test]
fn master_seed_makes_generation_reproducible() {
    let first = tempdir().expect("tmp dir");
    let second = tempdir().expect("tmp dir");
    let a = common::arena_config(first.path());
    let b = common::arena_config(second.path());
    let batch_a = generate_batch(&a, &["population_size.Linear3.C3"]).expect("a");
    let batch_b = generate_batch(&b, &["population_size.Linear3.C3"]).expect("b");
    let seeds_a: Vec<u64> = batch_a.runs.iter().map(|run| run.seed).collect();
    let seeds_b: Vec<u64> = batch_b.runs.iter().map(|run| run.seed).collect();
    assert_eq!(seeds_a, seeds_b);
    assert_eq!(
        fs::read(a.layout().exp_input_dir(2).join("manifest.json")).expect("manifest a"),
        fs::read(b.layout().exp_input_dir(2).join("manifest.json")).expect("manifest b")
    );
}

#[test]
fn work_item_refuses_to_replace_existing_experiment() {
    let dir = tempdir().expect("tmp dir");
    let config = common::arena_config(dir.path());
    generate_batch(&config, &SPEC).expect("first generation");
    let layout = config.layout();
    let run_doc = layout.exp_input_dir(0).join("arena_run0.argos");
    fs::write(&run_doc, "USER DATA").expect("edit run doc");

    let template = Template::load(&config, &BackendRegistry::default()).expect("template");
    let criteria =
        BatchCriteria::parse(&CriteriaRegistry::from_config(&config), &SPEC).expect("criteria");
    let items = plan_batch(&criteria, &template).expect("plan");
    let materializer = Materializer::new(&config, &template);

    let err = materializer.materialize(&items[0]).expect_err("guarded");
    assert!(matches!(err, BatchError::DestinationNotEmpty(_)));
    assert_eq!(err.info().context.get("experiment").map(String::as_str), Some("0"));
    assert_eq!(fs::read_to_string(&run_doc).expect("reread"), "USER DATA");
    assert!(!layout.input_root.join("exp0.tmp").exists());
}

#[test]
fn failed_render_leaves_no_staging_directory() {
    common::init_tracing();
    let dir = tempdir().expect("tmp dir");
    let mut config = common::arena_config(dir.path());
    config.engine.seed.as_mut().expect("seed target").path = "./framework/missing".into();

    let err = generate_batch(&config, &SPEC).expect_err("seed path does not exist");
    assert!(matches!(err, BatchError::PathNotFound(_)), "{err}");
    assert_eq!(err.info().context.get("experiment").map(String::as_str), Some("0"));

    let layout = config.layout();
    let leftovers: Vec<String> = fs::read_dir(&layout.input_root)
        .expect("input root")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("exp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}
