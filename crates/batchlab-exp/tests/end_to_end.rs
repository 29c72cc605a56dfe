mod common;

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use batchlab_doc::{DocumentTree, Scalar, XmlBackend};
use batchlab_exp::{generate_batch, read_batch_manifest, read_experiment_manifest};
use tempfile::tempdir;

fn parse(path: &std::path::Path) -> DocumentTree {
    let text = fs::read_to_string(path).expect("read run document");
    DocumentTree::parse(&text, Arc::new(XmlBackend)).expect("parse run document")
}

fn attr(tree: &DocumentTree, path: &str) -> Scalar {
    tree.resolve(path).expect("resolve")[0]
        .value()
        .cloned()
        .expect("attribute value")
}

#[test]
fn population_axis_generates_three_experiments_of_two_runs() {
    common::init_tracing();
    let dir = tempdir().expect("tmp dir");
    let config = common::arena_config(dir.path());
    let batch = generate_batch(&config, &["population_size.Linear30.C3"]).expect("generate");
    let layout = config.layout();

    assert_eq!(batch.runs.len(), 6);
    assert_eq!(batch.manifest.dimensions, vec![3]);
    assert_eq!(batch.manifest.config_hash, batchlab_core::stable_hash_string(&config).expect("hash"));
    assert_eq!(batch.manifest.criteria, vec!["population_size.Linear30.C3".to_string()]);

    for (index, expected) in ["10", "20", "30"].iter().enumerate() {
        let exp_dir = layout.exp_input_dir(index);
        assert!(exp_dir.join("arena_run0.argos").exists());
        assert!(exp_dir.join("arena_run1.argos").exists());
        assert!(!layout.input_root.join(format!("exp{index}.tmp")).exists());

        let manifest = read_experiment_manifest(&layout, index).expect("manifest");
        assert_eq!(manifest.runs.len(), 2);
        let seeds: BTreeSet<u64> = manifest.seeds().into_iter().collect();
        assert_eq!(seeds.len(), 2, "seeds must differ within an experiment");

        for record in &manifest.runs {
            let tree = parse(&exp_dir.join(&record.documents[0]));
            assert_eq!(
                attr(&tree, "./arena/distribute/entity@quantity"),
                Scalar::from(*expected)
            );
            assert_eq!(
                attr(&tree, "./framework/experiment@random_seed"),
                Scalar::from(record.seed.to_string())
            );
            assert_eq!(attr(&tree, "./framework/experiment@length"), Scalar::from("600"));
            assert_eq!(tree.resolve("./controllers/foraging").expect("ctrl").len(), 1);
            assert!(tree.resolve(".//__CONTROLLER__").expect("placeholder").is_empty());
            let robots = tree.resolve("./arena/robot").expect("robots");
            assert_eq!(robots.len(), expected.parse::<usize>().expect("count"));
            assert_eq!(
                attr(&tree, "./arena/robot[0]@id"),
                Scalar::from("fb0")
            );
            let output = attr(&tree, "./loop_functions@output").as_text();
            assert!(output.ends_with(&format!("exp{index}/arena_run{}_output", record.run)));
            assert_eq!(
                record.output_dir,
                format!("exp-outputs/exp{index}/arena_run{}_output", record.run)
            );
        }

        let commands = fs::read_to_string(exp_dir.join("commands.txt")).expect("commands");
        let lines: Vec<&str> = commands.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(&format!("--seed {}", manifest.runs[1].seed)));
        assert!(lines[0].contains("arena_run0.argos"));
    }

    let batch_manifest = read_batch_manifest(&layout).expect("batch manifest");
    assert_eq!(batch_manifest, batch.manifest);
    assert_eq!(batch_manifest.experiments[2].label, "population_size=30");
}

#[test]
fn runs_differ_only_in_seed_and_output_leaf() {
    let dir = tempdir().expect("tmp dir");
    let config = common::arena_config(dir.path());
    generate_batch(&config, &["population_size.Linear3.C3"]).expect("generate");
    let exp_dir = config.layout().exp_input_dir(1);
    let manifest = read_experiment_manifest(&config.layout(), 1).expect("manifest");
    let normalize = |run: usize| {
        fs::read_to_string(exp_dir.join(format!("arena_run{run}.argos")))
            .expect("run doc")
            .replace(&manifest.runs[run].seed.to_string(), "SEED")
            .replace(&format!("arena_run{run}_output"), "LEAF")
    };
    assert_eq!(normalize(0), normalize(1));
    assert_eq!(manifest.params.get("population_size"), Some(&Scalar::Int(2)));
}

#[test]
fn bivariate_batch_is_row_major() {
    let dir = tempdir().expect("tmp dir");
    let config = common::arena_config(dir.path());
    let batch = generate_batch(
        &config,
        &["population_size.Linear30.C3", "speed.Linear1-2.C2"],
    )
    .expect("generate");
    assert_eq!(batch.manifest.dimensions, vec![3, 2]);
    assert_eq!(batch.manifest.experiments.len(), 6);
    let exp3 = &batch.manifest.experiments[3];
    assert_eq!(exp3.params.get("population_size"), Some(&Scalar::Int(20)));
    assert_eq!(exp3.params.get("speed"), Some(&Scalar::Float(2.0)));

    let tree = parse(&config.layout().exp_input_dir(3).join("arena_run0.argos"));
    assert_eq!(attr(&tree, "./controllers/foraging/params@speed"), Scalar::from("2"));
}

#[test]
fn malformed_criteria_writes_nothing() {
    let dir = tempdir().expect("tmp dir");
    let config = common::arena_config(dir.path());
    let err = generate_batch(&config, &["population_size.Linear3.C10"]).expect_err("collision");
    assert!(matches!(err, batchlab_core::BatchError::InvalidCriteriaParams(_)));
    assert!(!config.layout().input_root.exists());

    let err = generate_batch(&config, &["swarm_density.Linear3.C3"]).expect_err("unknown");
    assert!(matches!(err, batchlab_core::BatchError::UnknownCriteria(_)));
    assert!(!config.layout().input_root.exists());
}
