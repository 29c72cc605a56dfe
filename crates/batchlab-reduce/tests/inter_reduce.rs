mod common;

use batchlab_core::BatchError;
use batchlab_reduce::{reduce_inter, reduce_intra, ReductionGroup, Scope};
use tempfile::tempdir;

#[test]
fn experiments_are_reduced_from_their_means() {
    common::init_tracing();
    let dir = tempdir().expect("tmp dir");
    let config = common::generated(dir.path(), "");
    let layout = config.layout();
    common::write_standard_outputs(&layout);
    reduce_intra(&config).expect("intra");

    let report = reduce_inter(&config).expect("inter");
    assert_eq!(report.group, "inter");
    let inter = layout.inter_stat_dir();
    assert_eq!(common::read(&inter.join("F.mean.csv")), "X;Y\n14;1\n1;1\n");
    assert_eq!(common::read(&inter.join("F.stddev.csv")), "X;Y\n10;1\n0;0\n");

    assert_eq!(
        common::read(&inter.join("collated/F-X.mean.csv")),
        "exp0;exp1;exp2\n4;14;24\n1;1;1\n"
    );
    assert_eq!(
        common::read(&inter.join("collated/F-X.stddev.csv")),
        "exp0;exp1;exp2\n2;2;2\n0;0;0\n"
    );
    assert_eq!(report.collated.len(), 8, "two columns times four statistics");
}

#[test]
fn identity_table_lists_criteria_values() {
    let dir = tempdir().expect("tmp dir");
    let config = common::generated(dir.path(), "");
    let layout = config.layout();
    common::write_standard_outputs(&layout);
    reduce_intra(&config).expect("intra");

    let report = reduce_inter(&config).expect("inter");
    let index = report.experiments.expect("identity table");
    assert_eq!(index, layout.inter_stat_dir().join("experiments.csv"));
    assert_eq!(
        common::read(&index),
        "experiment;label;population_size\n\
         exp0;population_size=10;10\n\
         exp1;population_size=20;20\n\
         exp2;population_size=30;30\n"
    );
}

#[test]
fn inter_group_ignores_its_own_outputs_on_rerun() {
    let dir = tempdir().expect("tmp dir");
    let config = common::generated(dir.path(), "");
    let layout = config.layout();
    common::write_standard_outputs(&layout);
    reduce_intra(&config).expect("intra");

    reduce_inter(&config).expect("first");
    let first = common::snapshot(&layout.stat_root);
    let group = ReductionGroup::inter(&layout).expect("group");
    assert_eq!(group.scope, Scope::Experiment);
    assert_eq!(group.len(), 3);
    reduce_inter(&config).expect("second");
    assert_eq!(first, common::snapshot(&layout.stat_root));
}

#[test]
fn missing_batch_manifest_is_reported() {
    let dir = tempdir().expect("tmp dir");
    let config = common::config(dir.path(), "");
    let layout = config.layout();
    common::write_standard_outputs(&layout);
    reduce_intra(&config).expect("intra");

    let err = reduce_inter(&config).expect_err("no batch manifest");
    assert!(matches!(err, BatchError::Io(_)), "{err}");
    assert!(err.info().context["path"].ends_with("batch.json"));
}
