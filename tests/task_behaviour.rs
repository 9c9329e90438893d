//! Behaviour tests for the per-instance backup task.

use camino::Utf8PathBuf;
use rstest::rstest;
use tempfile::TempDir;

use fleetback::test_support::{FakeBackup, FakeProducer, FakeStore, StoreCall, instance, test_config};
use fleetback::{RunContext, RunLog, StoreError, TaskFailure, run_backup_task};

fn context_in(tmp: &TempDir) -> RunContext {
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 temp path");
    let mut config = test_config();
    config.local_staging_dir = root.join("staging");
    config.log_dir = root.join("logs");
    std::fs::create_dir_all(&config.local_staging_dir).expect("staging dir");
    std::fs::create_dir_all(&config.log_dir).expect("log dir");
    RunContext::with_timestamp(config, "2026-08-01-04-30")
}

fn run_log(context: &RunContext) -> RunLog {
    RunLog::new(context.global_log_path())
}

fn copy_calls(store: &FakeStore) -> Vec<(Utf8PathBuf, String)> {
    store
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            StoreCall::Copy { local, remote_dir } => Some((local, remote_dir)),
            _ => None,
        })
        .collect()
}

#[rstest]
#[tokio::test]
async fn successful_producer_yields_mirrored_artifact() {
    let tmp = TempDir::new().expect("temp dir");
    let context = context_in(&tmp);
    let log = run_log(&context);
    let producer = FakeProducer::new();
    producer.script("billing", FakeBackup::success(b"backup-bytes".to_vec()));
    let store = FakeStore::new();
    let target = instance("billing", "db1", 5432, "postgres");

    let outcome = run_backup_task(&target, &context, &producer, &store, &log).await;

    assert!(outcome.is_success(), "outcome: {:?}", outcome.result);
    let artifact = context.artifact_path("billing");
    let bytes = std::fs::read(&artifact).expect("artifact exists");
    assert_eq!(bytes, b"backup-bytes");

    let copies = copy_calls(&store);
    assert_eq!(
        copies,
        vec![
            (artifact, String::from("s3:/pg/backups/billing")),
            (
                context.instance_log_path("billing"),
                String::from("s3:/pg/backups/billing")
            ),
        ]
    );

    let inst_log = std::fs::read_to_string(context.instance_log_path("billing"))
        .expect("instance log exists");
    assert!(inst_log.contains("backup complete"), "log: {inst_log}");
}

#[rstest]
#[tokio::test]
async fn nonzero_exit_leaves_no_artifact_and_no_mirror() {
    let tmp = TempDir::new().expect("temp dir");
    let context = context_in(&tmp);
    let log = run_log(&context);
    let producer = FakeProducer::new();
    producer.script("billing", FakeBackup::failure(1));
    let store = FakeStore::new();
    let target = instance("billing", "db1", 5432, "postgres");

    let outcome = run_backup_task(&target, &context, &producer, &store, &log).await;

    assert!(!outcome.is_success());
    assert!(
        matches!(outcome.result, Err(TaskFailure::NonZeroExit { status: Some(1), .. })),
        "result: {:?}",
        outcome.result
    );
    assert!(!context.artifact_path("billing").exists());
    assert!(copy_calls(&store).is_empty());

    let inst_log = std::fs::read_to_string(context.instance_log_path("billing"))
        .expect("instance log exists");
    assert!(inst_log.contains("backup failed"), "log: {inst_log}");
}

#[rstest]
#[tokio::test]
async fn launch_failure_is_absorbed_into_the_outcome() {
    let tmp = TempDir::new().expect("temp dir");
    let context = context_in(&tmp);
    let log = run_log(&context);
    let producer = FakeProducer::new();
    producer.fail_launch("billing", "no such binary");
    let store = FakeStore::new();
    let target = instance("billing", "db1", 5432, "postgres");

    let outcome = run_backup_task(&target, &context, &producer, &store, &log).await;

    assert!(
        matches!(outcome.result, Err(TaskFailure::Launch(_))),
        "result: {:?}",
        outcome.result
    );
    assert!(!context.artifact_path("billing").exists());
    assert!(copy_calls(&store).is_empty());
}

#[rstest]
#[tokio::test]
async fn mirror_failure_keeps_the_durable_artifact() {
    let tmp = TempDir::new().expect("temp dir");
    let context = context_in(&tmp);
    let log = run_log(&context);
    let producer = FakeProducer::new();
    producer.script("billing", FakeBackup::success(b"payload".to_vec()));
    let store = FakeStore::new();
    store.fail_copy(
        "s3:/pg/backups/billing",
        StoreError::CommandFailure {
            program: String::from("rclone"),
            status: Some(5),
            status_text: String::from("5"),
            stderr: String::from("network unreachable"),
        },
    );
    let target = instance("billing", "db1", 5432, "postgres");

    let outcome = run_backup_task(&target, &context, &producer, &store, &log).await;

    assert!(
        matches!(outcome.result, Err(TaskFailure::Mirror { .. })),
        "result: {:?}",
        outcome.result
    );
    // The producer succeeded, so the local artifact stays durable.
    assert!(context.artifact_path("billing").exists());
    assert_eq!(copy_calls(&store).len(), 1, "second copy is not attempted");
}
