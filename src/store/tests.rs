//! Unit tests for the rclone-backed remote store.

use super::*;
use crate::test_support::{CommandInvocation, ScriptedRunner};
use camino::Utf8PathBuf;
use rstest::rstest;

fn store(runner: ScriptedRunner) -> RcloneStore<ScriptedRunner> {
    RcloneStore::new(String::from("rclone"), runner)
}

#[rstest]
#[tokio::test]
async fn copy_builds_expected_arguments() {
    let runner = ScriptedRunner::new();
    runner.push_success();
    let local = Utf8PathBuf::from("/staging/billing_2026-08-01-04-30.tar.zst");

    store(runner.clone())
        .copy(&local, "s3:/pg/backups/billing")
        .await
        .expect("copy should succeed");

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(
        invocations.first().map(CommandInvocation::command_string),
        Some(String::from(
            "rclone copy /staging/billing_2026-08-01-04-30.tar.zst s3:/pg/backups/billing"
        ))
    );
}

#[rstest]
#[tokio::test]
async fn ensure_dir_and_delete_use_single_path_argument() {
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_success();
    let subject = store(runner.clone());

    subject
        .ensure_dir("s3:/pg/backups")
        .await
        .expect("mkdir should succeed");
    subject
        .delete("s3:/pg/backups/billing/old.tar.zst")
        .await
        .expect("delete should succeed");

    let rendered: Vec<String> = runner
        .invocations()
        .iter()
        .map(CommandInvocation::command_string)
        .collect();
    assert_eq!(
        rendered,
        vec![
            String::from("rclone mkdir s3:/pg/backups"),
            String::from("rclone delete s3:/pg/backups/billing/old.tar.zst"),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn list_parses_lsjson_entries() {
    let runner = ScriptedRunner::new();
    runner.push_output(
        Some(0),
        concat!(
            "[",
            r#"{"Path":"billing_2026-07-01-04-30.tar.zst","Name":"billing_2026-07-01-04-30.tar.zst","Size":123,"ModTime":"2026-07-01T04:30:00Z","IsDir":false},"#,
            r#"{"Path":"wal","Name":"wal","Size":-1,"ModTime":"2026-07-01T04:30:00Z","IsDir":true}"#,
            "]"
        ),
        "",
    );

    let entries = store(runner)
        .list("s3:/pg/backups/billing")
        .await
        .expect("listing should parse");

    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries.first().map(|entry| entry.name.clone()),
        Some(String::from("billing_2026-07-01-04-30.tar.zst"))
    );
    assert_eq!(entries.first().map(|entry| entry.is_dir), Some(false));
    assert_eq!(entries.last().map(|entry| entry.is_dir), Some(true));
}

#[rstest]
#[tokio::test]
async fn list_reports_parse_errors_with_prefix() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "not json", "");

    let err = store(runner)
        .list("s3:/pg/backups/billing")
        .await
        .expect_err("bad JSON should fail");

    assert!(
        matches!(err, StoreError::Parse { ref prefix, .. } if prefix == "s3:/pg/backups/billing"),
        "unexpected error: {err}"
    );
}

#[rstest]
#[tokio::test]
async fn non_zero_exit_becomes_command_failure() {
    let runner = ScriptedRunner::new();
    runner.push_failure(3);

    let err = store(runner)
        .delete("s3:/pg/backups/billing/old.tar.zst")
        .await
        .expect_err("non-zero exit should fail");

    assert!(
        matches!(
            err,
            StoreError::CommandFailure {
                status: Some(3),
                ..
            }
        ),
        "unexpected error: {err}"
    );
}

#[rstest]
#[tokio::test]
async fn missing_script_surfaces_runner_error() {
    let runner = ScriptedRunner::new();

    let err = store(runner)
        .ensure_dir("s3:/pg/backups")
        .await
        .expect_err("empty script should fail");

    assert!(matches!(err, StoreError::Runner(_)), "unexpected error: {err}");
}
