//! Unit tests for configuration validation.

use fleetback::test_support::test_config;
use fleetback::{BackupConfig, ConfigError};
use rstest::rstest;

#[rstest]
fn valid_configuration_passes_validation() {
    test_config().validate().expect("test config should be valid");
}

#[rstest]
fn missing_bucket_produces_actionable_error() {
    let config = BackupConfig {
        remote_bucket: String::from("  "),
        ..test_config()
    };

    let error = config.validate().expect_err("bucket is required");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error}");
    };
    assert!(
        message.contains("FLEETBACK_REMOTE_BUCKET"),
        "error should mention env var: {message}"
    );
    assert!(
        message.contains("fleetback.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains("remote_bucket"),
        "error should mention TOML key: {message}"
    );
}

#[rstest]
#[case("remote_bucket_prefix", |cfg: &mut BackupConfig| cfg.remote_bucket_prefix = String::new())]
#[case("producer_bin", |cfg: &mut BackupConfig| cfg.producer_bin = String::new())]
#[case("rclone_bin", |cfg: &mut BackupConfig| cfg.rclone_bin = String::new())]
#[case("instance_file", |cfg: &mut BackupConfig| cfg.instance_file = camino::Utf8PathBuf::new())]
fn blank_required_fields_are_rejected(
    #[case] toml_key: &str,
    #[case] mutate: fn(&mut BackupConfig),
) {
    let mut config = test_config();
    mutate(&mut config);

    let error = config.validate().expect_err("validation should fail");
    let message = error.to_string();
    assert!(
        message.contains(toml_key),
        "error should mention {toml_key}: {message}"
    );
    assert!(
        message.contains("fleetback.toml"),
        "error should mention config file: {message}"
    );
}

#[rstest]
fn zero_parallelism_is_rejected() {
    let config = BackupConfig {
        max_parallel: 0,
        ..test_config()
    };

    let error = config.validate().expect_err("zero parallelism is invalid");
    assert!(
        matches!(error, ConfigError::InvalidValue(ref message) if message.contains("max_parallel")),
        "unexpected error: {error}"
    );
}
