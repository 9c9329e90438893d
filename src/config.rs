//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, the `fleetback.toml` discovery chain, environment
//! variables, and CLI flags. The resolved [`BackupConfig`] is validated once
//! at startup and then shared read-only through the [`crate::RunContext`];
//! no component reads process-wide state directly.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default backup producer binary.
pub const DEFAULT_PRODUCER_BIN: &str = "pg_basebackup";

/// Default remote storage client binary.
pub const DEFAULT_RCLONE_BIN: &str = "rclone";

/// Default compression argument passed to the producer.
pub const DEFAULT_COMPRESS: &str = "zstd:5";

/// Backup orchestration settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "FLEETBACK",
    discovery(
        app_name = "fleetback",
        env_var = "FLEETBACK_CONFIG_PATH",
        config_file_name = "fleetback.toml",
        dotfile_name = ".fleetback.toml",
        project_file_name = "fleetback.toml"
    )
)]
pub struct BackupConfig {
    /// Remote target in rclone notation, typically `<remote>:<bucket>`.
    pub remote_bucket: String,
    /// Key prefix under the bucket that holds one directory per instance.
    pub remote_bucket_prefix: String,
    /// Local staging directory receiving streamed artifacts.
    #[ortho_config(default = Utf8PathBuf::from("/var/backups/postgres"))]
    pub local_staging_dir: Utf8PathBuf,
    /// Directory receiving the global run log and per-instance logs.
    #[ortho_config(default = Utf8PathBuf::from("/var/log/fleetback"))]
    pub log_dir: Utf8PathBuf,
    /// CSV file listing the backup targets (`name,host,port,user`).
    #[ortho_config(default = Utf8PathBuf::from("instances.csv"))]
    pub instance_file: Utf8PathBuf,
    /// Maximum number of concurrently running backup tasks.
    #[ortho_config(default = 4)]
    pub max_parallel: usize,
    /// Age in days beyond which local artifacts are deleted.
    #[ortho_config(default = 7)]
    pub local_retention_days: u32,
    /// Age in days beyond which remote artifacts and logs are deleted.
    #[ortho_config(default = 30)]
    pub remote_retention_days: u32,
    /// Path to the backup producer executable.
    #[ortho_config(default = DEFAULT_PRODUCER_BIN.to_owned())]
    pub producer_bin: String,
    /// Path to the rclone executable.
    #[ortho_config(default = DEFAULT_RCLONE_BIN.to_owned())]
    pub rclone_bin: String,
    /// Compression method requested from the producer.
    #[ortho_config(default = DEFAULT_COMPRESS.to_owned())]
    pub compress: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl BackupConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to fleetback.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("fleetback")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on the resolved configuration. Error
    /// messages include guidance on how to provide missing values via
    /// environment variables or the configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidValue`] when a numeric bound is violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.remote_bucket,
            &FieldMetadata::new(
                "remote bucket",
                "FLEETBACK_REMOTE_BUCKET",
                "remote_bucket",
            ),
        )?;
        Self::require_field(
            &self.remote_bucket_prefix,
            &FieldMetadata::new(
                "remote bucket prefix",
                "FLEETBACK_REMOTE_BUCKET_PREFIX",
                "remote_bucket_prefix",
            ),
        )?;
        Self::require_field(
            self.local_staging_dir.as_str(),
            &FieldMetadata::new(
                "local staging directory",
                "FLEETBACK_LOCAL_STAGING_DIR",
                "local_staging_dir",
            ),
        )?;
        Self::require_field(
            self.log_dir.as_str(),
            &FieldMetadata::new("log directory", "FLEETBACK_LOG_DIR", "log_dir"),
        )?;
        Self::require_field(
            self.instance_file.as_str(),
            &FieldMetadata::new(
                "instance file",
                "FLEETBACK_INSTANCE_FILE",
                "instance_file",
            ),
        )?;
        Self::require_field(
            &self.producer_bin,
            &FieldMetadata::new(
                "producer binary",
                "FLEETBACK_PRODUCER_BIN",
                "producer_bin",
            ),
        )?;
        Self::require_field(
            &self.rclone_bin,
            &FieldMetadata::new("rclone binary", "FLEETBACK_RCLONE_BIN", "rclone_bin"),
        )?;
        if self.max_parallel == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "max_parallel must be at least 1",
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field is present but outside its accepted range.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
