//! Run-scoped context shared read-only by every task and sweeper.
//!
//! A run is identified by a single timestamp generated once at startup; every
//! artifact, instance log, and the global log embed it, so concurrent tasks
//! never contend for a file name and retention can reason about age purely
//! from modification times.

use camino::Utf8PathBuf;
use chrono::Local;

use crate::config::BackupConfig;

/// File extension for streamed backup artifacts.
pub const ARTIFACT_EXTENSION: &str = "tar.zst";

/// File extension for instance and global logs.
pub const LOG_EXTENSION: &str = "txt";

/// Timestamp format shared by every file name produced during a run.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M";

/// Immutable per-run state: the resolved configuration and the run timestamp.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunContext {
    /// Resolved configuration for this run.
    pub config: BackupConfig,
    /// Timestamp identifying this run, in [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
}

impl RunContext {
    /// Creates a context stamped with the current local time.
    #[must_use]
    pub fn new(config: BackupConfig) -> Self {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self { config, timestamp }
    }

    /// Creates a context with an explicit timestamp, mainly for tests.
    #[must_use]
    pub fn with_timestamp(config: BackupConfig, timestamp: impl Into<String>) -> Self {
        Self {
            config,
            timestamp: timestamp.into(),
        }
    }

    /// File name of the artifact produced for `name` during this run.
    #[must_use]
    pub fn artifact_file_name(&self, name: &str) -> String {
        format!("{name}_{}.{ARTIFACT_EXTENSION}", self.timestamp)
    }

    /// Full staging path of the artifact produced for `name`.
    #[must_use]
    pub fn artifact_path(&self, name: &str) -> Utf8PathBuf {
        self.config
            .local_staging_dir
            .join(self.artifact_file_name(name))
    }

    /// Full path of the per-instance log for `name`.
    #[must_use]
    pub fn instance_log_path(&self, name: &str) -> Utf8PathBuf {
        self.config
            .log_dir
            .join(format!("{name}_log_{}.{LOG_EXTENSION}", self.timestamp))
    }

    /// Full path of the global run log.
    #[must_use]
    pub fn global_log_path(&self) -> Utf8PathBuf {
        self.config
            .log_dir
            .join(format!("backup_log_{}.{LOG_EXTENSION}", self.timestamp))
    }

    /// Remote root shared by all instances: `<bucket>:/<prefix>`.
    #[must_use]
    pub fn remote_root(&self) -> String {
        format!(
            "{}:/{}",
            self.config.remote_bucket, self.config.remote_bucket_prefix
        )
    }

    /// Remote directory owned by `name`: `<bucket>:/<prefix>/<name>`.
    #[must_use]
    pub fn remote_dir(&self, name: &str) -> String {
        format!("{}/{name}", self.remote_root())
    }
}
