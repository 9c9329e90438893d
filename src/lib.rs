//! Core library for the fleetback PostgreSQL backup orchestrator.
//!
//! The crate wires a bounded-concurrency scheduler around two narrow
//! capability seams: a [`producer::Producer`] that streams a base backup out
//! of one instance, and a [`store::RemoteStore`] that mirrors artifacts to an
//! object store and serves the remote retention sweep. Everything else is
//! glue: registry loading, run-scoped path derivation, append-only run logs,
//! and the two-phase retention sweep that runs after every task settles.

pub mod config;
pub mod context;
pub mod exec;
pub mod orchestrator;
pub mod producer;
pub mod registry;
pub mod retention;
pub mod runlog;
pub mod store;
pub mod task;
pub mod test_support;

pub use config::{BackupConfig, ConfigError};
pub use context::{ARTIFACT_EXTENSION, LOG_EXTENSION, RunContext};
pub use exec::{CommandFuture, CommandOutput, CommandRunner, ExecError, ProcessCommandRunner};
pub use orchestrator::{Orchestrator, RunError, RunSummary};
pub use producer::{PgBaseBackup, Producer, ProducerError, ProducerHandle};
pub use registry::{Instance, RegistryError, load_instances};
pub use retention::SweepStats;
pub use runlog::RunLog;
pub use store::{RcloneStore, RemoteEntry, RemoteStore, StoreError, StoreFuture};
pub use task::{ArtifactPaths, TaskFailure, TaskOutcome, run_backup_task};
