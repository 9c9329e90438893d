//! Bounded-concurrency scheduler and run phases.
//!
//! The orchestrator runs one backup task per instance through a semaphore
//! that admits at most `max_parallel` tasks, joins them all (first barrier),
//! then sweeps remote retention once per instance (second barrier), and
//! finally sweeps the local staging directory once. Task failures never cross
//! task boundaries, and the run reports uniform success once setup has
//! completed; outcomes are aggregated into a [`RunSummary`] for logs and
//! callers.

use std::sync::Arc;
use std::time::SystemTime;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::context::RunContext;
use crate::producer::Producer;
use crate::registry::Instance;
use crate::retention::{SweepStats, sweep_local, sweep_remote};
use crate::runlog::RunLog;
use crate::store::{RemoteStore, StoreError};
use crate::task::{TaskOutcome, run_backup_task};

/// Errors that abort a run before any task has started.
#[derive(Debug, Error)]
pub enum RunError {
    /// Raised when a local working directory cannot be created.
    #[error("failed to create directory {path}: {message}")]
    Setup {
        /// Directory that could not be created.
        path: String,
        /// Underlying I/O error message.
        message: String,
    },
    /// Raised when the remote root cannot be created.
    #[error("failed to prepare remote storage: {0}")]
    RemoteSetup(#[from] StoreError),
}

/// Aggregated counters for one completed run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// Tasks that produced and mirrored an artifact.
    pub succeeded: usize,
    /// Tasks that settled in failure.
    pub failed: usize,
    /// Remote retention counters summed over all instances.
    pub remote_sweep: SweepStats,
    /// Local retention counters.
    pub local_sweep: SweepStats,
}

/// Drives a full backup run: tasks, then remote retention, then local.
#[derive(Debug)]
pub struct Orchestrator<P, S> {
    producer: Arc<P>,
    store: Arc<S>,
    context: Arc<RunContext>,
    log: RunLog,
}

impl<P, S> Orchestrator<P, S>
where
    P: Producer + 'static,
    S: RemoteStore + 'static,
{
    /// Creates an orchestrator over the given capabilities and run context.
    #[must_use]
    pub fn new(producer: Arc<P>, store: Arc<S>, context: Arc<RunContext>) -> Self {
        let log = RunLog::new(context.global_log_path());
        Self {
            producer,
            store,
            context,
            log,
        }
    }

    /// Handle to the run log this orchestrator writes to.
    #[must_use]
    pub const fn log(&self) -> &RunLog {
        &self.log
    }

    /// Executes the whole run and returns the aggregated summary.
    ///
    /// Individual task and sweep failures are absorbed and counted; once
    /// setup has succeeded the run itself always completes.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] only when preparing the local directories or the
    /// remote root fails before any task has started.
    pub async fn execute(&self, instances: Vec<Instance>) -> Result<RunSummary, RunError> {
        self.setup().await?;
        self.log
            .global("starting multi-instance PostgreSQL backup run")
            .await;

        let mut summary = RunSummary::default();
        let names: Vec<String> = instances
            .iter()
            .map(|target| target.name.clone())
            .collect();

        self.run_tasks(instances, &mut summary).await;
        self.sweep_remote_per_instance(&names, &mut summary).await;
        summary.local_sweep = sweep_local(
            &self.context.config.local_staging_dir,
            self.context.config.local_retention_days,
            SystemTime::now(),
            &self.log,
        )
        .await;

        self.log
            .global(&format!(
                "run complete: {} succeeded, {} failed, {} remote and {} local entries swept",
                summary.succeeded,
                summary.failed,
                summary.remote_sweep.deleted,
                summary.local_sweep.deleted
            ))
            .await;
        Ok(summary)
    }

    async fn setup(&self) -> Result<(), RunError> {
        for dir in [
            &self.context.config.log_dir,
            &self.context.config.local_staging_dir,
        ] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|err| RunError::Setup {
                    path: dir.to_string(),
                    message: err.to_string(),
                })?;
        }
        self.store
            .ensure_dir(&self.context.remote_root())
            .await?;
        Ok(())
    }

    /// Task phase: submit every instance through the concurrency gate and
    /// join them all before returning (the hard phase barrier).
    async fn run_tasks(&self, instances: Vec<Instance>, summary: &mut RunSummary) {
        let gate = Arc::new(Semaphore::new(self.context.config.max_parallel));
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();

        for target in instances {
            let task_gate = Arc::clone(&gate);
            let producer = Arc::clone(&self.producer);
            let store = Arc::clone(&self.store);
            let context = Arc::clone(&self.context);
            let log = self.log.clone();
            tasks.spawn(async move {
                // The gate is never closed, so acquisition only fails if the
                // semaphore is dropped; run unguarded in that case.
                let _permit = task_gate.acquire_owned().await.ok();
                run_backup_task(&target, &context, producer.as_ref(), store.as_ref(), &log)
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.is_success() {
                        summary.succeeded += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                Err(err) => {
                    summary.failed += 1;
                    self.log
                        .global(&format!("backup task aborted unexpectedly: {err}"))
                        .await;
                }
            }
        }
    }

    /// Remote retention phase: one sweep per instance, run concurrently;
    /// a failing instance sweep is logged and affects no sibling.
    async fn sweep_remote_per_instance(&self, names: &[String], summary: &mut RunSummary) {
        let now = Utc::now();
        let days = self.context.config.remote_retention_days;
        let mut sweeps: JoinSet<(String, Result<SweepStats, StoreError>)> = JoinSet::new();

        for name in names {
            let store = Arc::clone(&self.store);
            let log = self.log.clone();
            let prefix = self.context.remote_dir(name);
            let instance_name = name.clone();
            sweeps.spawn(async move {
                let result = sweep_remote(store.as_ref(), &prefix, days, now, &log).await;
                (instance_name, result)
            });
        }

        while let Some(joined) = sweeps.join_next().await {
            match joined {
                Ok((_, Ok(stats))) => {
                    summary.remote_sweep = summary.remote_sweep.merged(stats);
                }
                Ok((name, Err(err))) => {
                    self.log
                        .global(&format!("remote retention failed for {name}: {err}"))
                        .await;
                }
                Err(err) => {
                    self.log
                        .global(&format!("remote retention sweep aborted unexpectedly: {err}"))
                        .await;
                }
            }
        }
    }
}
