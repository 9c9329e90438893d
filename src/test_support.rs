//! Test support utilities shared across unit and integration tests.
//!
//! Fakes here stand in for the producer and the remote store so behaviour
//! tests exercise the scheduler and sweeps with zero real subprocess or
//! network activity.

use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::sleep;

use crate::config::BackupConfig;
use crate::exec::{CommandFuture, CommandOutput, CommandRunner, ExecError};
use crate::producer::{Producer, ProducerError, ProducerHandle};
use crate::registry::Instance;
use crate::store::{RemoteEntry, RemoteStore, StoreError, StoreFuture};

/// Returns a valid configuration suitable for unit tests.
#[must_use]
pub fn test_config() -> BackupConfig {
    BackupConfig {
        remote_bucket: String::from("s3"),
        remote_bucket_prefix: String::from("pg/backups"),
        local_staging_dir: Utf8PathBuf::from("/tmp/fleetback/staging"),
        log_dir: Utf8PathBuf::from("/tmp/fleetback/logs"),
        instance_file: Utf8PathBuf::from("instances.csv"),
        max_parallel: 4,
        local_retention_days: 7,
        remote_retention_days: 30,
        producer_bin: String::from("pg_basebackup"),
        rclone_bin: String::from("rclone"),
        compress: String::from("zstd:5"),
    }
}

/// Builds an [`Instance`] from borrowed parts.
#[must_use]
pub fn instance(name: &str, host: &str, port: u16, user: &str) -> Instance {
    Instance {
        name: name.to_owned(),
        host: host.to_owned(),
        port,
        user: user.to_owned(),
    }
}

/// Returns a UTC timestamp `days` days in the past.
#[must_use]
pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - ChronoDuration::days(days)
}

/// Builds a [`RemoteEntry`] for listing fixtures.
#[must_use]
pub fn remote_entry(name: &str, is_dir: bool, modified: DateTime<Utc>) -> RemoteEntry {
    RemoteEntry {
        name: name.to_owned(),
        is_dir,
        modified,
    }
}

/// Shared, ordered record of notable events emitted by fakes.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one event.
    pub fn push(&self, event: impl Into<String>) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.into());
        }
    }

    /// Returns a snapshot of all events recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Index of the first event equal to `event`, if any.
    #[must_use]
    pub fn position_of(&self, event: &str) -> Option<usize> {
        self.snapshot().iter().position(|entry| entry == event)
    }
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(CommandOutput {
                code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            });
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        Box::pin(async move {
            if let Ok(mut invocations) = self.invocations.lock() {
                invocations.push(CommandInvocation {
                    program: program.to_owned(),
                    args: args.to_vec(),
                });
            }
            self.responses
                .lock()
                .ok()
                .and_then(|mut responses| responses.pop_front())
                .ok_or_else(|| ExecError::Spawn {
                    program: program.to_owned(),
                    message: String::from("no scripted response available"),
                })
        })
    }
}

/// Script for one fake producer run.
#[derive(Clone, Debug)]
pub struct FakeBackup {
    /// Bytes the producer streams before terminating.
    pub bytes: Vec<u8>,
    /// Exit code reported on completion; `None` simulates a killed process.
    pub exit_code: Option<i32>,
    /// How long the producer keeps running after its stream is exhausted.
    pub hold: Duration,
}

impl FakeBackup {
    /// A producer run that streams `bytes` and exits successfully.
    #[must_use]
    pub const fn success(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            exit_code: Some(0),
            hold: Duration::ZERO,
        }
    }

    /// A producer run that streams nothing and exits with `code`.
    #[must_use]
    pub const fn failure(code: i32) -> Self {
        Self {
            bytes: Vec::new(),
            exit_code: Some(code),
            hold: Duration::ZERO,
        }
    }

    /// Keeps the fake process alive for `hold` before settling.
    #[must_use]
    pub const fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }
}

/// Fake producer driven by per-instance scripts.
///
/// Tracks launch/settle ordering and the peak number of concurrently running
/// producers so scheduler tests can assert the parallelism bound.
#[derive(Debug, Default)]
pub struct FakeProducer {
    scripts: Mutex<HashMap<String, FakeBackup>>,
    launch_failures: Mutex<HashMap<String, String>>,
    events: EventLog,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeProducer {
    /// Creates a producer with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a producer that shares `events` with other fakes.
    #[must_use]
    pub fn with_events(events: EventLog) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// Scripts the next run for `name`.
    pub fn script(&self, name: &str, backup: FakeBackup) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(name.to_owned(), backup);
        }
    }

    /// Makes the next launch for `name` fail with the given message.
    pub fn fail_launch(&self, name: &str, message: &str) {
        if let Ok(mut failures) = self.launch_failures.lock() {
            failures.insert(name.to_owned(), message.to_owned());
        }
    }

    /// Returns the ordered launch/settle events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.snapshot()
    }

    /// Highest number of producers that were running at the same time.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Producer for FakeProducer {
    fn launch(&self, target: &Instance) -> Result<ProducerHandle, ProducerError> {
        self.events.push(format!("launch {}", target.name));

        if let Some(message) = self
            .launch_failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.remove(&target.name))
        {
            return Err(ProducerError::Launch {
                program: String::from("fake-producer"),
                message,
            });
        }

        let backup = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.remove(&target.name))
            .unwrap_or_else(|| FakeBackup::success(Vec::new()));

        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let events = self.events.clone();
        let active = Arc::clone(&self.active);
        let name = target.name.clone();
        let exit_code = backup.exit_code;
        let hold = backup.hold;
        let completion = Box::pin(async move {
            if !hold.is_zero() {
                sleep(hold).await;
            }
            events.push(format!("settle {name}"));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(exit_code)
        });

        Ok(ProducerHandle {
            output: Box::new(Cursor::new(backup.bytes)),
            completion,
        })
    }
}

/// One call recorded by [`FakeStore`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreCall {
    /// A directory-creation request.
    EnsureDir(String),
    /// A copy of `local` into `remote_dir`.
    Copy {
        /// Local source path.
        local: Utf8PathBuf,
        /// Remote destination directory.
        remote_dir: String,
    },
    /// A listing of `prefix`.
    List(String),
    /// A deletion of the remote path.
    Delete(String),
}

/// Fake remote store with scripted listings and optional copy failures.
#[derive(Debug, Default)]
pub struct FakeStore {
    calls: Arc<Mutex<Vec<StoreCall>>>,
    listings: Mutex<HashMap<String, VecDeque<Result<Vec<RemoteEntry>, StoreError>>>>,
    copy_failures: Mutex<HashMap<String, StoreError>>,
    delete_failures: Mutex<HashMap<String, StoreError>>,
    events: EventLog,
}

impl FakeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that shares `events` with other fakes.
    #[must_use]
    pub fn with_events(events: EventLog) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// Queues a successful listing for `prefix`.
    pub fn push_listing(&self, prefix: &str, entries: Vec<RemoteEntry>) {
        if let Ok(mut listings) = self.listings.lock() {
            listings
                .entry(prefix.to_owned())
                .or_default()
                .push_back(Ok(entries));
        }
    }

    /// Queues a failing listing for `prefix`.
    pub fn push_listing_error(&self, prefix: &str, error: StoreError) {
        if let Ok(mut listings) = self.listings.lock() {
            listings
                .entry(prefix.to_owned())
                .or_default()
                .push_back(Err(error));
        }
    }

    /// Makes the next copy into `remote_dir` fail with `error`.
    pub fn fail_copy(&self, remote_dir: &str, error: StoreError) {
        if let Ok(mut failures) = self.copy_failures.lock() {
            failures.insert(remote_dir.to_owned(), error);
        }
    }

    /// Makes the next delete of `path` fail with `error`.
    pub fn fail_delete(&self, path: &str, error: StoreError) {
        if let Ok(mut failures) = self.delete_failures.lock() {
            failures.insert(path.to_owned(), error);
        }
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Remote paths deleted so far, in call order.
    #[must_use]
    pub fn deleted_paths(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Delete(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: StoreCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl RemoteStore for FakeStore {
    fn ensure_dir<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.record(StoreCall::EnsureDir(path.to_owned()));
            Ok(())
        })
    }

    fn copy<'a>(&'a self, local: &'a Utf8Path, remote_dir: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.record(StoreCall::Copy {
                local: local.to_path_buf(),
                remote_dir: remote_dir.to_owned(),
            });
            if let Some(error) = self
                .copy_failures
                .lock()
                .ok()
                .and_then(|mut failures| failures.remove(remote_dir))
            {
                return Err(error);
            }
            Ok(())
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<RemoteEntry>> {
        Box::pin(async move {
            self.record(StoreCall::List(prefix.to_owned()));
            self.events.push(format!("list {prefix}"));
            self.listings
                .lock()
                .ok()
                .and_then(|mut listings| listings.get_mut(prefix)?.pop_front())
                .unwrap_or_else(|| Ok(Vec::new()))
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.record(StoreCall::Delete(path.to_owned()));
            if let Some(error) = self
                .delete_failures
                .lock()
                .ok()
                .and_then(|mut failures| failures.remove(path))
            {
                return Err(error);
            }
            Ok(())
        })
    }
}
