//! Remote storage capability and its rclone-backed implementation.
//!
//! The trait is deliberately narrow — create a directory, copy a file, list a
//! prefix, delete a path — so the orchestrator and sweepers never learn which
//! client sits behind it and tests can substitute a scripted store. The real
//! implementation shells out to `rclone` and parses `lsjson` listings.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::exec::{CommandOutput, CommandRunner, ExecError};

/// One entry reported by a remote listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteEntry {
    /// File or directory name relative to the listed prefix.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Modification time reported by the remote.
    pub modified: DateTime<Utc>,
}

/// Errors raised by remote storage operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StoreError {
    /// Raised when the client binary exits with a non-zero status.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when a listing cannot be parsed.
    #[error("failed to parse listing of {prefix}: {message}")]
    Parse {
        /// Prefix whose listing failed to parse.
        prefix: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when command execution fails outright.
    #[error(transparent)]
    Runner(#[from] ExecError),
}

/// Boxed future returned by [`RemoteStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Capability to mirror files to remote storage and sweep old entries.
pub trait RemoteStore: Send + Sync {
    /// Ensures the remote directory `path` exists.
    fn ensure_dir<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ()>;

    /// Copies the local file at `local` into the remote directory `remote_dir`.
    fn copy<'a>(&'a self, local: &'a Utf8Path, remote_dir: &'a str) -> StoreFuture<'a, ()>;

    /// Lists all entries directly under `prefix`.
    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<RemoteEntry>>;

    /// Deletes the remote file at `path`.
    fn delete<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ()>;
}

/// Remote store that shells out to `rclone`.
#[derive(Clone, Debug)]
pub struct RcloneStore<R: CommandRunner> {
    bin: String,
    runner: R,
}

impl<R: CommandRunner> RcloneStore<R> {
    /// Creates a store using the given rclone binary and runner.
    #[must_use]
    pub const fn new(bin: String, runner: R) -> Self {
        Self { bin, runner }
    }

    async fn run_checked(&self, args: Vec<OsString>) -> Result<CommandOutput, StoreError> {
        let output = self.runner.run(&self.bin, &args).await?;
        if output.is_success() {
            return Ok(output);
        }

        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(StoreError::CommandFailure {
            program: self.bin.clone(),
            status: output.code,
            status_text,
            stderr: output.stderr,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
struct RcloneEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "IsDir", default)]
    is_dir: bool,
    #[serde(rename = "ModTime")]
    mod_time: DateTime<Utc>,
}

impl From<RcloneEntry> for RemoteEntry {
    fn from(entry: RcloneEntry) -> Self {
        Self {
            name: entry.name,
            is_dir: entry.is_dir,
            modified: entry.mod_time,
        }
    }
}

impl<R: CommandRunner> RemoteStore for RcloneStore<R> {
    fn ensure_dir<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let args = vec![OsString::from("mkdir"), OsString::from(path)];
            self.run_checked(args).await.map(|_| ())
        })
    }

    fn copy<'a>(&'a self, local: &'a Utf8Path, remote_dir: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let args = vec![
                OsString::from("copy"),
                OsString::from(local.as_str()),
                OsString::from(remote_dir),
            ];
            self.run_checked(args).await.map(|_| ())
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<RemoteEntry>> {
        Box::pin(async move {
            let args = vec![OsString::from("lsjson"), OsString::from(prefix)];
            let output = self.run_checked(args).await?;
            let entries: Vec<RcloneEntry> =
                serde_json::from_str(&output.stdout).map_err(|err| StoreError::Parse {
                    prefix: prefix.to_owned(),
                    message: err.to_string(),
                })?;
            Ok(entries.into_iter().map(RemoteEntry::from).collect())
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let args = vec![OsString::from("delete"), OsString::from(path)];
            self.run_checked(args).await.map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests;
