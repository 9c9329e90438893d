//! Age-based retention sweeps for local staging and remote storage.
//!
//! Both sweeps run strictly after every backup task has settled. They are
//! idempotent: a second sweep over an unchanged tree deletes nothing. Failure
//! to delete one entry is logged and never aborts the rest of the sweep.

use std::time::{Duration, SystemTime};

use camino::Utf8Path;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::context::{ARTIFACT_EXTENSION, LOG_EXTENSION};
use crate::runlog::RunLog;
use crate::store::{RemoteStore, StoreError};

const SECONDS_PER_DAY: u64 = 86_400;

/// Counters reported by one sweep.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SweepStats {
    /// Entries deleted by the sweep.
    pub deleted: usize,
    /// Entries whose deletion failed.
    pub failed: usize,
}

impl SweepStats {
    /// Combines two sweeps' counters.
    #[must_use]
    pub const fn merged(self, other: Self) -> Self {
        Self {
            deleted: self.deleted + other.deleted,
            failed: self.failed + other.failed,
        }
    }
}

/// Deletes artifact files in `dir` older than `retention_days`.
///
/// The sweep is global across all instances sharing the staging directory and
/// matches only the artifact extension; instance names and the run timestamp
/// embedded in every file name make cross-instance collisions impossible by
/// construction. Entries that cannot be inspected or deleted are logged and
/// skipped.
pub async fn sweep_local(
    dir: &Utf8Path,
    retention_days: u32,
    now: SystemTime,
    log: &RunLog,
) -> SweepStats {
    log.global(&format!(
        "sweeping local artifacts older than {retention_days} days in {dir}"
    ))
    .await;

    let threshold = now.checked_sub(Duration::from_secs(
        u64::from(retention_days) * SECONDS_PER_DAY,
    ));
    let Some(threshold) = threshold else {
        return SweepStats::default();
    };

    let mut stats = SweepStats::default();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            log.global(&format!("failed to list {dir}: {err}")).await;
            return stats;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                log.global(&format!("failed to read entry in {dir}: {err}")).await;
                break;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(&format!(".{ARTIFACT_EXTENSION}")) {
            continue;
        }
        let modified = match entry.metadata().await.and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                log.global(&format!("failed to inspect {name}: {err}")).await;
                stats.failed += 1;
                continue;
            }
        };
        if modified >= threshold {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                stats.deleted += 1;
                log.global(&format!("local artifact removed: {name}")).await;
            }
            Err(err) => {
                stats.failed += 1;
                log.global(&format!("failed to remove {name}: {err}")).await;
            }
        }
    }

    stats
}

/// Deletes aged entries under one instance's remote `prefix`.
///
/// Directory entries are ignored; only artifact and log extensions are
/// considered. A listing failure aborts this instance's sweep only; a delete
/// failure is logged and the remaining entries are still evaluated.
///
/// # Errors
///
/// Returns [`StoreError`] when the listing itself fails.
pub async fn sweep_remote<S>(
    store: &S,
    prefix: &str,
    retention_days: u32,
    now: DateTime<Utc>,
    log: &RunLog,
) -> Result<SweepStats, StoreError>
where
    S: RemoteStore + ?Sized,
{
    let threshold = now - ChronoDuration::days(i64::from(retention_days));
    let entries = store.list(prefix).await?;

    let mut stats = SweepStats::default();
    for entry in entries {
        if entry.is_dir || !has_sweepable_extension(&entry.name) {
            continue;
        }
        if entry.modified >= threshold {
            continue;
        }
        let path = format!("{prefix}/{}", entry.name);
        match store.delete(&path).await {
            Ok(()) => {
                stats.deleted += 1;
                log.global(&format!("remote entry removed: {path}")).await;
            }
            Err(err) => {
                stats.failed += 1;
                log.global(&format!("failed to remove remote entry {path}: {err}"))
                    .await;
            }
        }
    }

    Ok(stats)
}

fn has_sweepable_extension(name: &str) -> bool {
    name.ends_with(&format!(".{ARTIFACT_EXTENSION}")) || name.ends_with(&format!(".{LOG_EXTENSION}"))
}
