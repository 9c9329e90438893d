//! Append-only run logs shared by tasks and sweepers.
//!
//! One global log receives run-level entries from every concurrently running
//! task, so appends are serialised by an async mutex; each instance log has a
//! single writer and needs no lock. Entries are also mirrored as `tracing`
//! events so operators watching the console see the same stream. A failed
//! append must never fail the backup that reported it, so append errors are
//! downgraded to warnings.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Cloneable handle to the global run log.
#[derive(Clone, Debug)]
pub struct RunLog {
    global_path: Utf8PathBuf,
    lock: Arc<Mutex<()>>,
}

impl RunLog {
    /// Creates a handle writing global entries to `global_path`.
    #[must_use]
    pub fn new(global_path: Utf8PathBuf) -> Self {
        Self {
            global_path,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the global run log.
    #[must_use]
    pub fn global_path(&self) -> &Utf8Path {
        &self.global_path
    }

    /// Appends a timestamped entry to the global run log.
    pub async fn global(&self, message: &str) {
        tracing::info!("{message}");
        let _guard = self.lock.lock().await;
        if let Err(err) = append_entry(&self.global_path, message).await {
            tracing::warn!("failed to append to {}: {err}", self.global_path);
        }
    }

    /// Appends a timestamped entry to the instance log at `path`.
    pub async fn instance(&self, path: &Utf8Path, message: &str) {
        tracing::info!("{message}");
        if let Err(err) = append_entry(path, message).await {
            tracing::warn!("failed to append to {path}: {err}");
        }
    }
}

async fn append_entry(path: &Utf8Path, message: &str) -> std::io::Result<()> {
    let entry = format!("{} - {message}\n", Local::now().to_rfc3339());
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(entry.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    fn log_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("utf8 temp path")
    }

    #[rstest]
    #[tokio::test]
    async fn global_entries_are_timestamped_lines() {
        let dir = TempDir::new().expect("temp dir");
        let log = RunLog::new(log_path(&dir, "backup_log.txt"));

        log.global("run started").await;
        log.global("run finished").await;

        let contents = tokio::fs::read_to_string(log.global_path())
            .await
            .expect("log readable");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.contains(" - ")));
        assert!(contents.contains("run started"));
        assert!(contents.contains("run finished"));
    }

    #[rstest]
    #[tokio::test]
    async fn instance_entries_go_to_their_own_file() {
        let dir = TempDir::new().expect("temp dir");
        let log = RunLog::new(log_path(&dir, "backup_log.txt"));
        let inst = log_path(&dir, "billing_log.txt");

        log.instance(&inst, "starting backup").await;

        let contents = tokio::fs::read_to_string(&inst).await.expect("readable");
        assert!(contents.contains("starting backup"));
        assert!(!log.global_path().exists());
    }
}
