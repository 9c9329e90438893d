//! Per-instance backup task: launch, stream, classify, mirror.
//!
//! The task is the failure-isolation boundary of the whole system. Every
//! error it can encounter — launch failure, stream I/O failure, a non-zero
//! producer exit, a mirror failure — is absorbed into the returned
//! [`TaskOutcome`]; nothing propagates to the scheduler. A failed run leaves
//! no partial artifact behind, and an artifact is mirrored if and only if the
//! producer exited with status zero.

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::context::RunContext;
use crate::producer::{Producer, ProducerError};
use crate::registry::Instance;
use crate::runlog::RunLog;
use crate::store::{RemoteStore, StoreError};

/// Size of the buffer used when copying producer output to disk.
const STREAM_CHUNK_BYTES: usize = 8192;

/// Paths of a durable artifact and its instance log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArtifactPaths {
    /// Local artifact path.
    pub artifact: Utf8PathBuf,
    /// Local instance log path.
    pub log: Utf8PathBuf,
}

/// Why a backup task failed.
#[derive(Debug, Error)]
pub enum TaskFailure {
    /// The producer process could not be started.
    #[error(transparent)]
    Launch(#[from] ProducerError),
    /// Streaming producer output to the artifact file failed.
    #[error("failed to stream backup to {path}: {message}")]
    Stream {
        /// Artifact path that was being written.
        path: Utf8PathBuf,
        /// Underlying I/O error message.
        message: String,
    },
    /// Waiting for the producer to terminate failed.
    #[error("failed to await producer termination: {message}")]
    Wait {
        /// Underlying I/O error message.
        message: String,
    },
    /// The producer terminated with a non-success status.
    #[error("producer exited with status {status_text}")]
    NonZeroExit {
        /// Exit status reported by the OS, if any.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
    },
    /// Mirroring the durable artifact or its log failed.
    #[error("failed to mirror {path}: {source}")]
    Mirror {
        /// Local path whose upload failed.
        path: Utf8PathBuf,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}

/// Terminal state of one backup task.
#[derive(Debug)]
pub struct TaskOutcome {
    /// Name of the instance the task backed up.
    pub instance: String,
    /// Success with the durable paths, or the absorbed failure.
    pub result: Result<ArtifactPaths, TaskFailure>,
}

impl TaskOutcome {
    /// Returns `true` when the task produced and mirrored an artifact.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs the backup protocol for one instance and absorbs every failure.
///
/// Streams producer output to the staging artifact in bounded chunks, awaits
/// the exit status, and on success mirrors the artifact and the instance log
/// to the instance's remote directory. On any failure before the producer has
/// succeeded, the local artifact is deleted. A mirror failure keeps the
/// durable artifact but reports the task as failed.
pub async fn run_backup_task<P, S>(
    target: &Instance,
    context: &RunContext,
    producer: &P,
    store: &S,
    log: &RunLog,
) -> TaskOutcome
where
    P: Producer + ?Sized,
    S: RemoteStore + ?Sized,
{
    let artifact = context.artifact_path(&target.name);
    let instance_log = context.instance_log_path(&target.name);
    log.instance(
        &instance_log,
        &format!(
            "[{}] starting backup of {}:{}",
            target.name, target.host, target.port
        ),
    )
    .await;

    let produced = produce_artifact(target, producer, &artifact).await;
    let result = match produced {
        Ok(()) => {
            log.instance(
                &instance_log,
                &format!(
                    "[{}] backup complete: {}",
                    target.name,
                    context.artifact_file_name(&target.name)
                ),
            )
            .await;
            mirror(target, context, store, &artifact, &instance_log, log).await
        }
        Err(failure) => {
            discard_artifact(&artifact, log).await;
            log.instance(
                &instance_log,
                &format!("[{}] backup failed: {failure}", target.name),
            )
            .await;
            log.global(&format!("[{}] backup failed: {failure}", target.name))
                .await;
            Err(failure)
        }
    };

    TaskOutcome {
        instance: target.name.clone(),
        result,
    }
}

/// Launches the producer and streams its output to `artifact`.
async fn produce_artifact<P>(
    target: &Instance,
    producer: &P,
    artifact: &Utf8PathBuf,
) -> Result<(), TaskFailure>
where
    P: Producer + ?Sized,
{
    let handle = producer.launch(target)?;
    let mut output = handle.output;

    let stream_err = |err: std::io::Error| TaskFailure::Stream {
        path: artifact.clone(),
        message: err.to_string(),
    };

    let mut file = File::create(artifact).await.map_err(stream_err)?;
    let mut buffer = vec![0u8; STREAM_CHUNK_BYTES];
    loop {
        let read = output.read(&mut buffer).await.map_err(stream_err)?;
        if read == 0 {
            break;
        }
        let chunk = buffer.get(..read).unwrap_or(&[]);
        file.write_all(chunk).await.map_err(stream_err)?;
    }
    file.flush().await.map_err(stream_err)?;
    drop(file);

    let status = handle
        .completion
        .await
        .map_err(|err| TaskFailure::Wait {
            message: err.to_string(),
        })?;
    match status {
        Some(0) => Ok(()),
        other => Err(TaskFailure::NonZeroExit {
            status: other,
            status_text: other.map_or_else(|| String::from("unknown"), |code| code.to_string()),
        }),
    }
}

/// Copies the durable artifact and its instance log to remote storage.
async fn mirror<S>(
    target: &Instance,
    context: &RunContext,
    store: &S,
    artifact: &Utf8PathBuf,
    instance_log: &Utf8PathBuf,
    log: &RunLog,
) -> Result<ArtifactPaths, TaskFailure>
where
    S: RemoteStore + ?Sized,
{
    let remote_dir = context.remote_dir(&target.name);
    for local in [artifact, instance_log] {
        if let Err(source) = store.copy(local, &remote_dir).await {
            let failure = TaskFailure::Mirror {
                path: local.clone(),
                source,
            };
            log.instance(instance_log, &format!("[{}] {failure}", target.name))
                .await;
            log.global(&format!("[{}] {failure}", target.name)).await;
            return Err(failure);
        }
    }

    log.global(&format!(
        "[{}] backup mirrored to {remote_dir}",
        target.name
    ))
    .await;
    Ok(ArtifactPaths {
        artifact: artifact.clone(),
        log: instance_log.clone(),
    })
}

/// Best-effort removal of a partial artifact after a failure.
async fn discard_artifact(artifact: &Utf8PathBuf, log: &RunLog) {
    match tokio::fs::remove_file(artifact).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            log.global(&format!("failed to remove partial artifact {artifact}: {err}"))
                .await;
        }
    }
}
