//! Backup producer abstraction and the `pg_basebackup` implementation.
//!
//! A producer is launched once per instance and hands back a byte stream plus
//! a completion future. Keeping the two separate lets the task copy the
//! stream to disk in bounded chunks while the process is still running and
//! only then await the exit status that decides whether the artifact is
//! durable.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::process::Command;

use crate::registry::Instance;

/// Errors raised while launching a producer.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProducerError {
    /// Raised when the producer process cannot be started.
    #[error("failed to launch {program}: {message}")]
    Launch {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error message.
        message: String,
    },
    /// Raised when the spawned process exposes no stdout handle.
    #[error("{program} provided no output stream")]
    MissingOutput {
        /// Program that was launched.
        program: String,
    },
}

/// A launched producer: its output stream and pending exit status.
pub struct ProducerHandle {
    /// Streamed backup bytes from the producer's stdout.
    pub output: Box<dyn AsyncRead + Send + Unpin>,
    /// Resolves once the process terminates, yielding its exit code.
    pub completion: Pin<Box<dyn Future<Output = io::Result<Option<i32>>> + Send>>,
}

/// Capability to launch a streaming backup producer for one instance.
pub trait Producer: Send + Sync {
    /// Launches the producer for `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`ProducerError`] when the process cannot be started or
    /// provides no output stream.
    fn launch(&self, instance: &Instance) -> Result<ProducerHandle, ProducerError>;
}

/// Real producer that spawns `pg_basebackup` streaming a tar to stdout.
#[derive(Clone, Debug)]
pub struct PgBaseBackup {
    bin: String,
    compress: String,
}

impl PgBaseBackup {
    /// Creates a producer using the given binary and compression method.
    #[must_use]
    pub const fn new(bin: String, compress: String) -> Self {
        Self { bin, compress }
    }

    fn build_args(&self, instance: &Instance) -> Vec<OsString> {
        vec![
            OsString::from("-h"),
            OsString::from(&instance.host),
            OsString::from("-p"),
            OsString::from(instance.port.to_string()),
            OsString::from("-U"),
            OsString::from(&instance.user),
            OsString::from("-D"),
            OsString::from("-"),
            OsString::from("-F"),
            OsString::from("tar"),
            OsString::from(format!("--compress={}", self.compress)),
            OsString::from("--checkpoint=fast"),
            OsString::from("-R"),
            OsString::from("--wal-method=fetch"),
        ]
    }
}

impl Producer for PgBaseBackup {
    fn launch(&self, instance: &Instance) -> Result<ProducerHandle, ProducerError> {
        let mut child = Command::new(&self.bin)
            .args(self.build_args(instance))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| ProducerError::Launch {
                program: self.bin.clone(),
                message: err.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| ProducerError::MissingOutput {
            program: self.bin.clone(),
        })?;
        let completion = Box::pin(async move { child.wait().await.map(|status| status.code()) });

        Ok(ProducerHandle {
            output: Box::new(stdout),
            completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn build_args_use_instance_connection_parameters() {
        let producer = PgBaseBackup::new(
            String::from("pg_basebackup"),
            String::from("zstd:5"),
        );
        let instance = Instance {
            name: String::from("billing"),
            host: String::from("db1.internal"),
            port: 5433,
            user: String::from("replicator"),
        };

        let args = producer.build_args(&instance);
        let rendered: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert!(rendered.windows(2).any(|w| w == ["-h", "db1.internal"]));
        assert!(rendered.windows(2).any(|w| w == ["-p", "5433"]));
        assert!(rendered.windows(2).any(|w| w == ["-U", "replicator"]));
        assert!(rendered.windows(2).any(|w| w == ["-D", "-"]));
        assert!(rendered.contains(&String::from("--compress=zstd:5")));
    }
}
