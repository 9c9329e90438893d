//! Command-line interface definitions for the `fleetback` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use camino::Utf8PathBuf;
use clap::Parser;

/// Top-level CLI for the `fleetback` binary.
#[derive(Debug, Parser)]
#[command(
    name = "fleetback",
    about = "Back up a fleet of PostgreSQL instances and apply retention",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Run one full backup and retention pass over the configured fleet.
    #[command(
        name = "run",
        about = "Back up every configured instance, mirror artifacts, sweep retention"
    )]
    Run(RunCommand),
}

/// Arguments for the `fleetback run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Override the instance CSV file for this run.
    ///
    /// Defaults to the `instance_file` value resolved from configuration.
    #[arg(long, value_name = "PATH")]
    pub(crate) instances: Option<Utf8PathBuf>,
}
