//! CLI for the mirror job orchestrator.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mirror_core::config;

use commands::{run_cancel, run_job, run_serve, run_staging, run_start, run_status};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "mirror")]
#[command(about = "Fetch a magnet link or URL and re-host it, one job at a time", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run one job in this process and print its links. Ctrl-C cancels.
    Run {
        /// Magnet link or http(s) URL.
        locator: String,
    },

    /// Keep a job manager running behind the control socket.
    Serve,

    /// Start a job on the running `mirror serve`.
    Start {
        /// Magnet link or http(s) URL.
        locator: String,
    },

    /// Cancel a job on the running `mirror serve`.
    Cancel {
        /// Job identifier.
        id: u64,
    },

    /// Show a job (or the current one) from the running `mirror serve`.
    Status {
        /// Job identifier; the current job when omitted.
        id: Option<u64>,
    },

    /// Administer the remote staging service.
    Staging {
        #[command(subcommand)]
        action: StagingAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum StagingAction {
    /// List every container with its files.
    List,
    /// Delete one staged file.
    DeleteFile { id: String },
    /// Delete a container (folder) and everything in it.
    DeleteFolder { id: String },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run { locator } => run_job(&cfg, &locator).await?,
            CliCommand::Serve => run_serve(&cfg).await?,
            CliCommand::Start { locator } => run_start(&locator).await?,
            CliCommand::Cancel { id } => run_cancel(id).await?,
            CliCommand::Status { id } => run_status(id).await?,
            CliCommand::Staging { action } => run_staging(&cfg, action).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
