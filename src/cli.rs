//! CLI definitions for tickwork.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tickwork CLI.
#[derive(Parser)]
#[command(name = "tickwork")]
#[command(about = "Recurring job scheduler with durable leases")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true, env = "TICKWORK_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler and HTTP API in foreground (default)
    Run {
        /// Server host, overrides `server.host`
        #[arg(long)]
        host: Option<String>,

        /// Server port, overrides `server.port`
        #[arg(long)]
        port: Option<u16>,
    },

    /// Inspect and manage stored jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum JobsAction {
    /// List all jobs
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show a job with its lease, upcoming due times and recent runs
    Show {
        /// Job name
        name: String,
    },

    /// Delete a job and its run history
    Remove {
        /// Job name
        name: String,
    },
}
