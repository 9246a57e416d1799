//! tickwork - recurring job scheduler
//!
//! Main entry point for the tickwork CLI and server.

mod cli;
mod cmd_jobs;
mod jobs;
mod server;

use clap::Parser;

use tickwork_config::{ConfigLoader, ConfigValidator};

use crate::cli::{Cli, Commands};
use crate::cmd_jobs::handle_jobs_command;
use crate::server::{init_tracing, log_warnings, run_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::load_or_default(&cli.config)?;
    if let Some(Commands::Run { host, port }) = &cli.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }
    let warnings = ConfigValidator::validate(&config)?.into_result()?;

    init_tracing(&config)?;
    log_warnings(&warnings);

    match cli.command {
        None | Some(Commands::Run { .. }) => run_server(config).await,
        Some(Commands::Jobs { action }) => handle_jobs_command(action, &config).await,
    }
}
