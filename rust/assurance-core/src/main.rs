// Assurance Node - Entry point
// Principle: The protocol is a deterministic function of its transaction log

#![allow(dead_code)]
#![allow(unused_imports)]
#![allow(unused_variables)]

mod cli;
mod contracts;
mod storage;
mod types;

#[cfg(test)]
mod tests;

use clap::Parser;
use cli::config::{NodeConfig, OutputFormat};
use cli::runner::{run_inspect, run_replay};
use cli::{Cli, Commands};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use types::AccountId;

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_filter = if cli.verbose {
        "debug"
    } else {
        &cli.log_level
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay(cmd) => {
            let config = NodeConfig::from_replay_cmd(&cmd).map_err(|e| {
                error!("Configuration error: {}", e);
                anyhow::anyhow!("Configuration error: {}", e)
            })?;

            let report = run_replay(config).map_err(|e| {
                error!("Replay error: {}", e);
                anyhow::anyhow!("Replay error: {}", e)
            })?;
            info!("{} transactions applied, {} rejected", report.applied, report.failed);
        }

        Commands::Inspect(cmd) => {
            let format = OutputFormat::parse(&cmd.format)?;
            let path = cmd.snapshot_path();
            info!("Inspecting {}", path.display());
            run_inspect(&path, cmd.pool, format).map_err(|e| {
                error!("Inspect error: {}", e);
                anyhow::anyhow!("Inspect error: {}", e)
            })?;
        }

        Commands::Account(cmd) => {
            let account: AccountId = cmd
                .reference
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid account '{}': {}", cmd.reference, e))?;
            println!("Reference:  {}", cmd.reference);
            println!("Account ID: 0x{}", hex::encode(account.as_bytes()));
        }
    }

    Ok(())
}
