// CLI - Command Line Interface for the assurance node
// Principle: Simple, clear, composable commands

pub mod config;
pub mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Assurance Node - Replay and inspect collateralized policy-insurance pools
#[derive(Parser, Debug)]
#[command(name = "assurance-node")]
#[command(author = "Assurance Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Assurance pools - staking collateral against security policy violations")]
#[command(long_about = r#"
Assurance pools let an owner insure a monitored contract: the owner deposits
interest, stakers put up collateral, and a policy oracle decides whether the
owner may claim that collateral.

Replay a transaction log and keep the resulting state:
  assurance-node replay scenario.json --snapshot pools.bin

Inspect a saved state:
  assurance-node inspect pools.bin --pool 0

Resolve an account reference (label or hex):
  assurance-node account alice
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", env = "ASSURANCE_LOG")]
    pub log_level: String,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scenario (genesis + block-stamped transactions)
    Replay(ReplayCmd),

    /// Print pools stored in a snapshot
    Inspect(InspectCmd),

    /// Show the 32-byte address behind a label or hex string
    Account(AccountCmd),
}

/// Replay a scenario file
#[derive(Parser, Debug)]
pub struct ReplayCmd {
    /// Scenario file (JSON)
    pub scenario: PathBuf,

    /// Base path for snapshots
    #[arg(short = 'd', long, env = "ASSURANCE_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// Protocol configuration file (JSON)
    #[arg(short, long, env = "ASSURANCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Protocol owner (label or hex), overrides the config file
    #[arg(long, env = "ASSURANCE_OWNER")]
    pub owner: Option<String>,

    /// Custody account (label or hex), overrides the config file
    #[arg(long, env = "ASSURANCE_CUSTODIAN")]
    pub custodian: Option<String>,

    /// Minimum initial deposit for new pools, overrides the config file
    #[arg(long)]
    pub min_deposit: Option<u128>,

    /// Write the final state to this file
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Write the final state to the base path (ignored when --snapshot is given)
    #[arg(long)]
    pub persist: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    pub format: String,
}

/// Inspect a snapshot
#[derive(Parser, Debug)]
pub struct InspectCmd {
    /// Snapshot file (defaults to the latest one under the base path)
    pub snapshot: Option<PathBuf>,

    /// Base path for snapshots
    #[arg(short = 'd', long, env = "ASSURANCE_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// Only show this pool
    #[arg(long)]
    pub pool: Option<u64>,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    pub format: String,
}

/// Resolve an account reference
#[derive(Parser, Debug)]
pub struct AccountCmd {
    /// Label ("alice") or 64-character hex address
    pub reference: String,
}

/// Default data directory (platform-specific)
pub fn default_base_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("assurance")
}

/// Snapshot written by `replay --persist`
pub fn latest_snapshot_path(base_path: &std::path::Path) -> PathBuf {
    base_path.join("snapshots").join("latest.bin")
}

impl ReplayCmd {
    /// Get the base path, defaulting to platform-specific data directory
    pub fn get_base_path(&self) -> PathBuf {
        self.base_path.clone().unwrap_or_else(default_base_path)
    }
}

impl InspectCmd {
    /// Snapshot to read, explicit or the latest persisted one
    pub fn snapshot_path(&self) -> PathBuf {
        match &self.snapshot {
            Some(path) => path.clone(),
            None => latest_snapshot_path(&self.base_path.clone().unwrap_or_else(default_base_path)),
        }
    }
}
