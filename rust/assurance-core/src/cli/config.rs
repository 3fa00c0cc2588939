// CLI Configuration - Convert CLI args to node config
// Principle: Clear mapping between user input and internal configuration
//
// Precedence: command line (and its env fallbacks) > config file > defaults.

use crate::cli::{latest_snapshot_path, ReplayCmd};
use crate::contracts::assurance::AssuranceConfig;
use crate::types::{AccountError, AccountId, Balance};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Replay configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Scenario to replay
    pub scenario: PathBuf,
    /// Base data path
    pub base_path: PathBuf,
    /// Protocol configuration
    pub assurance: AssuranceConfig,
    /// Where to write the final state, if anywhere
    pub snapshot_path: Option<PathBuf>,
    /// Report format
    pub output: OutputFormat,
}

/// Report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(format: &str) -> Result<Self, ConfigError> {
        match format {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(ConfigError::InvalidFormat(other.to_string())),
        }
    }
}

/// Protocol configuration file (JSON), every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    owner: Option<String>,
    custodian: Option<String>,
    global_min_deposit: Option<Balance>,
}

impl NodeConfig {
    /// Create configuration from CLI replay command
    pub fn from_replay_cmd(cmd: &ReplayCmd) -> Result<Self, ConfigError> {
        let file = match &cmd.config {
            Some(path) => Self::load_config_file(path)?,
            None => ConfigFile::default(),
        };

        let defaults = AssuranceConfig::default();
        let owner = match cmd.owner.as_deref().or(file.owner.as_deref()) {
            Some(reference) => parse_account("owner", reference)?,
            None => defaults.owner,
        };
        let custodian = match cmd.custodian.as_deref().or(file.custodian.as_deref()) {
            Some(reference) => parse_account("custodian", reference)?,
            None => defaults.custodian,
        };
        if owner == custodian {
            return Err(ConfigError::OwnerIsCustodian);
        }
        let global_min_deposit = cmd
            .min_deposit
            .or(file.global_min_deposit)
            .unwrap_or(defaults.global_min_deposit);

        let base_path = cmd.get_base_path();
        let snapshot_path = match (&cmd.snapshot, cmd.persist) {
            (Some(path), _) => Some(path.clone()),
            (None, true) => Some(latest_snapshot_path(&base_path)),
            (None, false) => None,
        };

        let output = OutputFormat::parse(&cmd.format)?;

        info!("Protocol owner {}, custodian {}", owner, custodian);
        Ok(Self {
            scenario: cmd.scenario.clone(),
            base_path,
            assurance: AssuranceConfig {
                owner,
                custodian,
                global_min_deposit,
            },
            snapshot_path,
            output,
        })
    }

    /// Load the protocol configuration file
    fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ConfigReadError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ConfigParseError(e.to_string()))
    }
}

fn parse_account(field: &'static str, reference: &str) -> Result<AccountId, ConfigError> {
    let account: AccountId = reference
        .parse()
        .map_err(|source| ConfigError::InvalidAccount { field, source })?;
    if account.is_zero() {
        return Err(ConfigError::ZeroAccount(field));
    }
    Ok(account)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Failed to read config file: {0}")]
    ConfigReadError(String),

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(String),

    #[error("Invalid {field} account: {source}")]
    InvalidAccount {
        field: &'static str,
        source: AccountError,
    },

    #[error("The {0} account cannot be the zero address")]
    ZeroAccount(&'static str),

    #[error("Protocol owner and custodian must differ")]
    OwnerIsCustodian,

    #[error("Invalid output format: {0} (expected text or json)")]
    InvalidFormat(String),
}
