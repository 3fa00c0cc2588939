// Account - Opaque 32-byte addresses for owners, stakers, policies and subjects
use super::primitives::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// AccountId = 32-byte address
/// Principle: No identity, just addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId([u8; 32]);

impl AccountId {
    /// The all-zero address, never a valid owner or staker
    pub const ZERO: AccountId = AccountId([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        AccountId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a stable address from a human label ("alice", "policy/zero-balance")
    pub fn from_label(label: &str) -> Self {
        AccountId(*Hash::hash(label.as_bytes()).as_bytes())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        AccountId(bytes)
    }
}

/// Accepts a full 64-char hex address (with or without `0x`) or a label
impl FromStr for AccountId {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AccountError::Empty);
        }

        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            let decoded = hex::decode(hex_part).map_err(|e| AccountError::InvalidHex(e.to_string()))?;
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&decoded);
            return Ok(AccountId(bytes));
        }

        if trimmed.starts_with("0x") {
            return Err(AccountError::InvalidLength(hex_part.len()));
        }

        Ok(AccountId::from_label(trimmed))
    }
}

/// Account parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("Empty account reference")]
    Empty,

    #[error("Invalid hex address: {0}")]
    InvalidHex(String),

    #[error("Hex address must be 64 characters, got {0}")]
    InvalidLength(usize),
}
