// Primitives - Minimal core types shared by every module
use serde::{Deserialize, Serialize};

/// Block height (the protocol's only clock)
pub type BlockNumber = u64;

/// Token amount in the smallest unit
pub type Balance = u128;

/// Index of a pool in the append-only pool list
pub type PoolId = u64;

/// Sentinel returned by name lookups that match no pool
pub const POOL_NOT_FOUND: PoolId = PoolId::MAX;

/// Denominator of every percentage-scaled factor
pub const PERCENT_BASE: u64 = 100;

/// Token units (18 decimals, same as the staked token)
pub const TOKEN: Balance = 1_000_000_000_000_000_000;

/// Default protocol-wide minimum deposit for new pools
pub const DEFAULT_MIN_DEPOSIT: Balance = 0;

/// Blake3 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash arbitrary data with Blake3
    pub fn hash(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Hash(*hash.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let data = b"assurance";
        assert_eq!(Hash::hash(data), Hash::hash(data));
        assert_ne!(Hash::hash(data), Hash::hash(b"other"));
    }

    #[test]
    fn test_sentinel_is_not_a_small_index() {
        assert_eq!(POOL_NOT_FOUND, u64::MAX);
        assert!(POOL_NOT_FOUND > 1_000_000);
    }
}
