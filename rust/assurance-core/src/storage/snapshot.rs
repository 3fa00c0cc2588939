// Snapshot - Pool store persisted as bincode behind a BLAKE3 checksum
//
// Layout: MAGIC (4) | VERSION (1) | blake3(payload) (32) | payload

use super::pool_store::{PoolStore, StoreError};
use crate::types::{BlockNumber, Hash};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

const MAGIC: &[u8; 4] = b"ASNP";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 32;

/// Pool store at a given block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub block: BlockNumber,
    pub store: PoolStore,
}

impl Snapshot {
    pub fn new(block: BlockNumber, store: PoolStore) -> Self {
        Self { block, store }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let payload = bincode::serialize(self).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        let checksum = Hash::hash(&payload);

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(checksum.as_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::Truncated(bytes.len()));
        }
        if &bytes[..4] != MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        if bytes[4] != VERSION {
            return Err(SnapshotError::UnsupportedVersion(bytes[4]));
        }

        let mut expected = [0u8; 32];
        expected.copy_from_slice(&bytes[5..HEADER_LEN]);
        let payload = &bytes[HEADER_LEN..];
        if Hash::hash(payload) != Hash::from_bytes(expected) {
            return Err(SnapshotError::ChecksumMismatch);
        }

        let snapshot: Snapshot =
            bincode::deserialize(payload).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.store.verify_all()?;
        Ok(snapshot)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SnapshotError> {
        let bytes = self.encode()?;
        fs::write(path.as_ref(), &bytes).map_err(|e| SnapshotError::Io(e.to_string()))?;
        info!(
            "Snapshot of {} pools at block {} written to {}",
            self.store.len(),
            self.block,
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SnapshotError> {
        let bytes = fs::read(path.as_ref()).map_err(|e| SnapshotError::Io(e.to_string()))?;
        Self::decode(&bytes)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Snapshot truncated ({0} bytes)")]
    Truncated(usize),

    #[error("Not a snapshot file")]
    BadMagic,

    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u8),

    #[error("Snapshot checksum mismatch")]
    ChecksumMismatch,

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Decoding failed: {0}")]
    Decode(String),

    #[error("Snapshot state invalid: {0}")]
    InvalidState(#[from] StoreError),
}
