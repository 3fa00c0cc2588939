// Storage - Pool arena and its on-disk snapshots
// Principle: Auditability, reproducibility

pub mod pool_store;
pub mod snapshot;

pub use pool_store::*;
pub use snapshot::*;
