// Types - Core data model of the assurance protocol
// Principle: Minimal, auditable, serializable

pub mod primitives;
pub mod account;
pub mod pool;

pub use primitives::*;
pub use account::*;
pub use pool::*;
