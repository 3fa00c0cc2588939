// Contracts - The assurance protocol and its building blocks
// Principle: Everything is deterministic over (state, block, collaborator answers)

pub mod collaborators;
pub mod bonus;
pub mod lifecycle;
pub mod payout;
pub mod assurance;
