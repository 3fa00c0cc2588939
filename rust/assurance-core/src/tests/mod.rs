// Tests module
// Lifecycle: end-to-end pool scenarios through the public operations
// Accounting: randomized operation sequences preserving custody invariants

pub mod accounting_invariants;
