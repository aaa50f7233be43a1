//! Invariant checkers, one module per concern.

pub mod reclamation;
pub mod stack;
