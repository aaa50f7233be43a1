//! # strata-verify
//!
//! Invariant checkers for the `strata` stack family.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying named invariants
//! - `StackAudit` for recording push/pop traffic and replaying it against
//!   a model stack
//! - `ReclamationAudit` for checking allocation/deallocation accounting
//! - `Counterexample` for rendering failure paths with seed reproduction
//!
//! Checkers live outside the data structures under test: a test harness
//! records what it did, hands the audit its observations, and asserts
//! `all_hold()`. A failing property carries the violating element and,
//! when a seed is attached, a `STRATA_SEED=<n>` reproduction line.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, MemoryIssue, StateSnapshot, ThreadAction};
pub use invariants::reclamation::ReclamationAudit;
pub use invariants::stack::{StackAudit, StackChecker, StackHistory, StackOpKind, StackOperation};
pub use property::{PropertyChecker, PropertyResult};
