//! The failure taxonomy.
//!
//! Exactly one condition crosses the crate boundary as an error.
//! An empty stack is a normal outcome (`Ok(None)`), contention is
//! absorbed by CAS retry loops, and allocation failure aborts the
//! process the way memory exhaustion conventionally does, before the
//! stack head is touched, so a failed push cannot corrupt the stack.

use thiserror::Error;

/// Errors reported by stack operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Every hazard slot is claimed by a concurrently popping thread.
    ///
    /// This is a hard operational limit, not a transient hiccup: the
    /// registry was sized below the peak number of concurrent poppers.
    /// Callers may retry once other pops finish, or treat it as fatal
    /// per their own policy.
    #[error("hazard registry exhausted: all {capacity} slots are claimed")]
    RegistryExhausted {
        /// Total slots in the registry.
        capacity: usize,
    },
}
