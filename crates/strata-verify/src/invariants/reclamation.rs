//! Reclamation accounting invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | FreedAtMostAllocated | The deallocation path never ran more often than the allocation path |
//! | LiveBalance | allocated − freed matches the reported live count |
//! | AllReclaimed | After quiescent drain, every node was handed back exactly once |
//!
//! The counts come from the stack's node pool (`pool_stats()`), which
//! increments a counter on every allocation and every deallocation.
//! `AllReclaimed` is opt-in: it only holds once the stack has been
//! drained and, for the hazard-pointer variant, swept.

use crate::property::{PropertyChecker, PropertyResult};

/// Allocation/deallocation accounting for one stack under test.
#[derive(Debug, Clone, Copy)]
pub struct ReclamationAudit {
    allocated: u64,
    freed: u64,
    live: u64,
    expect_all_reclaimed: bool,
}

impl ReclamationAudit {
    /// Audit raw pool counters.
    #[must_use]
    pub fn new(allocated: u64, freed: u64, live: u64) -> Self {
        Self {
            allocated,
            freed,
            live,
            expect_all_reclaimed: false,
        }
    }

    /// Additionally require that every allocation has been reclaimed.
    /// Only valid once the stack is quiescent and fully drained.
    #[must_use]
    pub fn expect_all_reclaimed(mut self) -> Self {
        self.expect_all_reclaimed = true;
        self
    }

    fn check_freed_at_most_allocated(&self) -> PropertyResult {
        if self.freed > self.allocated {
            return PropertyResult::fail(
                "FreedAtMostAllocated",
                format!(
                    "{} nodes freed but only {} allocated",
                    self.freed, self.allocated
                ),
                None,
            );
        }
        PropertyResult::pass("FreedAtMostAllocated")
    }

    fn check_live_balance(&self) -> PropertyResult {
        let expected = self.allocated.saturating_sub(self.freed);
        if self.live != expected {
            return PropertyResult::fail(
                "LiveBalance",
                format!(
                    "pool reports {} live nodes, counters say {} ({} allocated − {} freed)",
                    self.live, expected, self.allocated, self.freed
                ),
                None,
            );
        }
        PropertyResult::pass("LiveBalance")
    }

    fn check_all_reclaimed(&self) -> PropertyResult {
        if !self.expect_all_reclaimed {
            return PropertyResult::pass("AllReclaimed");
        }
        if self.freed != self.allocated {
            return PropertyResult::fail(
                "AllReclaimed",
                format!(
                    "{} of {} nodes still unreclaimed after drain",
                    self.allocated - self.freed.min(self.allocated),
                    self.allocated
                ),
                None,
            );
        }
        PropertyResult::pass("AllReclaimed")
    }
}

impl PropertyChecker for ReclamationAudit {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_freed_at_most_allocated(),
            self.check_live_balance(),
            self.check_all_reclaimed(),
        ]
    }
}
