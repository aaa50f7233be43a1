//! Simulated time.

/// A manually advanced clock with nanosecond resolution.
///
/// Simulated time only moves when the harness advances it, so a run's
/// timing is part of its seed-determined schedule.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_ns: u64,
}

impl SimClock {
    /// A clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time in nanoseconds.
    #[must_use]
    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    /// Advance by `ns` nanoseconds.
    pub fn advance_ns(&mut self, ns: u64) {
        self.now_ns = self.now_ns.wrapping_add(ns);
    }

    /// Advance by `us` microseconds.
    pub fn advance_us(&mut self, us: u64) {
        self.advance_ns(us.wrapping_mul(1_000));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        assert_eq!(SimClock::new().now_ns(), 0);
    }

    #[test]
    fn test_advance() {
        let mut clock = SimClock::new();
        clock.advance_ns(500);
        clock.advance_us(2);
        assert_eq!(clock.now_ns(), 2_500);
    }
}
