//! The bundled deterministic environment.

use crate::clock::SimClock;
use crate::delay::DelayConfig;
use crate::rng::DeterministicRng;

/// One deterministic test run: rng, clock, and delay injection, all
/// driven by a single seed.
#[derive(Debug)]
pub struct DstEnv {
    seed: u64,
    rng: DeterministicRng,
    clock: SimClock,
    delays: DelayConfig,
    delays_injected: u64,
    delay_ns_total: u64,
}

impl DstEnv {
    /// Environment with the default delay mix.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_delay_config(seed, DelayConfig::default())
    }

    /// Environment with an explicit delay configuration.
    #[must_use]
    pub fn with_delay_config(seed: u64, delays: DelayConfig) -> Self {
        Self {
            seed,
            rng: DeterministicRng::new(seed),
            clock: SimClock::new(),
            delays,
            delays_injected: 0,
            delay_ns_total: 0,
        }
    }

    /// The seed this run derives from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The random source.
    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    /// The simulated clock.
    pub fn clock(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    /// Maybe inject one simulated delay, per the configured
    /// probability. Returns the injected delay in nanoseconds.
    pub fn maybe_delay(&mut self) -> u64 {
        if self.delays.max_delay_us == 0 || !self.rng.gen_bool(self.delays.probability) {
            return 0;
        }
        let ns = self.rng.gen_range(1, self.delays.max_delay_us + 1) * 1_000;
        self.clock.advance_ns(ns);
        self.delays_injected += 1;
        self.delay_ns_total += ns;
        ns
    }

    /// Reproduction line for failure messages.
    #[must_use]
    pub fn format_seed(&self) -> String {
        format!("STRATA_SEED={}", self.seed)
    }

    /// One-line run summary.
    #[must_use]
    pub fn stats(&self) -> String {
        format!(
            "seed={} sim_time={}ns delays={} ({}ns total)",
            self.seed,
            self.clock.now_ns(),
            self.delays_injected,
            self.delay_ns_total
        )
    }
}
