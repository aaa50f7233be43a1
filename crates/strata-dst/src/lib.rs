//! # strata-dst
//!
//! Deterministic stress-test environment for the `strata` stacks.
//!
//! All behavior (operation mix, values, simulated delays) derives
//! from a single `u64` seed, so every run is reproducible:
//!
//! ```bash
//! STRATA_SEED=12345 cargo test
//! ```
//!
//! ```rust
//! use strata_dst::DstEnv;
//!
//! let mut env = DstEnv::new(12345);
//!
//! // Deterministic randomness
//! let value = env.rng().gen_range(1, 1000);
//!
//! // Deterministic time
//! env.clock().advance_us(50);
//! let now = env.clock().now_ns();
//!
//! // Deterministic delay injection
//! env.maybe_delay();
//! # let _ = (value, now);
//! ```

pub mod clock;
pub mod delay;
pub mod env;
pub mod rng;

pub use clock::SimClock;
pub use delay::DelayConfig;
pub use env::DstEnv;
pub use rng::DeterministicRng;

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the seed from the environment or generate one.
///
/// Prints the seed so a failing run can be replayed with
/// `STRATA_SEED=<seed>`.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    match std::env::var("STRATA_SEED") {
        Ok(s) => {
            let seed: u64 = s.parse().expect("STRATA_SEED must be a valid u64");
            println!("STRATA_SEED={} (from environment)", seed);
            seed
        }
        Err(_) => {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before unix epoch")
                .subsec_nanos() as u64;
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before unix epoch")
                .as_secs();
            // Never zero: a zero seed is reserved to mean "unset".
            let seed = (secs.wrapping_mul(1_000_000_007) ^ nanos) | 1;
            println!("STRATA_SEED={} (generated)", seed);
            seed
        }
    }
}
