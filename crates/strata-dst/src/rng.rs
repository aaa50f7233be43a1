//! Deterministic pseudo-random numbers.
//!
//! SplitMix64 core: tiny, fast, and fully determined by the seed. Not
//! cryptographic and not meant to be; the only requirement here is
//! that the same seed replays the same schedule on every platform.

/// A seeded deterministic generator.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    /// Create a generator from a seed. Any seed is valid, including 0.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            // Pre-mix so nearby seeds do not produce nearby streams.
            state: seed.wrapping_add(0x9e37_79b9_7f4a_7c15),
        }
    }

    /// Next raw 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform value in `[lo, hi)`. Panics if the range is empty.
    pub fn gen_range(&mut self, lo: u64, hi: u64) -> u64 {
        assert!(lo < hi, "empty range [{}, {})", lo, hi);
        let span = hi - lo;
        // Modulo bias is irrelevant at the range sizes tests use.
        lo + self.next_u64() % span
    }

    /// True with probability `p`.
    pub fn gen_bool(&mut self, p: f64) -> bool {
        debug_assert!((0.0..=1.0).contains(&p), "probability out of range");
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64) < p
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.gen_range(0, i as u64 + 1) as usize;
            slice.swap(i, j);
        }
    }
}
