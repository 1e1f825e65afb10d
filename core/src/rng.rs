//! Deterministic random number generation for model training.
//!
//! RULE: Nothing in the engine may call any platform RNG.
//! All randomness flows through TreeRng instances derived from the
//! single seed stored in the churn model configuration.
//!
//! Each tree in the forest gets its own stream, seeded from
//! (seed XOR tree_index * golden ratio). This means:
//!   - Growing more trees never changes the existing trees.
//!   - Each tree is fully reproducible in isolation.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A deterministic RNG stream for a single tree.
pub struct TreeRng {
    inner: Pcg64Mcg,
}

impl TreeRng {
    pub fn new(seed: u64, tree_index: u64) -> Self {
        let derived_seed = seed ^ tree_index.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self { inner: Pcg64Mcg::seed_from_u64(derived_seed) }
    }

    /// Roll a usize in [0, n).
    pub fn next_below(&mut self, n: usize) -> usize {
        assert!(n > 0, "n must be > 0");
        (self.inner.next_u64() % n as u64) as usize
    }

    /// Draw `n` indices in [0, n) with replacement.
    pub fn bootstrap(&mut self, n: usize) -> Vec<usize> {
        (0..n).map(|_| self.next_below(n)).collect()
    }

    /// Pick `k` distinct indices from [0, n) via a partial Fisher-Yates shuffle.
    pub fn sample_distinct(&mut self, n: usize, k: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..n).collect();
        let k = k.min(n);
        for i in 0..k {
            let j = i + self.next_below(n - i);
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool
    }
}
