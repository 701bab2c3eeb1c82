//! Deterministic random streams for map generation
//!
//! Every subsystem (solver, zone search, decoration scatter) draws from its
//! own forked stream, so changing how many values one system consumes never
//! shifts the draws of another. Identical seed means identical sequence on
//! every host: values are produced by ChaCha8 and converted with fixed
//! integer arithmetic, never from iteration order or wall-clock time.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A seeded random stream that can fork independent sub-streams.
pub struct GenRng {
    seed: u64,
    stream: ChaCha8Rng,
}

impl GenRng {
    /// Create a stream from a 64-bit seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            stream: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The seed this stream was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Next raw 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        self.stream.next_u64()
    }

    /// Uniform float in [0, 1), built from the top 53 bits of one draw.
    pub fn next_float(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform integer in [lo, hi). `hi` must be greater than `lo`.
    pub fn next_int(&mut self, lo: i64, hi: i64) -> i64 {
        debug_assert!(lo < hi, "empty range [{}, {})", lo, hi);
        let span = (hi - lo) as u64;
        lo + self.next_below(span) as i64
    }

    /// Uniform integer in [0, n) via widening multiply.
    fn next_below(&mut self, n: u64) -> u64 {
        ((self.next_u64() as u128 * n as u128) >> 64) as u64
    }

    /// Pick an index with probability proportional to its weight.
    /// Weights must be non-empty and sum to a positive value.
    pub fn weighted_pick(&mut self, weights: &[u64]) -> usize {
        let total: u64 = weights.iter().sum();
        debug_assert!(total > 0, "weighted_pick needs a positive total weight");
        let mut draw = self.next_below(total);
        for (i, &w) in weights.iter().enumerate() {
            if draw < w {
                return i;
            }
            draw -= w;
        }
        weights.len() - 1
    }

    /// Fork an independent sub-stream named by `label`.
    ///
    /// The fork is derived from this stream's creation seed, not from its
    /// current position, so forking is reproducible no matter how much of
    /// the parent has been consumed.
    pub fn fork(&self, label: &str) -> GenRng {
        GenRng::from_seed(derive_seed(self.seed, label, 0))
    }

    /// Fork an indexed sub-stream, e.g. one per retry attempt.
    pub fn fork_indexed(&self, label: &str, index: u64) -> GenRng {
        GenRng::from_seed(derive_seed(self.seed, label, index))
    }
}

/// Derive a sub-seed from a master seed, a label and an index.
///
/// FNV-1a rather than `DefaultHasher`: the std hasher's output is not
/// specified across Rust releases, and sub-seeds must be stable forever.
fn derive_seed(master: u64, label: &str, index: u64) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in master
        .to_le_bytes()
        .iter()
        .chain(label.as_bytes())
        .chain(index.to_le_bytes().iter())
    {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
