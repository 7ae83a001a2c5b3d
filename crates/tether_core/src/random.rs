//! # Deterministic Random
//!
//! Seeded generator handed to action handlers instead of ambient randomness.
//! Same seed, same sequence, on every platform: ChaCha8 is portable and
//! does not depend on the host's word size.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded, reproducible random source.
#[derive(Clone, Debug)]
pub struct DeterministicRandom {
    /// Seed the generator was created from.
    seed: u64,
    /// Underlying stream.
    rng: ChaCha8Rng,
}

impl DeterministicRandom {
    /// Creates a generator from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { seed, rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    /// Returns the seed this generator started from.
    #[inline]
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns a float in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Returns a uniformly distributed `u32`.
    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    /// Returns an integer in `[min, max]` (inclusive). Bounds may be given in
    /// either order.
    pub fn range_i64(&mut self, min: i64, max: i64) -> i64 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        self.rng.gen_range(lo..=hi)
    }

    /// Returns a float in `[min, max)`. Returns `min` for an empty range.
    pub fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        if max > min {
            self.rng.gen_range(min..max)
        } else {
            min
        }
    }

    /// Returns true with probability `p` (clamped to `[0, 1]`).
    pub fn chance(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            false
        } else if p >= 1.0 {
            true
        } else {
            self.next_f64() < p
        }
    }

    /// Picks one element, or `None` for an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// Shuffles a slice in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Derives an independent stream from the same seed.
    ///
    /// Forks do not depend on how far this generator has advanced.
    #[must_use]
    pub fn fork(&self, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(stream);
        Self { seed: self.seed, rng }
    }
}

impl Default for DeterministicRandom {
    fn default() -> Self {
        Self::new(0)
    }
}
