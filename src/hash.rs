use std::fmt;
use std::hash::BuildHasher;

use xxhash_rust::xxh3::Xxh3;

/// The default hasher for [`SwissMap`](crate::SwissMap) and
/// [`ShardedMap`](crate::ShardedMap).
///
/// Builds seeded XXH3 hashers. Every `SeededState` created with [`SeededState::new`]
/// draws a fresh random seed, so the placement of keys differs between maps and an
/// attacker cannot precompute colliding keys.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SeededState {
    seed: u64,
}

impl SeededState {
    /// Creates a new `SeededState` with a random seed.
    pub fn new() -> SeededState {
        SeededState {
            seed: rand::random(),
        }
    }

    /// Creates a `SeededState` with a fixed seed.
    ///
    /// Maps built with a fixed seed are deterministic across runs, which is useful
    /// for testing and benchmarking but exposes them to hash-flooding.
    pub const fn with_seed(seed: u64) -> SeededState {
        SeededState { seed }
    }

    /// Returns the seed of this state.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for SeededState {
    fn default() -> SeededState {
        SeededState::new()
    }
}

impl BuildHasher for SeededState {
    type Hasher = Xxh3;

    #[inline]
    fn build_hasher(&self) -> Xxh3 {
        Xxh3::with_seed(self.seed)
    }
}

impl fmt::Debug for SeededState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keep the seed out of logs.
        f.debug_struct("SeededState").finish_non_exhaustive()
    }
}
