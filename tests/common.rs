#![allow(dead_code)]

use swissmap::{MatchMode, SeededState, ShardedMap, SwissMap};

// Run the test on every group matching strategy of a `SwissMap`.
pub fn with_map<K, V>(mut test: impl FnMut(&dyn Fn() -> SwissMap<K, V>)) {
    // Hardware matching when available.
    test(&(|| SwissMap::builder().match_mode(MatchMode::Detect).build()));

    // Word-at-a-time matching, the fallback without SIMD.
    test(&(|| SwissMap::builder().match_mode(MatchMode::Portable).build()));

    // Byte-at-a-time reference matcher.
    if !cfg!(swissmap_stress) {
        test(&(|| SwissMap::builder().match_mode(MatchMode::Scalar).build()));
    }
}

// Run the test on different configurations of a `ShardedMap`.
pub fn with_sharded<K, V>(mut test: impl FnMut(&dyn Fn() -> ShardedMap<K, V>)) {
    // A single shard, so every operation contends on one lock.
    if !cfg!(swissmap_stress) {
        test(&(|| ShardedMap::builder().shards(1).build()));
    }

    // A few shards with the portable matcher.
    test(
        &(|| {
            ShardedMap::builder()
                .shards(3)
                .match_mode(MatchMode::Portable)
                .build()
        }),
    );

    // Many shards with small tables, to promote rehashing under contention.
    test(&(|| ShardedMap::builder().shards(64).build()));
}

// A deterministic map, for tests that depend on key placement.
pub fn seeded_map<K, V>(seed: u64) -> SwissMap<K, V> {
    SwissMap::builder()
        .hasher(SeededState::with_seed(seed))
        .build()
}

// Prints a log message if `RUST_LOG=debug` is set.
#[macro_export]
macro_rules! debug {
    ($($x:tt)*) => {
        if std::env::var("RUST_LOG").as_deref() == Ok("debug") {
            println!($($x)*);
        }
    };
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    if cfg!(miri) {
        2
    } else {
        num_cpus::get_physical().next_power_of_two().min(16)
    }
}
