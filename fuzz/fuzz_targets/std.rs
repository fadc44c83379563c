#![no_main]

use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;
use std::collections::HashMap as StdHashMap;
use std::ops::ControlFlow;
use swissmap::{MatchMode, ShardedMap, SwissMap};

#[derive(Debug, Arbitrary)]
enum Operation<K, V> {
    Insert(K, V),
    Remove(K),
    Get(K),
    Contains(K),
    Clear,
    Len,
    IsEmpty,
    Update(K, V),
    GetOrInsert(K, V),
    // Retain entries whose value is not divisible by the given modulus.
    Retain(u8),
    Reserve(u8),
}

#[derive(Debug, Arbitrary)]
enum Mode {
    Detect,
    Portable,
    Scalar,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    mode: Mode,
    shards: u8,
    // Small keys so operations frequently hit existing entries.
    operations: Vec<Operation<u16, u32>>,
}

fn fuzz_hashmap(input: FuzzInput) {
    let mode = match input.mode {
        Mode::Detect => MatchMode::Detect,
        Mode::Portable => MatchMode::Portable,
        Mode::Scalar => MatchMode::Scalar,
    };

    let mut std_map = StdHashMap::new();
    let mut swiss_map = SwissMap::builder().match_mode(mode).build();
    let sharded_map = ShardedMap::builder()
        .shards(usize::from(input.shards % 16) + 1)
        .match_mode(mode)
        .build();

    for op in input.operations {
        match op {
            Operation::Insert(k, v) => {
                let std_result = std_map.insert(k, v);
                assert_eq!(std_result, swiss_map.insert(k, v));
                assert_eq!(std_result, sharded_map.insert(k, v));
            }
            Operation::Remove(k) => {
                let std_result = std_map.remove(&k);
                assert_eq!(std_result, swiss_map.remove(&k));
                assert_eq!(std_result, sharded_map.remove(&k));
            }
            Operation::Get(k) => {
                let std_result = std_map.get(&k);
                assert_eq!(std_result, swiss_map.get(&k));
                assert_eq!(std_result.copied(), sharded_map.get(&k));
            }
            Operation::Contains(k) => {
                let std_result = std_map.contains_key(&k);
                assert_eq!(std_result, swiss_map.contains_key(&k));
                assert_eq!(std_result, sharded_map.contains_key(&k));
            }
            Operation::Clear => {
                std_map.clear();
                swiss_map.clear();
                sharded_map.clear();
            }
            Operation::Len => {
                assert_eq!(std_map.len(), swiss_map.len());
                assert_eq!(std_map.len(), sharded_map.len());
            }
            Operation::IsEmpty => {
                assert_eq!(std_map.is_empty(), swiss_map.is_empty());
                assert_eq!(std_map.is_empty(), sharded_map.is_empty());
            }
            Operation::Update(k, v) => {
                let std_result = std_map.get_mut(&k).map(|e| {
                    *e = e.wrapping_add(v);
                    *e
                });
                let swiss_result = swiss_map.get_mut(&k).map(|e| {
                    *e = e.wrapping_add(v);
                    *e
                });
                let sharded_result = sharded_map.update(&k, |e| {
                    *e = e.wrapping_add(v);
                    *e
                });
                assert_eq!(std_result, swiss_result);
                assert_eq!(std_result, sharded_result);
            }
            Operation::GetOrInsert(k, v) => {
                let std_result = *std_map.entry(k).or_insert(v);
                assert_eq!(std_result, *swiss_map.get_or_insert_with(k, || v));
                assert_eq!(std_result, sharded_map.get_or_insert_with(k, || v));
            }
            Operation::Retain(modulus) => {
                let modulus = u32::from(modulus.max(1));
                std_map.retain(|_, v| *v % modulus != 0);
                swiss_map.retain(|_, v| *v % modulus != 0);
                sharded_map.retain(|_, v| *v % modulus != 0);
            }
            Operation::Reserve(additional) => {
                swiss_map.reserve(usize::from(additional));
                assert!(swiss_map.capacity() >= usize::from(additional));
            }
        }

        assert_eq!(
            swiss_map.len() + swiss_map.capacity() + swiss_map.tombstones(),
            swiss_map.group_count() * swissmap::MAX_LOAD
        );
    }

    // Final consistency checks
    for (k, v) in std_map.iter() {
        assert_eq!(Some(v), swiss_map.get(k));
        assert_eq!(Some(*v), sharded_map.get(k));
    }
    assert_eq!(std_map.len(), swiss_map.iter().count());

    let mut visited = 0;
    sharded_map.iterate(|k, v| {
        assert_eq!(std_map.get(k), Some(v));
        visited += 1;
        ControlFlow::Continue(())
    });
    assert_eq!(std_map.len(), visited);
}

fuzz_target!(|data: FuzzInput| {
    fuzz_hashmap(data);
});
