use swissmap::{ConfigError, SeededState, ShardedMap};

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

mod common;
use common::{threads, with_sharded};

#[test]
fn new() {
    with_sharded::<usize, usize>(|map| drop(map()));
}

#[test]
fn insert_get_remove() {
    with_sharded::<usize, usize>(|map| {
        let map = map();
        assert_eq!(map.get(&42), None);
        assert_eq!(map.insert(42, 0), None);
        assert_eq!(map.insert(42, 1), Some(0));
        assert_eq!(map.get(&42), Some(1));
        assert!(map.contains_key(&42));
        assert_eq!(map.remove_entry(&42), Some((42, 1)));
        assert_eq!(map.remove(&42), None);
        assert!(map.is_empty());
    });
}

#[test]
fn borrowed_lookups() {
    with_sharded::<String, Vec<u8>>(|map| {
        let map = map();
        map.insert("key".to_owned(), vec![1, 2, 3]);

        assert_eq!(map.get_with("key", |v| v.len()), Some(3));
        assert_eq!(map.get("key"), Some(vec![1, 2, 3]));
        assert_eq!(map.remove("key"), Some(vec![1, 2, 3]));
    });
}

#[test]
fn update() {
    with_sharded::<usize, usize>(|map| {
        let map = map();
        assert_eq!(map.update(&1, |v| *v += 1), None);

        map.insert(1, 10);
        assert_eq!(
            map.update(&1, |v| {
                *v += 1;
                *v
            }),
            Some(11)
        );
        assert_eq!(map.get(&1), Some(11));
    });
}

#[test]
fn get_or_insert_with() {
    with_sharded::<usize, usize>(|map| {
        let map = map();
        assert_eq!(map.get_or_insert_with(5, || 50), 50);
        assert_eq!(map.get_or_insert_with(5, || unreachable!()), 50);
        assert_eq!(map.len(), 1);
    });
}

#[test]
fn len_and_clear() {
    with_sharded::<usize, usize>(|map| {
        let map = map();
        for i in 0..1000 {
            map.insert(i, i);
        }
        assert_eq!(map.len(), 1000);

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        for i in 0..1000 {
            assert_eq!(map.get(&i), None);
        }
    });
}

#[test]
fn retain() {
    with_sharded::<usize, usize>(|map| {
        let map = map();
        for i in 0..1000 {
            map.insert(i, i);
        }

        map.retain(|k, v| {
            *v *= 2;
            k % 2 == 0
        });

        assert_eq!(map.len(), 500);
        for i in (0..1000).step_by(2) {
            assert_eq!(map.get(&i), Some(i * 2));
        }
    });
}

#[test]
fn iterate() {
    with_sharded::<usize, usize>(|map| {
        let map = map();
        for i in 0..1000 {
            map.insert(i, i + 1);
        }

        let mut seen = HashSet::new();
        assert!(map.iterate(|k, v| {
            assert_eq!(*v, k + 1);
            assert!(seen.insert(*k));
            ControlFlow::Continue(())
        }));
        assert_eq!(seen.len(), 1000);

        // A break stops the remaining shards too.
        let mut visited = 0;
        let complete = map.iterate(|_, _| {
            visited += 1;
            if visited == 10 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(!complete);
        assert_eq!(visited, 10);
    });
}

#[test]
fn iterate_may_read_other_shards() {
    let map: ShardedMap<i32, i32> = ShardedMap::with_shards(8);
    for i in 0..100 {
        map.insert(i, i);
    }

    assert!(map.iterate(|k, _| {
        // Reads nest, so even the shard being visited is readable.
        assert_eq!(map.get(k), Some(*k));
        assert!(map.contains_key(&((k + 1) % 100)));
        ControlFlow::Continue(())
    }));
}

#[test]
#[cfg_attr(miri, ignore)]
fn iterate_reads_own_shard_with_a_queued_writer() {
    let map: Arc<ShardedMap<usize, usize>> = Arc::new(ShardedMap::with_shards(1));
    map.insert(1, 1);

    let (iterating_tx, iterating_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    let reader = {
        let map = map.clone();
        thread::spawn(move || {
            let complete = map.iterate(|k, v| {
                iterating_tx.send(()).unwrap();

                // Give the writer time to queue on the shard being visited.
                thread::sleep(Duration::from_millis(200));

                assert_eq!(map.get(k), Some(*v));
                assert!(map.contains_key(k));
                assert_eq!(map.get_with(k, |v| *v + 1), Some(v + 1));
                ControlFlow::Continue(())
            });
            done_tx.send(complete).unwrap();
        })
    };

    iterating_rx.recv().unwrap();
    let writer = {
        let map = map.clone();
        thread::spawn(move || map.insert(2, 2))
    };

    let complete = done_rx.recv_timeout(Duration::from_secs(10));
    assert_eq!(
        complete,
        Ok(true),
        "reading the visited shard blocked behind a queued writer"
    );

    reader.join().unwrap();
    assert_eq!(writer.join().unwrap(), None);
    assert_eq!(map.get(&2), Some(2));
}

#[test]
fn debug() {
    let map: ShardedMap<usize, usize> = ShardedMap::with_shards(4);
    map.insert(42, 0);
    map.insert(16, 8);

    let formatted = format!("{:?}", map);

    assert!(formatted == "{42: 0, 16: 8}" || formatted == "{16: 8, 42: 0}");
}

#[test]
fn from_iter_and_extend() {
    let map: ShardedMap<usize, usize> = (0..100).map(|i| (i, i)).collect();
    assert_eq!(map.len(), 100);

    (&map).extend((100..200).map(|i| (i, i)));
    assert_eq!(map.len(), 200);
    assert_eq!(map.get(&150), Some(150));
}

#[test]
fn builder() {
    let map: ShardedMap<usize, usize> = ShardedMap::builder()
        .shards(7)
        .capacity(700)
        .hasher(SeededState::with_seed(1))
        .build();

    assert_eq!(map.shard_count(), 7);
    assert!(map.capacity() >= 700);
    assert_eq!(map.hasher().seed(), 1);

    let err = ShardedMap::<usize, usize>::builder()
        .shards(0)
        .try_build()
        .unwrap_err();
    assert_eq!(err, ConfigError::InvalidShardCount(0));
}

#[test]
#[should_panic(expected = "invalid shard count")]
fn zero_shards_panics() {
    let _ = ShardedMap::<usize, usize>::builder().shards(0).build();
}

#[test]
fn shard_index_is_stable() {
    let map: ShardedMap<usize, usize> = ShardedMap::with_shards(16);
    let shards: Vec<_> = (0..1000).map(|i| map.shard_index(&i)).collect();
    assert!(shards.iter().all(|&s| s < 16));

    // Every shard gets some keys.
    let used: HashSet<_> = shards.iter().copied().collect();
    assert_eq!(used.len(), 16);

    // Growing a shard never moves keys between shards.
    for i in 0..10_000 {
        map.insert(i, i);
    }
    for i in 0..1000 {
        assert_eq!(map.shard_index(&i), shards[i]);
    }
}

#[test]
fn concurrent_insert() {
    with_sharded::<usize, usize>(|map| {
        let map = Arc::new(map());

        let map1 = map.clone();
        let t1 = std::thread::spawn(move || {
            for i in 0..64 {
                map1.insert(i, 0);
            }
        });
        let map2 = map.clone();
        let t2 = std::thread::spawn(move || {
            for i in 0..64 {
                map2.insert(i, 1);
            }
        });

        t1.join().unwrap();
        t2.join().unwrap();

        for i in 0..64 {
            let v = map.get(&i).unwrap();
            assert!(v == 0 || v == 1);
        }
        assert_eq!(map.len(), 64);
    });
}

#[test]
fn concurrent_remove() {
    with_sharded::<usize, usize>(|map| {
        let map = Arc::new(map());

        for i in 0..64 {
            map.insert(i, i);
        }

        let map1 = map.clone();
        let t1 = std::thread::spawn(move || {
            for i in 0..64 {
                if let Some(v) = map1.remove(&i) {
                    assert_eq!(v, i);
                }
            }
        });
        let map2 = map.clone();
        let t2 = std::thread::spawn(move || {
            for i in 0..64 {
                if let Some(v) = map2.remove(&i) {
                    assert_eq!(v, i);
                }
            }
        });

        t1.join().unwrap();
        t2.join().unwrap();

        // after joining the threads, the map should be empty
        for i in 0..64 {
            assert!(map.get(&i).is_none());
        }
        assert!(map.is_empty());
    });
}

#[test]
fn concurrent_update() {
    with_sharded::<usize, usize>(|map| {
        let map = Arc::new(map());

        for i in 0..64 {
            map.insert(i, i);
        }

        let map1 = map.clone();
        let t1 = std::thread::spawn(move || {
            for i in 0..64 {
                let new = map1
                    .update(&i, |v| {
                        *v += 1;
                        *v
                    })
                    .unwrap();
                assert!(new == i + 1 || new == i + 2);
            }
        });
        let map2 = map.clone();
        let t2 = std::thread::spawn(move || {
            for i in 0..64 {
                let new = map2
                    .update(&i, |v| {
                        *v += 1;
                        *v
                    })
                    .unwrap();
                assert!(new == i + 1 || new == i + 2);
            }
        });

        t1.join().unwrap();
        t2.join().unwrap();

        for i in 0..64 {
            assert_eq!(map.get(&i), Some(i + 2));
        }
    });
}

#[test]
fn concurrent_get_or_insert_with() {
    with_sharded::<usize, usize>(|map| {
        let map = map();
        let threads = threads();
        let barrier = Barrier::new(threads);
        let created = AtomicUsize::new(0);

        thread::scope(|s| {
            for t in 0..threads {
                let (map, barrier, created) = (&map, &barrier, &created);
                s.spawn(move || {
                    barrier.wait();
                    for i in 0..256 {
                        let v = map.get_or_insert_with(i, || {
                            created.fetch_add(1, Ordering::Relaxed);
                            t
                        });
                        assert!(v < threads);
                    }
                });
            }
        });

        // Every key was created exactly once.
        assert_eq!(created.into_inner(), 256);
        assert_eq!(map.len(), 256);
    });
}

#[test]
#[cfg_attr(miri, ignore)]
fn len_is_monotonic_under_a_single_writer() {
    const ENTRIES: usize = 1 << 14;

    with_sharded::<usize, usize>(|map| {
        let map = map();
        let done = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                let mut last = 0;
                while !done.load(Ordering::Acquire) {
                    let len = map.len();
                    assert!(len >= last, "len went backwards: {last} -> {len}");
                    assert!(len <= ENTRIES);
                    last = len;
                }
            });

            for i in 0..ENTRIES {
                map.insert(i, i);
            }
            done.store(true, Ordering::Release);
        });

        assert_eq!(map.len(), ENTRIES);
    });
}

#[test]
#[cfg_attr(miri, ignore)]
fn shards_lock_independently() {
    let map: ShardedMap<usize, usize> = ShardedMap::with_shards(8);

    let a = 0;
    let b = (1..)
        .find(|k: &usize| map.shard_index(k) != map.shard_index(&a))
        .unwrap();

    map.insert(a, 0);

    let (locked_tx, locked_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    thread::scope(|s| {
        let map = &map;

        // Hold the write lock of `a`'s shard until `b`'s shard has been written to.
        s.spawn(move || {
            map.update(&a, |v| {
                locked_tx.send(()).unwrap();
                let written = done_rx.recv_timeout(Duration::from_secs(10));
                assert!(written.is_ok(), "write to another shard was blocked");
                *v += 1;
            });
        });

        s.spawn(move || {
            locked_rx.recv().unwrap();
            map.insert(b, 1);
            done_tx.send(()).unwrap();
        });
    });

    assert_eq!(map.get(&a), Some(1));
    assert_eq!(map.get(&b), Some(1));
}
