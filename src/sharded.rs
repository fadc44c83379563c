use crate::error::ConfigError;
use crate::hash::SeededState;
use crate::raw::{self, CachePadded, MatchMode};

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::ops::ControlFlow;

use parking_lot::RwLock;

/// A concurrent hash map, partitioned into independently locked swiss tables.
///
/// Every key belongs to exactly one shard, chosen from its hash. Operations on a key
/// lock only that key's shard: reads take the shard's read lock and writes take its
/// write lock, so operations on different shards never wait on each other. Rehashing
/// happens entirely under a shard's write lock, and readers never observe a partially
/// rehashed shard.
///
/// Reads acquire the shard lock recursively: a read is granted while another read lock is
/// held on the shard, even if a writer is waiting. Reads may therefore nest, for example
/// inside [`iterate`](ShardedMap::iterate), but a steady stream of overlapping readers
/// can delay writers to that shard.
///
/// Operations spanning the whole map ([`len`](ShardedMap::len),
/// [`clear`](ShardedMap::clear), [`iterate`](ShardedMap::iterate) and
/// [`retain`](ShardedMap::retain)) lock one shard at a time. They are **not** atomic with
/// respect to concurrent writers: shards that were already visited may change before the
/// operation completes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use swissmap::ShardedMap;
///
/// let map = Arc::new(ShardedMap::new());
///
/// let handles: Vec<_> = (0..4)
///     .map(|t| {
///         let map = map.clone();
///         thread::spawn(move || {
///             for i in 0..100 {
///                 map.insert(t * 100 + i, i);
///             }
///         })
///     })
///     .collect();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
///
/// assert_eq!(map.len(), 400);
/// assert_eq!(map.get(&250), Some(50));
/// ```
pub struct ShardedMap<K, V, S = SeededState> {
    shards: Box<[CachePadded<RwLock<raw::Table<K, V>>>]>,
    hasher: S,
}

/// A builder for a [`ShardedMap`].
///
/// # Examples
///
/// ```rust
/// use swissmap::{MatchMode, SeededState, ShardedMap};
///
/// let map: ShardedMap<u64, String> = ShardedMap::builder()
///     // Set the initial capacity, split evenly across shards.
///     .capacity(4096)
///     // Set the number of shards.
///     .shards(16)
///     // Set the hasher.
///     .hasher(SeededState::new())
///     // Set the group matching strategy.
///     .match_mode(MatchMode::Detect)
///     // Construct the map.
///     .build();
///
/// assert_eq!(map.shard_count(), 16);
/// ```
pub struct ShardedMapBuilder<K, V, S = SeededState> {
    hasher: S,
    capacity: usize,
    shards: usize,
    match_mode: MatchMode,
    _kv: PhantomData<(K, V)>,
}

impl<K, V> ShardedMapBuilder<K, V> {
    /// Set the hash builder used to hash keys.
    ///
    /// The same hash selects a key's shard and its position within the shard.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow maps to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    pub fn hasher<S>(self, hasher: S) -> ShardedMapBuilder<K, V, S> {
        ShardedMapBuilder {
            hasher,
            capacity: self.capacity,
            shards: self.shards,
            match_mode: self.match_mode,
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> ShardedMapBuilder<K, V, S> {
    /// Set the initial capacity of the map.
    ///
    /// The capacity is divided evenly between the shards. Because keys may not be spread
    /// perfectly evenly, individual shards may rehash before the map holds `capacity`
    /// entries.
    pub fn capacity(self, capacity: usize) -> Self {
        ShardedMapBuilder { capacity, ..self }
    }

    /// Set the number of shards.
    ///
    /// Defaults to the available parallelism of the machine. The shard count is fixed
    /// for the lifetime of the map and must be at least 1.
    pub fn shards(self, shards: usize) -> Self {
        ShardedMapBuilder { shards, ..self }
    }

    /// Set the group matching strategy. See [`MatchMode`] for details.
    pub fn match_mode(self, match_mode: MatchMode) -> Self {
        ShardedMapBuilder { match_mode, ..self }
    }

    /// Construct a [`ShardedMap`] from the builder, returning an error if the
    /// configuration is invalid.
    pub fn try_build(self) -> Result<ShardedMap<K, V, S>, ConfigError> {
        if self.shards == 0 {
            return Err(ConfigError::InvalidShardCount(self.shards));
        }

        let per_shard = self.capacity.div_ceil(self.shards);
        let groups = raw::groups_for(per_shard).ok_or(ConfigError::CapacityOverflow)?;

        log::trace!(
            "creating sharded map with {} shards of {groups} groups each",
            self.shards
        );

        let shards = (0..self.shards)
            .map(|_| CachePadded::new(RwLock::new(raw::Table::new(groups, self.match_mode))))
            .collect();

        Ok(ShardedMap {
            shards,
            hasher: self.hasher,
        })
    }

    /// Construct a [`ShardedMap`] from the builder, using the configured options.
    ///
    /// # Panics
    ///
    /// Panics if the shard count is zero or the capacity overflows.
    pub fn build(self) -> ShardedMap<K, V, S> {
        match self.try_build() {
            Ok(map) => map,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<K, V, S> fmt::Debug for ShardedMapBuilder<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedMapBuilder")
            .field("capacity", &self.capacity)
            .field("shards", &self.shards)
            .field("match_mode", &self.match_mode)
            .finish()
    }
}

impl<K, V> ShardedMap<K, V> {
    /// Creates an empty `ShardedMap` with one shard per available CPU.
    ///
    /// # Examples
    ///
    /// ```
    /// use swissmap::ShardedMap;
    /// let map: ShardedMap<&str, i32> = ShardedMap::new();
    /// ```
    pub fn new() -> ShardedMap<K, V> {
        ShardedMap::builder().build()
    }

    /// Creates an empty `ShardedMap` that can hold roughly `capacity` entries before any
    /// shard rehashes.
    pub fn with_capacity(capacity: usize) -> ShardedMap<K, V> {
        ShardedMap::builder().capacity(capacity).build()
    }

    /// Creates an empty `ShardedMap` with the given number of shards.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is zero.
    pub fn with_shards(shards: usize) -> ShardedMap<K, V> {
        ShardedMap::builder().shards(shards).build()
    }

    /// Returns a builder for a `ShardedMap`.
    ///
    /// The builder can be used for more complex configuration, such as the number of
    /// shards or the group matching strategy.
    pub fn builder() -> ShardedMapBuilder<K, V> {
        ShardedMapBuilder {
            hasher: SeededState::new(),
            capacity: 0,
            shards: raw::available_parallelism(),
            match_mode: MatchMode::default(),
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> Default for ShardedMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        ShardedMap::with_hasher(S::default())
    }
}

impl<K, V, S> ShardedMap<K, V, S> {
    /// Creates an empty `ShardedMap` which will use the given hash builder to hash keys.
    pub fn with_hasher(hasher: S) -> ShardedMap<K, V, S> {
        ShardedMap::with_capacity_and_hasher(0, hasher)
    }

    /// Creates an empty `ShardedMap` with at least the specified capacity, using
    /// `hasher` to hash the keys.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> ShardedMap<K, V, S> {
        ShardedMapBuilder {
            hasher,
            capacity,
            shards: raw::available_parallelism(),
            match_mode: MatchMode::default(),
            _kv: PhantomData,
        }
        .build()
    }

    /// Returns the number of shards.
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns a reference to the map's [`BuildHasher`].
    #[inline]
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Returns the number of entries in the map.
    ///
    /// Shards are counted one at a time, so with concurrent writers the result is not a
    /// snapshot of any single instant. It is exact when there are no concurrent writers.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read_recursive().len()).sum()
    }

    /// Returns `true` if the map contains no entries.
    ///
    /// Subject to the same relaxation as [`len`](ShardedMap::len).
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read_recursive().is_empty())
    }

    /// Returns the total number of entries that can be inserted before every shard has
    /// rehashed.
    pub fn capacity(&self) -> usize {
        self.shards.iter().map(|shard| shard.read_recursive().capacity()).sum()
    }

    /// Removes every entry from the map.
    ///
    /// Shards are cleared one at a time. Entries inserted into an already cleared shard
    /// while `clear` is running are kept.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.write().clear();
        }
    }

    /// Retains only the entries for which `f` returns `true`, one shard at a time.
    pub fn retain<F>(&self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        for shard in self.shards.iter() {
            shard.write().retain(&mut f);
        }
    }

    /// Calls `f` on every entry until it returns [`ControlFlow::Break`], returning `true`
    /// if every entry was visited.
    ///
    /// Shards are visited in order, and each shard's read lock is held only while that
    /// shard is being visited. A break stops the iteration, including any shards not
    /// yet visited.
    ///
    /// Entries that are present for the whole iteration and not modified concurrently
    /// are visited exactly once. Concurrent insertions and removals may or may not be
    /// observed.
    ///
    /// `f` may read any key, including keys in the shard being visited. It may write keys
    /// in other shards, but must not write to the shard being visited, which would
    /// deadlock.
    pub fn iterate<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&K, &V) -> ControlFlow<()>,
    {
        for shard in self.shards.iter() {
            if !shard.read_recursive().iterate(&mut f) {
                return false;
            }
        }

        true
    }

    // Returns the shard for the given hash.
    //
    // Uses the low 32 bits of the hash, the tables place entries using the high bits.
    #[inline]
    fn shard(&self, hash: u64) -> &RwLock<raw::Table<K, V>> {
        &self.shards[shard_for(hash, self.shards.len())]
    }
}

// Maps a hash onto `0..shards` with a multiply-shift.
#[inline]
fn shard_for(hash: u64, shards: usize) -> usize {
    (((hash as u32) as u64 * shards as u64) >> 32) as usize
}

impl<K, V, S> ShardedMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns the index of the shard holding the given key.
    ///
    /// The shard of a key never changes for the lifetime of the map.
    #[inline]
    pub fn shard_index<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + ?Sized,
    {
        shard_for(self.hasher.hash_one(key), self.shards.len())
    }

    /// Returns a clone of the value corresponding to the key.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get_with(key, V::clone)
    }

    /// Calls `f` with the value corresponding to the key while holding the shard's read
    /// lock, returning its result.
    #[inline]
    pub fn get_with<Q, F, R>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> R,
    {
        let hash = self.hasher.hash_one(key);
        let table = self.shard(hash).read_recursive();
        table.find(hash, |k| k.borrow() == key).map(|(_, v)| f(v))
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_with(key, |_| ()).is_some()
    }

    /// Inserts a key-value pair into the map, returning the previous value for the key.
    #[inline]
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let hash = self.hasher.hash_one(&key);
        let mut table = self.shard(hash).write();
        table.insert(hash, key, value, |k| self.hasher.hash_one(k))
    }

    /// Calls `f` with a mutable reference to the value corresponding to the key while
    /// holding the shard's write lock, returning its result.
    ///
    /// Returns `None` if the key is not present.
    #[inline]
    pub fn update<Q, F, R>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&mut V) -> R,
    {
        let hash = self.hasher.hash_one(key);
        let mut table = self.shard(hash).write();
        table.find_mut(hash, |k| k.borrow() == key).map(|(_, v)| f(v))
    }

    /// Returns a clone of the value for the key, inserting the result of `make` first if
    /// the key is not present.
    ///
    /// `make` is called at most once, under the shard's write lock.
    #[inline]
    pub fn get_or_insert_with<F>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> V,
        V: Clone,
    {
        let hash = self.hasher.hash_one(&key);
        let mut table = self.shard(hash).write();
        table
            .get_or_insert_with(hash, key, make, |k| self.hasher.hash_one(k))
            .clone()
    }

    /// Removes a key from the map, returning the value at the key if the key was
    /// previously in the map.
    #[inline]
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key from the map, returning the stored key and value if the key was
    /// previously in the map.
    #[inline]
    pub fn remove_entry<Q>(&self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let mut table = self.shard(hash).write();
        table.remove(hash, |k| k.borrow() == key)
    }
}

impl<K, V, S> fmt::Debug for ShardedMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.iterate(|key, value| {
            map.entry(key, value);
            ControlFlow::Continue(())
        });
        map.finish()
    }
}

impl<K, V, S> Extend<(K, V)> for &ShardedMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for ShardedMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let map = ShardedMap::with_capacity_and_hasher(iter.size_hint().0, S::default());
        let mut target = &map;
        target.extend(iter);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_for_in_range() {
        for shards in [1, 2, 3, 8, 13, 64] {
            assert_eq!(shard_for(0, shards), 0);
            assert_eq!(shard_for(u32::MAX as u64, shards), shards - 1);

            // The high bits never influence the shard.
            assert_eq!(shard_for(0xffff_ffff_0000_0000, shards), 0);
        }
    }

    #[test]
    fn zero_shards_is_an_error() {
        let err = ShardedMap::<u64, u64>::builder().shards(0).try_build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidShardCount(0));
    }

    #[test]
    fn capacity_overflow_is_an_error() {
        let err = ShardedMap::<u64, u64>::builder()
            .shards(1)
            .capacity(usize::MAX)
            .try_build()
            .unwrap_err();
        assert_eq!(err, ConfigError::CapacityOverflow);
    }

    #[test]
    #[should_panic(expected = "invalid shard count")]
    fn zero_shards_panics() {
        let _ = ShardedMap::<u64, u64>::with_shards(0);
    }

    #[test]
    fn capacity_split_across_shards() {
        let map: ShardedMap<u64, u64> = ShardedMap::builder().shards(4).capacity(1000).build();
        assert!(map.capacity() >= 1000);
        assert!(map.is_empty());
    }
}
