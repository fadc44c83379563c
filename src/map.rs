use crate::hash::SeededState;
use crate::raw::{self, MatchMode};

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ops::ControlFlow;

/// A single-threaded swiss table.
///
/// Keys are placed in groups of sixteen slots, each with a control byte holding a 7-bit
/// tag of the key's hash. Lookups compare a whole group of control bytes at once and
/// only compare full keys on a tag match.
///
/// # Examples
///
/// ```
/// use swissmap::SwissMap;
///
/// let mut map = SwissMap::new();
/// map.insert("a", 1);
/// map.insert("b", 2);
///
/// assert_eq!(map.get("a"), Some(&1));
/// assert_eq!(map.remove("b"), Some(2));
/// assert_eq!(map.len(), 1);
/// ```
pub struct SwissMap<K, V, S = SeededState> {
    table: raw::Table<K, V>,
    hasher: S,
}

/// A builder for a [`SwissMap`].
///
/// # Examples
///
/// ```rust
/// use swissmap::{MatchMode, SeededState, SwissMap};
///
/// let map: SwissMap<u64, u64> = SwissMap::builder()
///     // Set the initial capacity.
///     .capacity(1024)
///     // Set the hasher.
///     .hasher(SeededState::with_seed(42))
///     // Force the portable group matcher.
///     .match_mode(MatchMode::Portable)
///     // Construct the map.
///     .build();
/// ```
pub struct SwissMapBuilder<K, V, S = SeededState> {
    hasher: S,
    capacity: usize,
    match_mode: MatchMode,
    _kv: PhantomData<(K, V)>,
}

impl<K, V> SwissMapBuilder<K, V> {
    /// Set the hash builder used to hash keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow maps to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    pub fn hasher<S>(self, hasher: S) -> SwissMapBuilder<K, V, S> {
        SwissMapBuilder {
            hasher,
            capacity: self.capacity,
            match_mode: self.match_mode,
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> SwissMapBuilder<K, V, S> {
    /// Set the initial capacity of the map.
    ///
    /// The map will hold at least `capacity` entries before rehashing.
    pub fn capacity(self, capacity: usize) -> SwissMapBuilder<K, V, S> {
        SwissMapBuilder { capacity, ..self }
    }

    /// Set the group matching strategy. See [`MatchMode`] for details.
    pub fn match_mode(self, match_mode: MatchMode) -> SwissMapBuilder<K, V, S> {
        SwissMapBuilder { match_mode, ..self }
    }

    /// Construct a [`SwissMap`] from the builder, using the configured options.
    ///
    /// # Panics
    ///
    /// Panics if the capacity overflows.
    pub fn build(self) -> SwissMap<K, V, S> {
        let groups = raw::groups_for(self.capacity).expect("capacity overflow");

        SwissMap {
            table: raw::Table::new(groups, self.match_mode),
            hasher: self.hasher,
        }
    }
}

impl<K, V, S> fmt::Debug for SwissMapBuilder<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwissMapBuilder")
            .field("capacity", &self.capacity)
            .field("match_mode", &self.match_mode)
            .finish()
    }
}

impl<K, V> SwissMap<K, V> {
    /// Creates an empty `SwissMap`.
    ///
    /// # Examples
    ///
    /// ```
    /// use swissmap::SwissMap;
    /// let map: SwissMap<&str, i32> = SwissMap::new();
    /// ```
    pub fn new() -> SwissMap<K, V> {
        SwissMap::with_capacity_and_hasher(0, SeededState::new())
    }

    /// Creates an empty `SwissMap` that can hold at least `capacity` entries without
    /// rehashing.
    pub fn with_capacity(capacity: usize) -> SwissMap<K, V> {
        SwissMap::with_capacity_and_hasher(capacity, SeededState::new())
    }

    /// Returns a builder for a `SwissMap`.
    pub fn builder() -> SwissMapBuilder<K, V> {
        SwissMapBuilder {
            hasher: SeededState::new(),
            capacity: 0,
            match_mode: MatchMode::default(),
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> Default for SwissMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        SwissMap::with_hasher(S::default())
    }
}

impl<K, V, S> SwissMap<K, V, S> {
    /// Creates an empty `SwissMap` which will use the given hash builder to hash keys.
    pub fn with_hasher(hasher: S) -> SwissMap<K, V, S> {
        SwissMap::with_capacity_and_hasher(0, hasher)
    }

    /// Creates an empty `SwissMap` with at least the specified capacity, using `hasher`
    /// to hash the keys.
    ///
    /// # Panics
    ///
    /// Panics if the capacity overflows.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> SwissMap<K, V, S> {
        let groups = raw::groups_for(capacity).expect("capacity overflow");

        SwissMap {
            table: raw::Table::new(groups, MatchMode::default()),
            hasher,
        }
    }

    /// Returns the number of entries in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of entries that can be inserted before the map rehashes.
    ///
    /// Deleted entries that left a tombstone behind keep consuming capacity until the
    /// next rehash, so `len() + capacity()` is `group_count() * MAX_LOAD` minus the
    /// number of tombstones.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the number of slot groups currently allocated.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.table.group_count()
    }

    /// Returns the number of tombstones left by deletions since the last rehash.
    #[inline]
    pub fn tombstones(&self) -> usize {
        self.table.tombstones()
    }

    /// Returns a reference to the map's [`BuildHasher`].
    #[inline]
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Removes every entry from the map.
    ///
    /// Large maps release their storage and return to their initial size.
    #[inline]
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Retains only the entries for which `f` returns `true`.
    ///
    /// Every entry is visited exactly once, in an unspecified order.
    #[inline]
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.table.retain(f);
    }

    /// An iterator visiting all key-value pairs in arbitrary order.
    ///
    /// The iteration starts from a random position, so repeated iterations over the same
    /// map may yield entries in different orders.
    #[inline]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            raw: self.table.iter(),
        }
    }

    /// An iterator visiting all keys in arbitrary order.
    #[inline]
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { iter: self.iter() }
    }

    /// An iterator visiting all values in arbitrary order.
    #[inline]
    pub fn values(&self) -> Values<'_, K, V> {
        Values { iter: self.iter() }
    }

    /// Calls `f` on every entry until it returns [`ControlFlow::Break`].
    ///
    /// Returns `true` if every entry was visited.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::ops::ControlFlow;
    /// use swissmap::SwissMap;
    ///
    /// let map: SwissMap<i32, i32> = (0..10).map(|i| (i, i)).collect();
    ///
    /// let mut seen = 0;
    /// let complete = map.iterate(|_, _| {
    ///     seen += 1;
    ///     if seen == 3 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
    /// });
    ///
    /// assert!(!complete);
    /// assert_eq!(seen, 3);
    /// ```
    #[inline]
    pub fn iterate<F>(&self, f: F) -> bool
    where
        F: FnMut(&K, &V) -> ControlFlow<()>,
    {
        self.table.iterate(f)
    }
}

impl<K, V, S> SwissMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns a reference to the value corresponding to the key.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Returns the key-value pair corresponding to the supplied key.
    #[inline]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        self.table.find(hash, |k| k.borrow() == key)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        self.table.find_mut(hash, |k| k.borrow() == key).map(|(_, v)| v)
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).is_some()
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map did not have this key present, [`None`] is returned. Otherwise the
    /// value is updated in place, and the old value is returned.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hasher.hash_one(&key);
        let hasher = &self.hasher;
        self.table.insert(hash, key, value, |k| hasher.hash_one(k))
    }

    /// Returns a mutable reference to the value for the key, inserting the result of `f`
    /// if the key is not present.
    #[inline]
    pub fn get_or_insert_with<F>(&mut self, key: K, f: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let hash = self.hasher.hash_one(&key);
        let hasher = &self.hasher;
        self.table.get_or_insert_with(hash, key, f, |k| hasher.hash_one(k))
    }

    /// Removes a key from the map, returning the value at the key if the key was
    /// previously in the map.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key from the map, returning the stored key and value if the key was
    /// previously in the map.
    #[inline]
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        self.table.remove(hash, |k| k.borrow() == key)
    }

    /// Reserves capacity for at least `additional` more entries.
    ///
    /// # Panics
    ///
    /// Panics if the new capacity overflows.
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        let hasher = &self.hasher;
        self.table.reserve(additional, |k| hasher.hash_one(k));
    }
}

impl<K, V, S> fmt::Debug for SwissMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> PartialEq for SwissMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|v| *value == *v))
    }
}

impl<K, V, S> Eq for SwissMap<K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S> Extend<(K, V)> for SwissMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let iter = iter.into_iter();

        // Reserve for the lower bound only, keys may be duplicates.
        self.reserve(iter.size_hint().0);

        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<'a, K, V, S> Extend<(&'a K, &'a V)> for SwissMap<K, V, S>
where
    K: Copy + Hash + Eq,
    V: Copy,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        self.extend(iter.into_iter().map(|(&k, &v)| (k, v)));
    }
}

impl<K, V, S> FromIterator<(K, V)> for SwissMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = SwissMap::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for SwissMap<K, V>
where
    K: Hash + Eq,
{
    fn from(arr: [(K, V); N]) -> Self {
        SwissMap::from_iter(arr)
    }
}

impl<'a, K, V, S> IntoIterator for &'a SwissMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over a map's entries.
///
/// This struct is created by the [`iter`](SwissMap::iter) method on [`SwissMap`]. See its
/// documentation for details.
pub struct Iter<'a, K, V> {
    raw: raw::Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            raw: self.raw.clone(),
        }
    }
}

impl<K, V> fmt::Debug for Iter<'_, K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

/// An iterator over a map's keys.
///
/// This struct is created by the [`keys`](SwissMap::keys) method on [`SwissMap`]. See its
/// documentation for details.
pub struct Keys<'a, K, V> {
    iter: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (key, _) = self.iter.next()?;
        Some(key)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

/// An iterator over a map's values.
///
/// This struct is created by the [`values`](SwissMap::values) method on [`SwissMap`]. See its
/// documentation for details.
pub struct Values<'a, K, V> {
    iter: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (_, value) = self.iter.next()?;
        Some(value)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
