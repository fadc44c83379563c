use std::fmt;
use std::iter::FusedIterator;
use std::mem;
use std::ops::ControlFlow;

use rand::Rng;

use super::group::{ctrl, BitMask, Group, MatchMode, Matcher, MAX_LOAD};
use super::probe::{self, Probe};

/// Tables with more groups than this release their storage on `clear`.
const SHRINK_THRESHOLD: usize = 64;

// Returns the number of groups needed to hold `capacity` entries without rehashing.
pub fn groups_for(capacity: usize) -> Option<usize> {
    Some(capacity.checked_add(MAX_LOAD - 1)? / MAX_LOAD).map(|groups| groups.max(1))
}

/// A single-threaded swiss table.
///
/// The table does not hash keys itself. Every operation takes the precomputed hash of
/// the key along with an equality predicate, and operations that may rehash take a
/// hasher to recompute the hashes of existing entries.
pub struct Table<K, V> {
    /// The groups of the table. Never empty.
    groups: Box<[Group<K, V>]>,

    /// The number of non-empty slots, including tombstones.
    resident: usize,

    /// The number of tombstones.
    dead: usize,

    /// The number of resident slots at which the table rehashes.
    limit: usize,

    /// The number of groups the table was created with.
    ///
    /// `clear` never shrinks the table below this size.
    initial_groups: usize,

    /// The group matcher, resolved once at construction.
    matcher: Matcher,

    /// The number of entries moved by rehashing.
    #[cfg(test)]
    moved: usize,
}

// The result of probing for a key.
enum Lookup {
    /// The key is present at the given group and slot.
    Occupied(usize, usize),

    /// The key is absent, and the given group and slot is the first empty slot in its
    /// probe sequence.
    Vacant(usize, usize),

    /// Every group was probed without finding the key or an empty slot.
    Exhausted,
}

impl<K, V> Table<K, V> {
    /// Creates a table with the given number of groups.
    pub fn new(groups: usize, mode: MatchMode) -> Table<K, V> {
        let groups = groups.max(1);

        Table {
            groups: alloc_groups(groups),
            resident: 0,
            dead: 0,
            limit: groups * MAX_LOAD,
            initial_groups: groups,
            matcher: Matcher::new(mode),
            #[cfg(test)]
            moved: 0,
        }
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.resident - self.dead
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of entries that can be inserted before the table rehashes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.limit - self.resident
    }

    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn tombstones(&self) -> usize {
        self.dead
    }

    /// Returns the entry for the key with the given hash.
    #[inline]
    pub fn find(&self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(&K, &V)> {
        match self.lookup(hash, eq) {
            Lookup::Occupied(g, s) => self.groups[g].slots[s].as_ref().map(|(k, v)| (k, v)),
            _ => None,
        }
    }

    /// Returns a mutable reference to the value for the key with the given hash.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(&K, &mut V)> {
        match self.lookup(hash, eq) {
            Lookup::Occupied(g, s) => self.groups[g].slots[s].as_mut().map(|(k, v)| (&*k, v)),
            _ => None,
        }
    }

    /// Inserts an entry, returning the previous value if the key was already present.
    pub fn insert(&mut self, hash: u64, key: K, value: V, hasher: impl Fn(&K) -> u64) -> Option<V>
    where
        K: Eq,
    {
        if self.resident >= self.limit {
            self.rehash(&hasher);
        }

        let (g, s) = loop {
            match self.lookup(hash, |k| *k == key) {
                // Overwrite the value in place.
                Lookup::Occupied(g, s) => {
                    return self.groups[g].slots[s]
                        .as_mut()
                        .map(|(_, current)| mem::replace(current, value));
                }
                Lookup::Vacant(g, s) => break (g, s),
                Lookup::Exhausted => self.rehash(&hasher),
            }
        };

        self.claim(g, s, probe::h2(hash), key, value);
        None
    }

    /// Returns the value for the key, inserting the result of `make` if it is absent.
    pub fn get_or_insert_with(
        &mut self,
        hash: u64,
        key: K,
        make: impl FnOnce() -> V,
        hasher: impl Fn(&K) -> u64,
    ) -> &mut V
    where
        K: Eq,
    {
        if self.resident >= self.limit {
            self.rehash(&hasher);
        }

        let (g, s) = loop {
            match self.lookup(hash, |k| *k == key) {
                // The existing entry is kept and `key` is dropped.
                Lookup::Occupied(g, s) => break (g, s),
                Lookup::Vacant(g, s) => {
                    self.claim(g, s, probe::h2(hash), key, make());
                    break (g, s);
                }
                Lookup::Exhausted => self.rehash(&hasher),
            }
        };

        match &mut self.groups[g].slots[s] {
            Some((_, value)) => value,
            None => unreachable!("slot {s} of group {g} is marked full"),
        }
    }

    /// Removes the entry for the key with the given hash.
    pub fn remove(&mut self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(K, V)> {
        match self.lookup(hash, eq) {
            Lookup::Occupied(g, s) => self.erase(g, s),
            _ => None,
        }
    }

    /// Retains only the entries for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        for g in 0..self.groups.len() {
            for s in self.matcher.match_full(&self.groups[g].control) {
                let keep = match &mut self.groups[g].slots[s] {
                    Some((key, value)) => f(key, value),
                    None => true,
                };

                if !keep {
                    self.erase(g, s);
                }
            }
        }
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        let groups = self.groups.len();

        if groups > SHRINK_THRESHOLD && groups > self.initial_groups {
            log::debug!(
                "shrinking table on clear: {groups} -> {} groups",
                self.initial_groups
            );

            self.groups = alloc_groups(self.initial_groups);
            self.limit = self.initial_groups * MAX_LOAD;
        } else {
            for group in self.groups.iter_mut() {
                group.clear();
            }
        }

        self.resident = 0;
        self.dead = 0;
    }

    /// Reserves capacity for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize, hasher: impl Fn(&K) -> u64) {
        if self.capacity() >= additional {
            return;
        }

        let needed = self.len().checked_add(additional).expect("capacity overflow");
        let groups = groups_for(needed).expect("capacity overflow");
        self.resize(groups.max(self.groups.len()), &hasher);
    }

    /// Returns an iterator over the entries of the table, starting at a random group.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let start = rand::thread_rng().gen_range(0..self.groups.len());
        Iter::new(self, start)
    }

    /// Visits every entry until `f` breaks, returning `true` if every entry was visited.
    pub fn iterate(&self, mut f: impl FnMut(&K, &V) -> ControlFlow<()>) -> bool {
        self.iter().all(|(key, value)| f(key, value).is_continue())
    }

    // Grows the table, or rebuilds it at the same size if it is mostly tombstones.
    fn rehash(&mut self, hasher: &dyn Fn(&K) -> u64) {
        let groups = self.groups.len();

        let next = if self.dead >= self.resident / 2 {
            groups
        } else {
            groups.checked_mul(2).expect("capacity overflow")
        };

        self.resize(next, hasher);
    }

    // Moves every live entry into a fresh set of groups.
    fn resize(&mut self, groups: usize, hasher: &dyn Fn(&K) -> u64) {
        log::debug!(
            "rehashing table: {} -> {groups} groups ({} live, {} tombstones)",
            self.groups.len(),
            self.len(),
            self.dead
        );

        let old = mem::replace(&mut self.groups, alloc_groups(groups));
        self.limit = groups * MAX_LOAD;
        self.resident = 0;
        self.dead = 0;

        for group in old.into_vec() {
            for (key, value) in group.slots.into_iter().flatten() {
                let hash = hasher(&key);
                self.insert_unique(hash, key, value, hasher);

                #[cfg(test)]
                {
                    self.moved += 1;
                }
            }
        }
    }

    // Inserts an entry known not to be in the table, into a table known to have room.
    fn insert_unique(&mut self, hash: u64, key: K, value: V, hasher: &dyn Fn(&K) -> u64) {
        let mut probe = Probe::start(hash, self.groups.len());

        while !probe.exhausted() {
            let group = &self.groups[probe.group];

            if let Some(s) = self.matcher.match_empty(&group.control).lowest() {
                self.claim(probe.group, s, probe::h2(hash), key, value);
                return;
            }

            probe.next();
        }

        // Unreachable while `resident < limit`, but stay correct regardless.
        let groups = self.groups.len().checked_mul(2).expect("capacity overflow");
        self.resize(groups, hasher);
        self.insert_unique(hash, key, value, hasher);
    }

    // Probes for the key, stopping at the first group containing an empty slot.
    #[inline]
    fn lookup(&self, hash: u64, mut eq: impl FnMut(&K) -> bool) -> Lookup {
        let h2 = probe::h2(hash);
        let mut probe = Probe::start(hash, self.groups.len());

        while !probe.exhausted() {
            let group = &self.groups[probe.group];

            // Tags may collide, compare the full key.
            for s in self.matcher.match_tag(&group.control, h2) {
                if let Some((key, _)) = &group.slots[s] {
                    if eq(key) {
                        return Lookup::Occupied(probe.group, s);
                    }
                }
            }

            // An empty slot ends every probe sequence that reaches this group, so the key
            // cannot be further along.
            if let Some(s) = self.matcher.match_empty(&group.control).lowest() {
                return Lookup::Vacant(probe.group, s);
            }

            probe.next();
        }

        Lookup::Exhausted
    }

    // Writes an entry into an empty slot.
    #[inline]
    fn claim(&mut self, g: usize, s: usize, h2: u8, key: K, value: V) {
        let group = &mut self.groups[g];
        debug_assert_eq!(group.control.0[s], ctrl::EMPTY);

        group.control.0[s] = h2;
        group.slots[s] = Some((key, value));
        self.resident += 1;
    }

    // Removes the entry at the given slot.
    fn erase(&mut self, g: usize, s: usize) -> Option<(K, V)> {
        let matcher = self.matcher;
        let group = &mut self.groups[g];
        let entry = group.slots[s].take();

        // If the group already has an empty slot no probe sequence depends on this slot
        // being full, so it can be reset to empty. Otherwise it must remain a tombstone.
        if matcher.match_empty(&group.control).any_set() {
            group.control.0[s] = ctrl::EMPTY;
            self.resident -= 1;
        } else {
            group.control.0[s] = ctrl::TOMBSTONE;
            self.dead += 1;
        }

        entry
    }
}

impl<K, V> fmt::Debug for Table<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("groups", &self.groups.len())
            .field("resident", &self.resident)
            .field("dead", &self.dead)
            .field("limit", &self.limit)
            .field("matcher", &self.matcher)
            .finish()
    }
}

fn alloc_groups<K, V>(groups: usize) -> Box<[Group<K, V>]> {
    (0..groups).map(|_| Group::new()).collect()
}

/// An iterator over the entries of a [`Table`].
///
/// Visits every group once, wrapping around from a starting group, and the slots of each
/// group in ascending order.
pub struct Iter<'a, K, V> {
    groups: &'a [Group<K, V>],
    probe: Probe,
    full: BitMask,
    remaining: usize,
    matcher: Matcher,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub fn new(table: &'a Table<K, V>, start: usize) -> Iter<'a, K, V> {
        let groups = &table.groups[..];
        let start = start % groups.len();

        Iter {
            groups,
            probe: Probe::at(start, groups.len()),
            full: table.matcher.match_full(&groups[start].control),
            remaining: table.len(),
            matcher: table.matcher,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == 0 {
                return None;
            }

            if let Some(s) = self.full.next() {
                if let Some((key, value)) = &self.groups[self.probe.group].slots[s] {
                    self.remaining -= 1;
                    return Some((key, value));
                }

                continue;
            }

            self.probe.next();
            if self.probe.exhausted() {
                return None;
            }

            self.full = self
                .matcher
                .match_full(&self.groups[self.probe.group].control);
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            groups: self.groups,
            probe: self.probe.clone(),
            full: self.full,
            remaining: self.remaining,
            matcher: self.matcher,
        }
    }
}

#[cfg(test)]
impl<K, V> Table<K, V> {
    // Checks the counters against the control bytes.
    fn check(&self) {
        let mut full = 0;
        let mut dead = 0;

        for group in self.groups.iter() {
            for (s, byte) in group.control.0.iter().enumerate() {
                match *byte {
                    ctrl::EMPTY => assert!(group.slots[s].is_none()),
                    ctrl::TOMBSTONE => {
                        assert!(group.slots[s].is_none());
                        dead += 1;
                    }
                    _ => {
                        assert!(group.slots[s].is_some());
                        full += 1;
                    }
                }
            }
        }

        assert_eq!(full, self.len());
        assert_eq!(dead, self.dead);
        assert!(self.resident <= self.limit);
        assert_eq!(self.limit, self.groups.len() * MAX_LOAD);
        assert!(self.groups.len() * super::group::GROUP_WIDTH > self.limit);
    }
}
