use super::group::ctrl;

// The number of high hash bits used to choose a starting group.
const H1_BITS: u32 = 57;

// Returns the probe seed, the high 57 bits of the hash.
#[inline]
pub fn h1(hash: u64) -> u64 {
    hash >> (u64::BITS - H1_BITS)
}

// Returns the 7-bit tag stored in the control byte of an occupied slot.
#[inline]
pub fn h2(hash: u64) -> u8 {
    (hash as u8) & ctrl::TAG
}

// Maps `h1` onto `0..groups` with a multiply-shift instead of a division.
//
// `h1` is uniform over `0..2^57`, so the result is uniform over the groups.
#[inline]
pub fn reduce(h1: u64, groups: usize) -> usize {
    ((h1 as u128 * groups as u128) >> H1_BITS) as usize
}

// A linear probe sequence over groups.
//
// Visits every group exactly once, starting at the group chosen by `h1` and wrapping
// around at the end of the table.
#[derive(Clone, Debug)]
pub struct Probe {
    // The current group.
    pub group: usize,
    // The number of groups visited so far.
    pub len: usize,
    // The number of groups in the table.
    groups: usize,
}

impl Probe {
    // Initialize the probe sequence for the given hash.
    #[inline]
    pub fn start(hash: u64, groups: usize) -> Probe {
        debug_assert!(groups > 0);

        Probe {
            group: reduce(h1(hash), groups),
            len: 0,
            groups,
        }
    }

    // Initialize a probe sequence starting at the given group.
    #[inline]
    pub fn at(group: usize, groups: usize) -> Probe {
        Probe {
            group,
            len: 0,
            groups,
        }
    }

    // Returns true if every group has been visited.
    #[inline]
    pub fn exhausted(&self) -> bool {
        self.len >= self.groups
    }

    // Increment the probe sequence.
    #[inline]
    pub fn next(&mut self) {
        self.len += 1;
        self.group += 1;

        if self.group == self.groups {
            self.group = 0;
        }
    }
}
