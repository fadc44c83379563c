use std::fmt;
use std::sync::OnceLock;

/// The number of slots in a group.
pub const GROUP_WIDTH: usize = 16;

/// The maximum number of resident slots per group before the table rehashes.
pub const MAX_LOAD: usize = 14;

// Control byte states.
pub mod ctrl {
    /// The slot has never been written, or was reset by a delete.
    pub const EMPTY: u8 = 0b1000_0000;

    /// The slot was deleted but must stay non-empty to keep probe sequences intact.
    pub const TOMBSTONE: u8 = 0b1111_1110;

    /// Mask for the 7-bit tag of an occupied slot.
    pub const TAG: u8 = 0b0111_1111;

    // Returns true if the control byte marks a live entry.
    #[inline]
    pub fn is_full(byte: u8) -> bool {
        byte & EMPTY == 0
    }
}

/// The control bytes of a group.
///
/// Aligned so the SIMD matcher can load the whole group at once.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C, align(16))]
pub struct Control(pub [u8; GROUP_WIDTH]);

impl Control {
    pub const EMPTY: Control = Control([ctrl::EMPTY; GROUP_WIDTH]);

    // The group as two little-endian words.
    #[inline]
    fn words(&self) -> [u64; 2] {
        let mut lo = [0; 8];
        let mut hi = [0; 8];
        lo.copy_from_slice(&self.0[..8]);
        hi.copy_from_slice(&self.0[8..]);
        [u64::from_le_bytes(lo), u64::from_le_bytes(hi)]
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|b| match *b {
                ctrl::EMPTY => "EMPTY".to_owned(),
                ctrl::TOMBSTONE => "TOMB".to_owned(),
                tag => format!("{tag:#04x}"),
            }))
            .finish()
    }
}

/// A set of slot positions within a group, bit `i` standing for slot `i`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitMask(pub u16);

impl BitMask {
    #[inline]
    pub fn any_set(self) -> bool {
        self.0 != 0
    }

    /// Returns the lowest set slot and the mask with that bit cleared.
    #[inline]
    pub fn next_match(self) -> Option<(usize, BitMask)> {
        if self.0 == 0 {
            return None;
        }

        let slot = self.0.trailing_zeros() as usize;
        Some((slot, BitMask(self.0 & (self.0 - 1))))
    }

    #[inline]
    pub fn lowest(self) -> Option<usize> {
        self.next_match().map(|(slot, _)| slot)
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let (slot, rest) = self.next_match()?;
        *self = rest;
        Some(slot)
    }
}

/// Which group matcher to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Use SIMD comparisons if the CPU supports them, and the portable word-at-a-time
    /// matcher otherwise.
    #[default]
    Detect,

    /// Always use the portable word-at-a-time matcher.
    Portable,

    /// Compare control bytes one at a time.
    Scalar,
}

/// CPU features relevant to group matching, detected once per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub sse2: bool,
}

impl Capabilities {
    /// Returns the capabilities of the current CPU.
    pub fn get() -> Capabilities {
        static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

        *CAPABILITIES.get_or_init(|| {
            let capabilities = Capabilities::detect();
            log::debug!("detected group matching capabilities: {capabilities:?}");
            capabilities
        })
    }

    #[cfg(target_arch = "x86_64")]
    fn detect() -> Capabilities {
        Capabilities {
            sse2: std::arch::is_x86_feature_detected!("sse2"),
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn detect() -> Capabilities {
        Capabilities { sse2: false }
    }
}

/// A resolved group matcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Matcher {
    Scalar,
    Swar,
    #[cfg(target_arch = "x86_64")]
    Sse2,
}

impl Matcher {
    /// Resolve a matcher for the given mode.
    pub fn new(mode: MatchMode) -> Matcher {
        match mode {
            MatchMode::Scalar => Matcher::Scalar,
            MatchMode::Portable => Matcher::Swar,
            #[cfg(target_arch = "x86_64")]
            MatchMode::Detect if Capabilities::get().sse2 => Matcher::Sse2,
            MatchMode::Detect => Matcher::Swar,
        }
    }

    /// Returns the slots whose control byte equals `tag`.
    #[inline]
    pub fn match_tag(self, control: &Control, tag: u8) -> BitMask {
        match self {
            Matcher::Scalar => scalar::match_byte(control, tag),
            Matcher::Swar => swar::match_byte(control, tag),
            #[cfg(target_arch = "x86_64")]
            Matcher::Sse2 => super::x86_64::match_byte(control, tag),
        }
    }

    /// Returns the slots that are `EMPTY`.
    #[inline]
    pub fn match_empty(self, control: &Control) -> BitMask {
        self.match_tag(control, ctrl::EMPTY)
    }

    /// Returns the slots holding a live entry.
    #[inline]
    pub fn match_full(self, control: &Control) -> BitMask {
        let mut mask = 0;
        for (i, byte) in control.0.iter().enumerate() {
            mask |= (ctrl::is_full(*byte) as u16) << i;
        }
        BitMask(mask)
    }
}

// Byte-by-byte reference matcher.
pub mod scalar {
    use super::{BitMask, Control};

    #[inline]
    pub fn match_byte(control: &Control, byte: u8) -> BitMask {
        let mut mask = 0;
        for (i, b) in control.0.iter().enumerate() {
            if *b == byte {
                mask |= 1 << i;
            }
        }
        BitMask(mask)
    }
}

// SIMD-within-a-register matcher, eight control bytes per word.
pub mod swar {
    use super::{BitMask, Control};

    #[inline]
    fn repeat(b: u8) -> u64 {
        u64::from_ne_bytes([b; 8])
    }

    /// Returns a mask with the high bit of every byte of `word` equal to `byte` set.
    ///
    /// Unlike the classic `(x - 0x01) & !x & 0x80` trick this never reports a false
    /// positive: the low seven bits are summed without crossing into the next byte.
    #[inline]
    pub fn match_word(word: u64, byte: u8) -> u64 {
        let cmp = word ^ repeat(byte);
        let low = (cmp & repeat(0x7f)).wrapping_add(repeat(0x7f));
        !(low | cmp) & repeat(0x80)
    }

    /// Packs the per-byte high bits of `word` into the low eight bits.
    #[inline]
    pub fn compress(word: u64) -> u8 {
        ((word >> 7).wrapping_mul(0x0102_0408_1020_4080) >> 56) as u8
    }

    #[inline]
    pub fn match_byte_8(word: u64, byte: u8) -> u8 {
        compress(match_word(word, byte))
    }

    #[inline]
    pub fn match_byte(control: &Control, byte: u8) -> BitMask {
        let [lo, hi] = control.words();
        let lo = match_byte_8(lo, byte) as u16;
        let hi = match_byte_8(hi, byte) as u16;
        BitMask(lo | (hi << 8))
    }
}

/// A group of slots and their control bytes.
pub struct Group<K, V> {
    pub control: Control,
    pub slots: [Option<(K, V)>; GROUP_WIDTH],
}

impl<K, V> Group<K, V> {
    pub fn new() -> Group<K, V> {
        Group {
            control: Control::EMPTY,
            slots: std::array::from_fn(|_| None),
        }
    }

    // Reset every slot to empty, dropping any entries.
    pub fn clear(&mut self) {
        self.control = Control::EMPTY;
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }
}
