use std::arch::x86_64;

use super::group::{BitMask, Control};

// Compares all sixteen control bytes against `byte` with a single SSE2 comparison.
//
// Only reachable through `Matcher::Sse2`, which is selected after runtime detection.
#[inline]
pub fn match_byte(control: &Control, byte: u8) -> BitMask {
    // Safety: `Matcher::Sse2` is only constructed when SSE2 support was detected, and
    // `Control` is a 16-byte aligned array of exactly sixteen bytes.
    unsafe { match_byte_sse2(control, byte) }
}

#[target_feature(enable = "sse2")]
unsafe fn match_byte_sse2(control: &Control, byte: u8) -> BitMask {
    unsafe {
        let group = x86_64::_mm_load_si128(control.0.as_ptr().cast::<x86_64::__m128i>());
        let cmp = x86_64::_mm_cmpeq_epi8(group, x86_64::_mm_set1_epi8(byte as i8));
        BitMask(x86_64::_mm_movemask_epi8(cmp) as u16)
    }
}
