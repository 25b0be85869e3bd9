// ABOUTME: Wrap-safe arithmetic over 16-bit sequence numbers and 32-bit timestamps
// ABOUTME: Ordering is relative to a moving origin (the read cursor)

use std::fmt;

/// 16-bit wrapping packet sequence number.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SeqNum(pub u16);

impl SeqNum {
    /// The next sequence number, wrapping at 2^16.
    #[inline]
    pub fn successor(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// The previous sequence number, wrapping at 2^16.
    #[inline]
    pub fn predecessor(self) -> Self {
        Self(self.0.wrapping_sub(1))
    }

    /// The sequence number `n` after this one, wrapping at 2^16.
    #[inline]
    pub fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distance of `x` up from `origin`, taking wrap into account.
///
/// The raw modular distance lands in `[0, 65535]`; anything at or above
/// 32767 is assumed to be a positive alias of a number before the origin
/// and has 65536 subtracted. The caller must hold the lock that protects
/// the origin cursor while using the result.
#[inline]
pub fn ordinate(origin: SeqNum, x: SeqNum) -> i32 {
    let p = x.0 as i32;
    let q = origin.0 as i32;
    let mut t = (p + 0x10000 - q) & 0xffff;
    if t >= 32767 {
        t -= 65536;
    }
    t
}

/// True if `b` is strictly after `a`, measured from `origin`.
#[inline]
pub fn after(origin: SeqNum, a: SeqNum, b: SeqNum) -> bool {
    ordinate(origin, b) - ordinate(origin, a) > 0
}

/// True if the 32-bit media timestamp `b` is strictly after `a`.
///
/// Assumes the gap between neighbouring timestamps never reaches 2^31:
/// the high bit of the wrapped difference then distinguishes before from
/// after.
#[inline]
pub fn ts_after(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) & 0x8000_0000 == 0
}
