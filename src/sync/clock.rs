// ABOUTME: 32.32 fixed-point local time and the monotonic clock behind it
// ABOUTME: Converts between fixed-point instants, frame counts, and Instant

use std::time::{Duration, Instant};

use crate::audio::NOMINAL_SAMPLE_RATE;

/// Local time as a 64-bit fixed-point value: seconds in the upper 32 bits,
/// binary fraction in the lower 32.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FpTime(pub u64);

impl FpTime {
    /// Whole seconds.
    #[inline]
    pub fn as_secs(self) -> u64 {
        self.0 >> 32
    }

    /// A fixed-point value of whole seconds.
    #[inline]
    pub fn from_secs(secs: u64) -> Self {
        Self(secs << 32)
    }

    /// Add a signed fixed-point tick count, saturating at the range ends.
    #[inline]
    pub fn saturating_add_ticks(self, ticks: i64) -> Self {
        Self(self.0.saturating_add_signed(ticks))
    }

    /// Signed fixed-point distance from `earlier` to `self`.
    #[inline]
    pub fn ticks_since(self, earlier: FpTime) -> i64 {
        self.0.wrapping_sub(earlier.0) as i64
    }
}

/// Fixed-point ticks covering `frames` sample frames at the nominal source
/// rate. Signed and saturating; exact shifts otherwise.
#[inline]
pub fn frames_to_ticks(frames: i64) -> i64 {
    let ticks = ((frames as i128) << 32) / NOMINAL_SAMPLE_RATE as i128;
    ticks.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Whole sample frames covered by a signed fixed-point tick count, rounded
/// towards zero.
#[inline]
pub fn ticks_to_frames(ticks: i64) -> i64 {
    if ticks >= 0 {
        ((ticks as i128 * NOMINAL_SAMPLE_RATE as i128) >> 32) as i64
    } else {
        -((-(ticks as i128) * NOMINAL_SAMPLE_RATE as i128) >> 32) as i64
    }
}

/// Monotonic wall clock producing [`FpTime`] readings.
///
/// Condvar wake-up deadlines are derived from the same `Instant` origin the
/// readings come from, so timed waits and timestamp arithmetic can never
/// disagree about what "now" means.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock with its origin at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// The current fixed-point time.
    pub fn now(&self) -> FpTime {
        let elapsed = self.origin.elapsed();
        let secs = elapsed.as_secs();
        let frac = ((elapsed.subsec_nanos() as u64) << 32) / 1_000_000_000;
        FpTime((secs << 32) | frac)
    }

    /// The `Instant` corresponding to a fixed-point reading of this clock.
    pub fn instant_at(&self, t: FpTime) -> Instant {
        let secs = t.as_secs();
        let nanos = ((t.0 & 0xffff_ffff) * 1_000_000_000) >> 32;
        self.origin + Duration::new(secs, nanos as u32)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
