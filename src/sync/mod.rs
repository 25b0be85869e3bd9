// ABOUTME: Clock representation and source-to-local timing for the player
// ABOUTME: Fixed-point local time, timing anchors, and release-instant math

/// Timing-anchor contract
pub mod anchor;
/// Fixed-point local time and the monotonic clock
pub mod clock;
/// Pure timing math: release instants, sync error, correction choice
pub mod timing;

pub use anchor::{Anchor, AnchorSource};
pub use clock::{FpTime, MonotonicClock};
