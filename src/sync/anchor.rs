// ABOUTME: Timing-anchor contract published by the timing channel
// ABOUTME: Pairs a source media timestamp with a local clock instant

use crate::sync::FpTime;

/// A timing anchor: the local instant at which the source frame carrying
/// `media_timestamp` was (or will be) current at the sender.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Anchor {
    /// Source media timestamp of the anchor point.
    pub media_timestamp: u32,
    /// Local fixed-point time of the anchor point.
    pub local_time: FpTime,
    /// Sender-side fixed-point time of the anchor point.
    pub remote_time: FpTime,
}

/// Provider of the most recent timing anchor.
///
/// The three anchor fields must be sampled together; the pair of reads is
/// not assumed atomic by the caller. `reference` is called on the audio
/// path, sometimes under the player's locks, and must return promptly
/// without calling back into the player.
pub trait AnchorSource: Send + Sync {
    /// The most recent anchor, or `None` before the first timing exchange.
    fn reference(&self) -> Option<Anchor>;
}
