// ABOUTME: Pure source-to-local timing math used by pre-roll and egress
// ABOUTME: Release instants, sync error, and the ±1-sample correction choice

use crate::sync::clock::{frames_to_ticks, ticks_to_frames, FpTime};
use crate::sync::Anchor;

/// Frames the output queue must hold before a correction is allowed; below
/// this there is not enough runway to splice safely.
pub const DAC_QUEUE_MINIMUM: i64 = 5000;

/// The local instant at which the very first packet of a play segment should
/// reach the listener: the anchor instant plus the packet's distance from the
/// anchor timestamp plus the requested latency, all in frames.
pub fn first_packet_time_to_play(
    anchor: &Anchor,
    first_packet_timestamp: u32,
    latency: i64,
    backend_latency_offset: i64,
) -> FpTime {
    let delta = first_packet_timestamp as i64 - anchor.media_timestamp as i64;
    anchor
        .local_time
        .saturating_add_ticks(frames_to_ticks(delta + latency + backend_latency_offset))
}

/// The local instant at which a running packet becomes due for release to
/// the sink. The desired sink queue length is subtracted so the sink buffer
/// itself absorbs that much of the latency budget.
pub fn time_to_play(
    anchor: &Anchor,
    packet_timestamp: u32,
    latency: i64,
    backend_latency_offset: i64,
    backend_buffer_desired_length: i64,
) -> FpTime {
    let delta = packet_timestamp as i64 - anchor.media_timestamp as i64;
    let net_offset = delta + latency + backend_latency_offset - backend_buffer_desired_length;
    anchor
        .local_time
        .saturating_add_ticks(frames_to_ticks(net_offset))
}

/// Timing error, in frames, for the next frame the DAC will play.
///
/// Positive means the stream is running ahead of where the anchor says it
/// should be (a frame must eventually be inserted to delay it); negative
/// means it is late.
pub fn sync_error_frames(
    now: FpTime,
    anchor: &Anchor,
    frame_timestamp: u32,
    current_delay: i64,
    latency: i64,
) -> i64 {
    let td_in_frames = ticks_to_frames(now.ticks_since(anchor.local_time));
    let delay =
        td_in_frames + anchor.media_timestamp as i64 - (frame_timestamp as i64 - current_delay);
    delay - latency
}

/// The ±1-sample correction for a given sync error.
///
/// No correction below the tolerance, and none at all while the output
/// queue is too short to splice into.
pub fn choose_correction(sync_error: i64, tolerance: i64, current_delay: i64) -> i32 {
    let mut amount = 0;
    if sync_error > tolerance {
        amount = -1;
    }
    if sync_error < -tolerance {
        amount = 1;
    }
    if current_delay < DAC_QUEUE_MINIMUM {
        amount = 0;
    }
    amount
}
