// ABOUTME: Audio output sink contract
// ABOUTME: Platform drivers live outside the crate; missing capabilities are no-ops

use crate::audio::AudioParameters;
use crate::Result;

/// Output sink for interleaved signed 16-bit stereo PCM.
///
/// `play` is the only call that may block (waiting for device buffer
/// space); everything else must return promptly. Capabilities a driver
/// does not have keep their default no-op implementations.
pub trait AudioOutput: Send + Sync {
    /// Open the device at the given sample rate.
    fn start(&self, sample_rate: u32) -> Result<()>;

    /// Close the device.
    fn stop(&self);

    /// Blocking enqueue of interleaved stereo samples; returns once the
    /// device has accepted them.
    fn play(&self, pcm: &[i16]) -> Result<()>;

    /// Drop any buffered audio not yet rendered.
    fn flush(&self) {}

    /// Stereo frames currently queued in the device.
    ///
    /// `None` means the driver cannot report occupancy at all, which
    /// disables sync correction. `Some(Err(_))` is a transient failure;
    /// the caller logs it and proceeds as if the queue were empty.
    fn delay(&self) -> Option<Result<i64>> {
        None
    }

    /// Apply a hardware volume, in the sender's -30..0 dB scale.
    ///
    /// Returns `true` when the device took the volume, in which case no
    /// software attenuation is applied.
    fn volume(&self, airplay_volume: f64) -> bool {
        let _ = airplay_volume;
        false
    }

    /// Fill in the device's volume range and mute capabilities.
    ///
    /// Returns `false` when the driver has nothing to report; the caller
    /// then synthesizes the software-mixer values.
    fn parameters(&self, info: &mut AudioParameters) -> bool {
        let _ = info;
        false
    }
}
