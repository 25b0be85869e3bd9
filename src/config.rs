// ABOUTME: Runtime configuration for the playback core
// ABOUTME: Latency budget, correction thresholds, stuffing mode, timeouts

use serde::Deserialize;

use crate::audio::BUFFER_FRAMES;
use crate::error::Error;
use crate::Result;

/// Which ±1-sample stuffer the egress loop uses.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stuffing {
    /// Linear splice with an interpolated or dropped sample.
    #[default]
    Basic,
    /// Resampling-based stuffing. The value name is kept for compatibility
    /// with existing configurations.
    Soxr,
}

/// Player configuration.
///
/// All frame quantities are stereo frames at the nominal source rate.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target end-to-end frames between the anchor and the output.
    pub latency: i64,
    /// Compensation for the sink's internal delay, in frames.
    pub audio_backend_latency_offset: i64,
    /// Frames to keep queued in the sink.
    pub audio_backend_buffer_desired_length: i64,
    /// Frames of sync error below which no correction is applied.
    pub tolerance: i64,
    /// Frames of sync error that trigger a resync; 0 disables.
    pub resyncthreshold: i64,
    /// Stuffer selection.
    pub packet_stuffing: Stuffing,
    /// Initial-fill guard; must not exceed the ring capacity.
    pub buffer_start_fill: i32,
    /// Seconds of packet silence before requesting upstream shutdown;
    /// 0 disables.
    pub timeout: u64,
    /// Disable the packet-silence timeout regardless of `timeout`.
    pub dont_check_timeout: bool,
    /// Emit the periodic statistics log line.
    pub statistics_requested: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latency: 88_200,
            audio_backend_latency_offset: 0,
            audio_backend_buffer_desired_length: 6615,
            tolerance: 88,
            resyncthreshold: 2205,
            packet_stuffing: Stuffing::Basic,
            buffer_start_fill: 220,
            timeout: 120,
            dont_check_timeout: false,
            statistics_requested: false,
        }
    }
}

impl Config {
    /// Check the configuration for internally inconsistent values.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_start_fill < 0 || self.buffer_start_fill as usize > BUFFER_FRAMES {
            return Err(Error::Config(format!(
                "buffer_start_fill {} exceeds the ring capacity of {}",
                self.buffer_start_fill, BUFFER_FRAMES
            )));
        }
        if self.latency < 0 {
            return Err(Error::Config("latency must not be negative".into()));
        }
        if self.tolerance < 0 {
            return Err(Error::Config("tolerance must not be negative".into()));
        }
        if self.resyncthreshold < 0 {
            return Err(Error::Config(
                "resyncthreshold must not be negative".into(),
            ));
        }
        Ok(())
    }
}
