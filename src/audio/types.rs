// ABOUTME: Core audio type definitions
// ABOUTME: Stream descriptor, format vector, and published audio parameters

/// Nominal source sample rate in frames per second. All anchor timing math
/// is carried out at this rate.
pub const NOMINAL_SAMPLE_RATE: u32 = 44100;

/// Nominal number of stereo frames per network packet.
pub const FRAMES_PER_PACKET: u32 = 352;

/// Largest accepted packet payload in bytes.
pub const MAX_PACKET: usize = 2048;

/// Interleaved stereo channel count. Everything in the engine is stereo.
pub const CHANNELS: usize = 2;

/// 12-entry stream format descriptor carried in the session announcement.
///
/// Entry 1 is the frame size (stereo frames per packet), entry 3 the sample
/// size in bits, entry 11 the sampling rate; the remaining entries are
/// opaque tuning values forwarded to the decoder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Fmtp(pub [u32; 12]);

impl Fmtp {
    /// Stereo frames per packet.
    #[inline]
    pub fn frame_size(&self) -> u32 {
        self.0[1]
    }

    /// Bits per sample. Only 16 is supported.
    #[inline]
    pub fn sample_size(&self) -> u32 {
        self.0[3]
    }

    /// Source sampling rate in Hz.
    #[inline]
    pub fn sampling_rate(&self) -> u32 {
        self.0[11]
    }

    /// Interleaved i16 sample count of one decoded packet.
    #[inline]
    pub fn samples_per_packet(&self) -> usize {
        self.frame_size() as usize * CHANNELS
    }
}

/// AES session key material for an encrypted stream.
#[derive(Copy, Clone)]
pub struct StreamKeys {
    /// 128-bit AES key.
    pub key: [u8; 16],
    /// CBC initialization vector, reloaded for every packet.
    pub iv: [u8; 16],
}

/// Everything needed to start playing one stream.
#[derive(Clone)]
pub struct StreamDesc {
    /// Key material, or `None` for a cleartext stream.
    pub encryption: Option<StreamKeys>,
    /// The stream's format descriptor.
    pub fmtp: Fmtp,
}

/// Volume and capability information published after a volume change.
///
/// Volumes are in centi-dB (hundredths of a decibel) to match the wire
/// protocol's attenuation units.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AudioParameters {
    /// The volume as specified by the sender, -30.0..0.0 or -144.0 for mute.
    pub airplay_volume: f64,
    /// Lowest attainable attenuation in centi-dB.
    pub minimum_volume_db: i32,
    /// Highest attainable attenuation in centi-dB.
    pub maximum_volume_db: i32,
    /// Attenuation currently applied, in centi-dB.
    pub current_volume_db: i32,
    /// Whether the device can mute without changing the volume setting.
    pub has_true_mute: bool,
    /// Whether the device is currently muted.
    pub is_muted: bool,
}
