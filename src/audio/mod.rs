// ABOUTME: Audio types and processing for backbeat
// ABOUTME: Frame ring, stuffers, volume scaling, sink and decoder contracts

/// Decoder contract and the PCM passthrough decoder
pub mod decode;
/// Audio output sink contract
pub mod output;
/// Jitter/reorder ring of decoded packets
pub mod ring;
/// ±1-sample stuffers
pub mod stuffer;
/// Stream descriptor and format types
pub mod types;
/// Fixed-point attenuation and dither
pub mod volume;

pub use ring::{FrameRing, BUFFER_FRAMES};
pub use types::{
    AudioParameters, Fmtp, StreamDesc, StreamKeys, CHANNELS, FRAMES_PER_PACKET, MAX_PACKET,
    NOMINAL_SAMPLE_RATE,
};
