// ABOUTME: Lossless decoder contract
// ABOUTME: The codec itself is an external collaborator created per stream

/// PCM passthrough decoder
pub mod pcm;

pub use pcm::{PcmDecoder, PcmDecoderFactory};

use crate::audio::Fmtp;
use crate::Result;

/// Decoder for one stream's audio payloads.
///
/// A decoded packet is always exactly `2 * frame_size` interleaved signed
/// 16-bit samples; anything else is a decoder error and ends the session.
pub trait Decoder: Send {
    /// Decode one packet into `pcm`, returning the sample count written.
    fn decode(&mut self, packet: &[u8], pcm: &mut [i16]) -> Result<usize>;
}

/// Builds a decoder for a stream from its format descriptor.
pub trait DecoderFactory: Send + Sync {
    /// Create a decoder configured by the 12-entry format vector.
    fn create(&self, fmtp: &Fmtp) -> Result<Box<dyn Decoder>>;
}
