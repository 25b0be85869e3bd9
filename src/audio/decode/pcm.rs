// ABOUTME: PCM passthrough decoder
// ABOUTME: Interprets payloads as little-endian interleaved 16-bit stereo

use crate::audio::decode::{Decoder, DecoderFactory};
use crate::audio::Fmtp;
use crate::error::Error;
use crate::Result;

/// Decoder for streams whose payloads are already raw PCM.
pub struct PcmDecoder {
    samples_per_packet: usize,
}

impl PcmDecoder {
    /// A decoder expecting packets of `samples_per_packet` interleaved
    /// samples.
    pub fn new(samples_per_packet: usize) -> Self {
        Self { samples_per_packet }
    }
}

impl Decoder for PcmDecoder {
    fn decode(&mut self, packet: &[u8], pcm: &mut [i16]) -> Result<usize> {
        if packet.len() != self.samples_per_packet * 2 {
            return Err(Error::Decode(format!(
                "PCM packet of {} bytes, expected {}",
                packet.len(),
                self.samples_per_packet * 2
            )));
        }
        for (out, bytes) in pcm.iter_mut().zip(packet.chunks_exact(2)) {
            *out = i16::from_le_bytes([bytes[0], bytes[1]]);
        }
        Ok(self.samples_per_packet)
    }
}

/// Factory producing [`PcmDecoder`]s sized from the format descriptor.
pub struct PcmDecoderFactory;

impl DecoderFactory for PcmDecoderFactory {
    fn create(&self, fmtp: &Fmtp) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(PcmDecoder::new(fmtp.samples_per_packet())))
    }
}
