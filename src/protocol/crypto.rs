// ABOUTME: AES-128-CBC payload cipher for encrypted audio packets
// ABOUTME: The session IV is reloaded for every packet; ragged tails pass through

use crate::error::Error;
use crate::Result;
use aes::Aes128;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Per-session packet decryptor.
///
/// Audio payloads are encrypted with AES-128-CBC over the largest multiple
/// of 16 bytes; the remaining `len mod 16` tail bytes are carried in the
/// clear and copied verbatim. The chain starts from the session IV on every
/// packet, so packets decrypt independently.
pub struct PacketCipher {
    key: [u8; 16],
    iv: [u8; 16],
}

impl PacketCipher {
    /// Create a cipher from the session key and IV.
    pub fn new(key: [u8; 16], iv: [u8; 16]) -> Self {
        Self { key, iv }
    }

    /// Decrypt `payload` into `out`, returning the payload length.
    ///
    /// `out` must be at least `payload.len()` bytes.
    pub fn decrypt(&self, payload: &[u8], out: &mut [u8]) -> Result<usize> {
        let len = payload.len();
        let aeslen = len & !0xf;
        Aes128CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_b2b_mut::<NoPadding>(&payload[..aeslen], &mut out[..aeslen])
            .map_err(|e| Error::Decrypt(e.to_string()))?;
        out[aeslen..len].copy_from_slice(&payload[aeslen..]);
        Ok(len)
    }
}
