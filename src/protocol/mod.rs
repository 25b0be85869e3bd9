// ABOUTME: Packet-level protocol pieces shared by ingress and egress
// ABOUTME: Sequence/timestamp arithmetic and the payload cipher

/// AES-128-CBC payload cipher
pub mod crypto;
/// Wrap-safe sequence number and timestamp arithmetic
pub mod seq;

pub use crypto::PacketCipher;
pub use seq::SeqNum;
