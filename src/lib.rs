// ABOUTME: Main library entry point for backbeat
// ABOUTME: Exports the player core, collaborator traits, and configuration

//! # backbeat
//!
//! Slave-clocked audio playback engine for network audio-streaming receivers.
//!
//! Encrypted, compressed audio frames arrive over an unreliable packet network
//! tagged with 16-bit sequence numbers and 32-bit media timestamps; a timing
//! channel supplies anchor points mapping a source timestamp to a local clock
//! instant. This crate reconstructs a continuous, bit-accurate PCM stream at
//! the output device, aligned in time with the source, despite packet loss,
//! reordering, late arrival, clock drift, and unknown output-device latency.
//!
//! The network receiver, the timing-anchor provider, the lossless decoder and
//! the output sink are external collaborators, modelled as traits
//! ([`player::Upstream`], [`sync::AnchorSource`], [`audio::decode::Decoder`],
//! [`audio::output::AudioOutput`]).

#![warn(missing_docs)]

/// Audio types and processing
pub mod audio;
/// Runtime configuration
pub mod config;
/// The playback core: ingress, egress, lifecycle
pub mod player;
/// Packet-level protocol pieces: sequence arithmetic, payload cipher
pub mod protocol;
/// Clock representation and source-to-local timing math
pub mod sync;

pub use config::Config;
pub use player::{Metrics, PlaySegment, Player, Upstream};

/// Result type for backbeat operations
pub type Result<T> = std::result::Result<T, error::Error>;

/// Error types for backbeat
pub mod error {
    use thiserror::Error;

    /// Error types for backbeat operations
    #[derive(Error, Debug)]
    pub enum Error {
        /// The stream format cannot be played (e.g. sample size other than 16)
        #[error("unsupported stream format: {0}")]
        UnsupportedFormat(String),

        /// Invalid or inconsistent configuration
        #[error("configuration error: {0}")]
        Config(String),

        /// The payload cipher failed
        #[error("decrypt error: {0}")]
        Decrypt(String),

        /// The lossless decoder failed or produced the wrong frame length
        #[error("decode error: {0}")]
        Decode(String),

        /// Audio output error
        #[error("audio output error: {0}")]
        Output(String),

        /// The resampling stuffer failed
        #[error("resample error: {0}")]
        Resample(String),
    }
}
