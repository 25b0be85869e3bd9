// ABOUTME: The playback core: session state, lifecycle, and control surface
// ABOUTME: Owns the egress thread; ingress and control calls arrive from outside

mod egress;
mod ingress;
/// Sliding-window sync statistics
pub mod stats;

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

use crate::audio::decode::{Decoder, DecoderFactory};
use crate::audio::output::AudioOutput;
use crate::audio::ring::FrameRing;
use crate::audio::volume::{default_volume_curve, VolumeCurve, VolumeState};
use crate::audio::{AudioParameters, StreamDesc, BUFFER_FRAMES, FRAMES_PER_PACKET, MAX_PACKET};
use crate::config::Config;
use crate::error::Error;
use crate::protocol::{PacketCipher, SeqNum};
use crate::sync::{AnchorSource, FpTime, MonotonicClock};
use crate::Result;

use egress::Egress;

/// Stack reserved for the egress thread, over and above the platform floor.
const EGRESS_STACK_SIZE: usize = 512 * 1024;

/// Out-of-band channel back to the sender side of the stream.
///
/// Both calls arrive from inside the player's locks; implementations must
/// enqueue and return, and must not call back into the player.
pub trait Upstream: Send + Sync {
    /// Ask the sender to retransmit `count` packets starting at `first`.
    /// Best-effort; no acknowledgement is expected.
    fn request_resend(&self, first: SeqNum, count: u32);

    /// Ask the session owner to tear the stream down, e.g. because the
    /// source has gone silent past the configured timeout.
    fn request_shutdown(&self) {}
}

/// Reference frame of the play segment currently going out, published when
/// pre-roll completes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaySegment {
    /// Anchor media timestamp at the moment playback started.
    pub reference_frame: u32,
    /// Sender-side time of that anchor.
    pub remote_time: FpTime,
}

/// Snapshot of the session's packet accounting.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Packets received since `play`.
    pub packet_count: u64,
    /// Frames emitted as silence because their packet never arrived.
    pub missing_packets: u64,
    /// Packets that arrived out of order but before their slot played.
    pub late_packets: u64,
    /// Packets that arrived after their slot had already played.
    pub too_late_packets: u64,
    /// Resend requests issued.
    pub resend_requests: u64,
    /// Ring occupancy, in packets, at the last egress iteration.
    pub buffer_occupancy: i32,
    /// Net ±1-sample corrections applied this session.
    pub session_corrections: i64,
}

/// Flush flags, guarded by the flush mutex.
///
/// `rtp_timestamp == 0` doubles as "no flush pending"; a flush to the
/// literal timestamp 0 cannot be expressed. Kept for compatibility.
pub(crate) struct FlushState {
    pub requested: bool,
    pub rtp_timestamp: u32,
}

/// Everything the stream mutex guards: cursors, ring, pre-roll state,
/// packet accounting, and the ingress-owned cipher and decoder.
pub(crate) struct StreamState {
    pub ring: FrameRing,
    pub ab_read: SeqNum,
    pub ab_write: SeqNum,
    pub synced: bool,
    pub buffering: bool,
    pub first_packet_timestamp: Option<u32>,
    pub first_packet_time_to_play: Option<FpTime>,
    pub time_of_last_audio_packet: Option<FpTime>,
    pub last_seqno_read: Option<SeqNum>,
    /// Timestamp the frame at `ab_read` should carry, extrapolated from
    /// the frames already released. Lets a hole at the front of the ring
    /// release as silence at its proper instant instead of stalling the
    /// queue.
    pub expected_timestamp: Option<u32>,
    pub connection_state_to_output: bool,
    pub shutdown_requested: bool,
    pub packet_count: u64,
    pub missing_packets: u64,
    pub late_packets: u64,
    pub too_late_packets: u64,
    pub resend_requests: u64,
    pub cipher: Option<PacketCipher>,
    pub decoder: Box<dyn Decoder>,
    pub packet_scratch: Box<[u8]>,
}

impl StreamState {
    fn new(
        frame_size: usize,
        decoder: Box<dyn Decoder>,
        cipher: Option<PacketCipher>,
        connection_state_to_output: bool,
    ) -> Self {
        Self {
            ring: FrameRing::new(frame_size),
            ab_read: SeqNum(0),
            ab_write: SeqNum(0),
            synced: false,
            buffering: true,
            first_packet_timestamp: None,
            first_packet_time_to_play: None,
            time_of_last_audio_packet: None,
            last_seqno_read: None,
            expected_timestamp: None,
            connection_state_to_output,
            shutdown_requested: false,
            packet_count: 0,
            missing_packets: 0,
            late_packets: 0,
            too_late_packets: 0,
            resend_requests: 0,
            cipher,
            decoder,
            packet_scratch: vec![0u8; MAX_PACKET].into_boxed_slice(),
        }
    }

    /// Drop all buffered audio and fall back to the unsynced, buffering
    /// state. The next packet to arrive re-seats the cursors.
    pub(crate) fn resync(&mut self) {
        self.ring.resync();
        self.synced = false;
        self.last_seqno_read = None;
        self.expected_timestamp = None;
        self.buffering = true;
    }
}

/// Control state that outlives individual sessions.
pub(crate) struct Controls {
    pub volume: Mutex<VolumeState>,
    pub output_requested: AtomicBool,
    pub audio_params: Mutex<Option<AudioParameters>>,
}

/// State shared between the control surface, the ingress path, and the
/// egress thread for the lifetime of one session.
pub(crate) struct Shared {
    pub stream: Mutex<StreamState>,
    pub flowcontrol: Condvar,
    pub flush: Mutex<FlushState>,
    pub please_stop: AtomicBool,
    pub clock: Arc<MonotonicClock>,
    pub controls: Arc<Controls>,
    pub play_segment: Mutex<Option<PlaySegment>>,
    pub session_corrections: AtomicI64,
    pub buffer_occupancy: AtomicI32,
    pub frame_size: usize,
}

impl Shared {
    /// Record a flush up to `timestamp`; the egress thread picks it up on
    /// its next iteration.
    pub(crate) fn request_flush(&self, timestamp: u32) {
        {
            let mut flush = self.flush.lock();
            flush.requested = true;
            flush.rtp_timestamp = timestamp;
        }
        *self.play_segment.lock() = None;
    }
}

struct Session {
    shared: Arc<Shared>,
    handle: thread::JoinHandle<()>,
}

/// The slave-clocked player.
///
/// Constructed once with its collaborators; `play` starts a session and the
/// egress thread, `stop` tears both down. Packets are fed in from the
/// network thread through [`Player::put_packet`].
pub struct Player {
    config: Config,
    output: Arc<dyn AudioOutput>,
    anchor: Arc<dyn AnchorSource>,
    upstream: Arc<dyn Upstream>,
    decoders: Arc<dyn DecoderFactory>,
    volume_curve: VolumeCurve,
    clock: Arc<MonotonicClock>,
    controls: Arc<Controls>,
    session: Option<Session>,
}

impl Player {
    /// Create a player around its collaborators. Fails if the configuration
    /// is inconsistent.
    pub fn new(
        config: Config,
        output: Arc<dyn AudioOutput>,
        anchor: Arc<dyn AnchorSource>,
        upstream: Arc<dyn Upstream>,
        decoders: Arc<dyn DecoderFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            output,
            anchor,
            upstream,
            decoders,
            volume_curve: default_volume_curve,
            clock: Arc::new(MonotonicClock::new()),
            controls: Arc::new(Controls {
                volume: Mutex::new(VolumeState::default()),
                output_requested: AtomicBool::new(true),
                audio_params: Mutex::new(None),
            }),
            session: None,
        })
    }

    /// Replace the volume-to-attenuation mapping.
    pub fn set_volume_curve(&mut self, curve: VolumeCurve) {
        self.volume_curve = curve;
    }

    /// The clock all timing is measured on.
    ///
    /// Anchor local times handed to the player must be readings of this
    /// clock; give it to whatever feeds the [`AnchorSource`].
    pub fn clock(&self) -> Arc<MonotonicClock> {
        Arc::clone(&self.clock)
    }

    /// Start playing a stream: install the cipher, build the decoder,
    /// allocate the ring, open the sink, and spawn the egress thread.
    pub fn play(&mut self, stream: &StreamDesc) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::Config("player is already playing".into()));
        }
        self.config.validate()?;

        let fmtp = &stream.fmtp;
        if fmtp.sample_size() != 16 {
            return Err(Error::UnsupportedFormat(format!(
                "only 16-bit samples are supported, stream has {}",
                fmtp.sample_size()
            )));
        }
        let frame_size = fmtp.frame_size() as usize;
        if frame_size < 16 {
            return Err(Error::UnsupportedFormat(format!(
                "frame size {} is too small to stuff",
                frame_size
            )));
        }

        // The whole latency budget must fit in the ring, with headroom.
        let maximum_latency = self.config.latency + self.config.audio_backend_latency_offset;
        let packets_needed =
            (maximum_latency + FRAMES_PER_PACKET as i64 - 1) / FRAMES_PER_PACKET as i64 + 10;
        if packets_needed > BUFFER_FRAMES as i64 {
            return Err(Error::Config(format!(
                "a total latency of {} frames needs {} ring slots, only {} exist",
                maximum_latency, packets_needed, BUFFER_FRAMES
            )));
        }

        let decoder = self.decoders.create(fmtp)?;
        let cipher = stream
            .encryption
            .as_ref()
            .map(|keys| PacketCipher::new(keys.key, keys.iv));

        let shared = Arc::new(Shared {
            stream: Mutex::new(StreamState::new(
                frame_size,
                decoder,
                cipher,
                self.controls.output_requested.load(Ordering::SeqCst),
            )),
            flowcontrol: Condvar::new(),
            flush: Mutex::new(FlushState {
                requested: false,
                rtp_timestamp: 0,
            }),
            please_stop: AtomicBool::new(false),
            clock: Arc::clone(&self.clock),
            controls: Arc::clone(&self.controls),
            play_segment: Mutex::new(None),
            session_corrections: AtomicI64::new(0),
            buffer_occupancy: AtomicI32::new(0),
            frame_size,
        });

        self.output.start(fmtp.sampling_rate())?;

        let egress = Egress::new(
            Arc::clone(&shared),
            self.config.clone(),
            Arc::clone(&self.output),
            Arc::clone(&self.anchor),
            Arc::clone(&self.upstream),
        );
        let handle = thread::Builder::new()
            .name("backbeat-egress".into())
            .stack_size(EGRESS_STACK_SIZE)
            .spawn(move || egress.run())
            .map_err(|e| {
                self.output.stop();
                Error::Output(format!("failed to spawn egress thread: {}", e))
            })?;

        self.session = Some(Session { shared, handle });
        Ok(())
    }

    /// Stop the current session: unblock and join the egress thread, close
    /// the sink, and free the ring and decoder.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.shared.please_stop.store(true, Ordering::SeqCst);
            session.shared.flowcontrol.notify_all();
            if session.handle.join().is_err() {
                log::error!("egress thread panicked");
            }
            self.output.stop();
        }
    }

    /// Discard all audio at or before `timestamp` and resynchronize.
    pub fn flush(&self, timestamp: u32) {
        if let Some(session) = &self.session {
            session.shared.request_flush(timestamp);
        }
    }

    /// Feed one packet from the network thread.
    pub fn put_packet(&self, sequence: SeqNum, timestamp: u32, payload: &[u8]) {
        if let Some(session) = &self.session {
            ingress::put_packet(
                &session.shared,
                self.upstream.as_ref(),
                sequence,
                timestamp,
                payload,
            );
        }
    }

    /// Apply a volume in the sender's scale: -30..0 dB, or -144 for mute.
    ///
    /// Hardware mixers get the value as-is; otherwise the volume curve maps
    /// it to a software attenuation applied with dither in the render path.
    pub fn set_volume(&self, airplay_volume: f64) {
        let scaled_volume = (self.volume_curve)(airplay_volume, 0.0, -4810.0);
        let mut linear_volume = 10f64.powf(scaled_volume / 1000.0);

        if airplay_volume == -144.0 {
            linear_volume = 0.0;
        }

        if self.output.volume(airplay_volume) {
            // The hardware mixer took it; no software attenuation.
            linear_volume = 1.0;
        }

        let mut info = AudioParameters::default();
        if !self.output.parameters(&mut info) {
            info.airplay_volume = airplay_volume;
            info.minimum_volume_db = -4810;
            info.maximum_volume_db = 0;
            info.current_volume_db = scaled_volume as i32;
            info.has_true_mute = false;
            info.is_muted = airplay_volume == -144.0;
        }
        *self.controls.audio_params.lock() = Some(info);

        let mut volume = self.controls.volume.lock();
        volume.software_mixer_volume = linear_volume;
        volume.fix_volume = (65536.0 * linear_volume).round() as i32;
    }

    /// Gate the output: while disabled, arriving packets are dropped and a
    /// transition to disabled flushes the session.
    pub fn set_output_enabled(&self, enabled: bool) {
        self.controls.output_requested.store(enabled, Ordering::SeqCst);
    }

    /// Packet accounting for the running session, if any.
    pub fn metrics(&self) -> Option<Metrics> {
        let session = self.session.as_ref()?;
        let state = session.shared.stream.lock();
        Some(Metrics {
            packet_count: state.packet_count,
            missing_packets: state.missing_packets,
            late_packets: state.late_packets,
            too_late_packets: state.too_late_packets,
            resend_requests: state.resend_requests,
            buffer_occupancy: session.shared.buffer_occupancy.load(Ordering::Relaxed),
            session_corrections: session.shared.session_corrections.load(Ordering::Relaxed),
        })
    }

    /// Volume and capability information from the last volume change.
    pub fn audio_parameters(&self) -> Option<AudioParameters> {
        *self.controls.audio_params.lock()
    }

    /// Reference frame of the current play segment, if one is going out.
    pub fn play_segment(&self) -> Option<PlaySegment> {
        self.session
            .as_ref()
            .and_then(|session| *session.shared.play_segment.lock())
    }

    /// Whether a session is currently running.
    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}
