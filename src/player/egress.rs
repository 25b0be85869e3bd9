// ABOUTME: Egress thread: flush pickup, pre-roll, release timing, render
// ABOUTME: Owns the stream mutex outside of condition waits

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::audio::output::AudioOutput;
use crate::audio::ring::FrameRing;
use crate::audio::stuffer::{stuff_basic, stuff_resample};
use crate::audio::volume::{Ditherer, VolumeState, UNITY_VOLUME};
use crate::audio::{BUFFER_FRAMES, CHANNELS, FRAMES_PER_PACKET, NOMINAL_SAMPLE_RATE};
use crate::config::{Config, Stuffing};
use crate::player::stats::{TrendWindow, TREND_INTERVAL};
use crate::player::{PlaySegment, Shared, StreamState, Upstream};
use crate::protocol::{seq, SeqNum};
use crate::sync::clock::ticks_to_frames;
use crate::sync::{timing, AnchorSource, FpTime};

/// Longest pre-roll silence batch: 0.1 s of frames.
const FILLER_SIZE: usize = 4410;
/// Most silence pre-roll may leave queued in the DAC, in frames.
const MAX_DAC_DELAY: i64 = 4410;
/// Most frames the lingering flush filter drops in one scan (~0.2 s).
const FLUSH_SCAN_LIMIT: u32 = 8820;
/// Frames skipped forward when the first packet shows up already late.
const LATE_START_SKIP: u32 = 4410;
/// Consecutive out-of-bounds frames that trigger a resync.
const RESYNC_PATIENCE: u32 = 3;
/// Frames emitted between statistics reports.
const PRINT_INTERVAL: u64 = TREND_INTERVAL as u64;

/// Condvar wake-up interval: four thirds of one packet duration.
fn wakeup_ticks() -> i64 {
    (((1u64 << 32) / NOMINAL_SAMPLE_RATE as u64) * (4 * FRAMES_PER_PACKET as u64) / 3) as i64
}

/// One frame handed from the ring to the render path. The PCM itself sits
/// in the egress input buffer; a timestamp of 0 marks inserted silence.
struct OutFrame {
    timestamp: u32,
    sequence: SeqNum,
}

pub(crate) struct Egress {
    shared: Arc<Shared>,
    config: Config,
    output: Arc<dyn AudioOutput>,
    anchor: Arc<dyn AnchorSource>,
    upstream: Arc<dyn Upstream>,
    frame_size: usize,
    /// Frame being rendered; swapped with ring slots under the lock.
    inbuf: Box<[i16]>,
    /// Stuffer output, one packet plus headroom for the inserted frame.
    outbuf: Box<[i16]>,
    silence: Box<[i16]>,
    dither: Ditherer,
    window: TrendWindow,
    play_number: u64,
    at_least_one_frame_seen: bool,
    sync_error_out_of_bounds: u32,
    minimum_dac_queue: i64,
    minimum_buffer_occupancy: i32,
    maximum_buffer_occupancy: i32,
}

impl Egress {
    pub(crate) fn new(
        shared: Arc<Shared>,
        config: Config,
        output: Arc<dyn AudioOutput>,
        anchor: Arc<dyn AnchorSource>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let frame_size = shared.frame_size;
        Self {
            inbuf: vec![0i16; frame_size * CHANNELS].into_boxed_slice(),
            outbuf: vec![0i16; (frame_size + 3) * CHANNELS].into_boxed_slice(),
            silence: vec![0i16; FILLER_SIZE * CHANNELS].into_boxed_slice(),
            dither: Ditherer::new(),
            window: TrendWindow::new(),
            play_number: 0,
            at_least_one_frame_seen: false,
            sync_error_out_of_bounds: 0,
            minimum_dac_queue: i64::MAX,
            minimum_buffer_occupancy: BUFFER_FRAMES as i32,
            maximum_buffer_occupancy: 0,
            shared,
            config,
            output,
            anchor,
            upstream,
            frame_size,
        }
    }

    pub(crate) fn run(mut self) {
        let mut rng = rand::thread_rng();
        while !self.shared.please_stop.load(Ordering::SeqCst) {
            match self.next_frame() {
                Some(frame) => self.render(frame, &mut rng),
                None => break,
            }
        }
    }

    /// Block until the frame at the read cursor is due, then take it.
    ///
    /// Returns `None` only when the session is stopping. On return the
    /// frame's PCM is in `inbuf` and the cursor has advanced.
    fn next_frame(&mut self) -> Option<OutFrame> {
        let mut state = self.shared.stream.lock();

        loop {
            let local_time_now = self.shared.clock.now();

            // Source gone silent?
            if let Some(last) = state.time_of_last_audio_packet {
                if !state.shutdown_requested
                    && !self.config.dont_check_timeout
                    && self.config.timeout != 0
                    && local_time_now > last
                    && local_time_now.ticks_since(last)
                        >= FpTime::from_secs(self.config.timeout).0 as i64
                {
                    log::warn!(
                        "no audio packets for {} seconds; requesting shutdown",
                        self.config.timeout
                    );
                    self.upstream.request_shutdown();
                    state.shutdown_requested = true;
                }
            }

            // Latch connection-state changes from the control surface.
            let requested = self.shared.controls.output_requested.load(Ordering::SeqCst);
            if state.connection_state_to_output != requested {
                state.connection_state_to_output = requested;
                if !requested {
                    self.shared.flush.lock().requested = true;
                }
            }

            // Flush pickup.
            {
                let mut flush = self.shared.flush.lock();
                if flush.requested {
                    self.output.flush();
                    state.resync();
                    state.first_packet_timestamp = None;
                    state.first_packet_time_to_play = None;
                    flush.requested = false;
                }
            }

            if state.synced {
                self.scan_read_cursor(&mut state);

                if state.buffering && state.ring.slot(state.ab_read).ready {
                    self.preroll(&mut state, local_time_now);
                }
            }

            // Release decision: the frame goes out once its play instant,
            // net of latency and the desired sink queue, has arrived. A
            // hole releases on the timestamp extrapolated from the frames
            // before it, but only once the stream has written past it.
            let mut do_wait = true;
            if state.synced {
                let slot = state.ring.slot(state.ab_read);
                let release_timestamp = if slot.ready && slot.timestamp != 0 {
                    Some(slot.timestamp)
                } else if !slot.ready
                    && !state.buffering
                    && seq::ordinate(state.ab_read, state.ab_write) > 0
                {
                    state.expected_timestamp
                } else {
                    None
                };
                if let (Some(timestamp), Some(anchor)) =
                    (release_timestamp, self.anchor.reference())
                {
                    let time_to_play = timing::time_to_play(
                        &anchor,
                        timestamp,
                        self.config.latency,
                        self.config.audio_backend_latency_offset,
                        self.config.audio_backend_buffer_desired_length,
                    );
                    if local_time_now >= time_to_play {
                        do_wait = false;
                    }
                }
            }

            let please_stop = self.shared.please_stop.load(Ordering::SeqCst);
            if !((state.buffering || do_wait || !state.synced) && !please_stop) {
                break;
            }

            let deadline = self
                .shared
                .clock
                .instant_at(local_time_now.saturating_add_ticks(wakeup_ticks()));
            self.shared.flowcontrol.wait_until(&mut state, deadline);
        }

        if self.shared.please_stop.load(Ordering::SeqCst) {
            return None;
        }

        // Last-chance resends: probe exponentially spaced holes in the
        // front half of the buffered window.
        if !state.buffering {
            let occupancy = seq::ordinate(state.ab_read, state.ab_write);
            let mut i: i32 = 8;
            while i < occupancy / 2 {
                let next = state.ab_read.offset(i as u16);
                if !state.ring.slot(next).ready {
                    self.upstream.request_resend(next, 1);
                    state.resend_requests += 1;
                }
                i *= 2;
            }
        }

        let read = state.ab_read;
        let frame_size = self.frame_size as u32;
        let frame = if !state.ring.slot(read).ready {
            state.missing_packets += 1;
            state.expected_timestamp = state.expected_timestamp.map(|ts| ts.wrapping_add(frame_size));
            self.inbuf.fill(0);
            OutFrame {
                timestamp: 0,
                sequence: read,
            }
        } else {
            let slot = state.ring.slot_mut(read);
            std::mem::swap(&mut slot.data, &mut self.inbuf);
            let frame = OutFrame {
                timestamp: slot.timestamp,
                sequence: slot.sequence,
            };
            state.expected_timestamp = Some(frame.timestamp.wrapping_add(frame_size));
            frame
        };
        state.ring.clear(read);
        state.ab_read = read.successor();
        Some(frame)
    }

    /// Audit the slot under the read cursor and, while a flush boundary
    /// lingers, drop ready frames at or before it (up to the scan limit).
    /// Holes are left for the normal path, which turns them into silence.
    fn scan_read_cursor(&self, state: &mut StreamState) {
        let mut flush_limit: u32 = 0;
        loop {
            let read = state.ab_read;
            let ready = state.ring.slot(read).ready;

            if ready {
                let stored = state.ring.slot(read).sequence;
                if stored != read {
                    if FrameRing::index(stored) == FrameRing::index(read) {
                        // Index aliasing: the ring wrapped past this slot.
                        if seq::after(read, read, stored) {
                            state.ab_read = stored;
                            log::warn!("aliasing of ring index; read cursor reset");
                        }
                    } else {
                        log::warn!("inconsistent sequence numbers detected");
                    }
                }
            }

            let boundary = self.shared.flush.lock().rtp_timestamp;
            if boundary == 0 || !ready {
                return;
            }

            let read = state.ab_read;
            let slot_ts = state.ring.slot(read).timestamp;
            if slot_ts == boundary || seq::ts_after(slot_ts, boundary) {
                log::debug!(
                    "dropping flushed frame, seqno {}, timestamp {}",
                    read,
                    slot_ts
                );
                state.ring.clear(read);
                state.ab_read = read.successor();
                flush_limit += 1;
                if slot_ts == boundary {
                    self.shared.flush.lock().rtp_timestamp = 0;
                    return;
                }
                if flush_limit >= FLUSH_SCAN_LIMIT {
                    log::warn!("flush filter hit the {} frame limit", FLUSH_SCAN_LIMIT);
                    return;
                }
            } else {
                // First frame past the boundary; the filter comes off.
                self.shared.flush.lock().rtp_timestamp = 0;
                return;
            }
        }
    }

    /// Pre-roll: hold the first frame and pad the sink with silence until
    /// its play instant is one batch away, then release it to the sample.
    fn preroll(&self, state: &mut StreamState, local_time_now: FpTime) {
        if state.first_packet_timestamp.is_none() {
            if let Some(anchor) = self.anchor.reference() {
                let first_ts = state.ring.slot(state.ab_read).timestamp;
                state.first_packet_timestamp = Some(first_ts);
                let time_to_play = timing::first_packet_time_to_play(
                    &anchor,
                    first_ts,
                    self.config.latency,
                    self.config.audio_backend_latency_offset,
                );
                state.first_packet_time_to_play = Some(time_to_play);
                if local_time_now >= time_to_play {
                    log::warn!(
                        "first packet is late; skipping {} frames and resuming",
                        LATE_START_SKIP
                    );
                    self.shared
                        .request_flush(first_ts.wrapping_add(LATE_START_SKIP));
                    state.first_packet_timestamp = None;
                    state.first_packet_time_to_play = None;
                    return;
                }
            }
            // No anchor yet: keep buffering.
        }

        let Some(time_to_play) = state.first_packet_time_to_play else {
            return;
        };

        if local_time_now >= time_to_play {
            // Overshot the start instant while filling.
            self.output.flush();
            state.resync();
            state.first_packet_timestamp = None;
            state.first_packet_time_to_play = None;
            return;
        }

        let dac_delay: i64 = match self.output.delay() {
            Some(Ok(d)) => d,
            Some(Err(e)) => {
                log::warn!("error getting DAC delay during pre-roll: {}", e);
                0
            }
            None => 0,
        };

        let gross_frame_gap = ticks_to_frames(time_to_play.ticks_since(local_time_now));
        let exact_frame_gap = gross_frame_gap - dac_delay;
        if exact_frame_gap <= 0 {
            self.output.flush();
            state.resync();
            state.first_packet_timestamp = None;
            state.first_packet_time_to_play = None;
            return;
        }

        let mut fs = (FILLER_SIZE as i64).min((MAX_DAC_DELAY - dac_delay).max(0));
        if exact_frame_gap <= fs || exact_frame_gap <= 2 * self.frame_size as i64 {
            fs = exact_frame_gap;
            state.buffering = false;
        }

        let fs = fs.clamp(0, FILLER_SIZE as i64) as usize;
        if fs > 0 {
            if let Err(e) = self.output.play(&self.silence[..fs * CHANNELS]) {
                log::warn!("sink rejected pre-roll silence: {}", e);
            }
        }

        if !state.buffering {
            if let Some(anchor) = self.anchor.reference() {
                *self.shared.play_segment.lock() = Some(PlaySegment {
                    reference_frame: anchor.media_timestamp,
                    remote_time: anchor.remote_time,
                });
            }
        }
    }

    fn render(&mut self, frame: OutFrame, rng: &mut ThreadRng) {
        self.play_number += 1;

        if frame.timestamp == 0 {
            // Silence standing in for a missing packet; keep the sequence
            // audit moving so the real successor does not warn.
            {
                let mut state = self.shared.stream.lock();
                if let Some(last) = state.last_seqno_read {
                    state.last_seqno_read = Some(last.successor());
                }
            }
            if let Err(e) = self.output.play(&self.inbuf) {
                log::warn!("sink error: {}", e);
            }
        } else {
            self.at_least_one_frame_seen = true;

            let first_packet_time_to_play;
            let buffer_occupancy;
            {
                let mut state = self.shared.stream.lock();
                match state.last_seqno_read {
                    None => state.last_seqno_read = Some(frame.sequence),
                    Some(last) => {
                        let expected = last.successor();
                        if frame.sequence != expected {
                            log::warn!(
                                "packets out of sequence: expected {}, got {}",
                                expected,
                                frame.sequence
                            );
                        }
                        state.last_seqno_read = Some(frame.sequence);
                    }
                }
                buffer_occupancy = seq::ordinate(state.ab_read, state.ab_write);
                first_packet_time_to_play = state.first_packet_time_to_play;
            }
            self.shared
                .buffer_occupancy
                .store(buffer_occupancy, Ordering::Relaxed);
            self.minimum_buffer_occupancy = self.minimum_buffer_occupancy.min(buffer_occupancy);
            self.maximum_buffer_occupancy = self.maximum_buffer_occupancy.max(buffer_occupancy);

            // Snapshot the volume once per frame; the stuffers must not
            // touch the volume mutex per sample.
            let volume = *self.shared.controls.volume.lock();
            let local_time_now = self.shared.clock.now();

            let mut sync_error: i64 = 0;
            let mut amount_to_stuff: i32 = 0;

            match (self.output.delay(), self.anchor.reference()) {
                (Some(delay_result), Some(anchor)) => {
                    let current_delay = match delay_result {
                        Ok(d) => d,
                        Err(e) => {
                            log::warn!("delay error when checking running latency: {}", e);
                            0
                        }
                    };
                    self.minimum_dac_queue = self.minimum_dac_queue.min(current_delay);

                    sync_error = timing::sync_error_frames(
                        local_time_now,
                        &anchor,
                        frame.timestamp,
                        current_delay,
                        self.config.latency,
                    );
                    amount_to_stuff =
                        timing::choose_correction(sync_error, self.config.tolerance, current_delay);

                    // Hold corrections back while the session settles: none
                    // in the first five seconds, roughly 1:1000 frames for
                    // the first thirty.
                    if amount_to_stuff != 0 {
                        if let Some(started) = first_packet_time_to_play {
                            if local_time_now >= started {
                                let seconds_playing = local_time_now.ticks_since(started) >> 32;
                                if seconds_playing < 5 {
                                    amount_to_stuff = 0;
                                } else if seconds_playing < 30 && rng.gen_range(0..1000) >= 352 {
                                    amount_to_stuff = 0;
                                }
                            }
                        }
                    }

                    self.emit(amount_to_stuff, volume, rng);

                    // A sustained large error means the anchor and the
                    // stream disagree beyond repair by stuffing.
                    if self.config.resyncthreshold != 0
                        && sync_error.abs() > self.config.resyncthreshold
                    {
                        self.sync_error_out_of_bounds += 1;
                        if self.sync_error_out_of_bounds >= RESYNC_PATIENCE {
                            log::warn!(
                                "lost sync with source for {} consecutive packets; flushing and resyncing, error {} frames",
                                self.sync_error_out_of_bounds,
                                sync_error
                            );
                            self.sync_error_out_of_bounds = 0;
                            self.shared.request_flush(frame.timestamp);
                        }
                    } else {
                        self.sync_error_out_of_bounds = 0;
                    }
                }
                _ => {
                    // No queue reporting or no anchor: nothing to
                    // synchronise against, just scale and play.
                    self.emit(0, volume, rng);
                }
            }

            self.shared
                .session_corrections
                .fetch_add(amount_to_stuff as i64, Ordering::Relaxed);
            self.window.record(sync_error, amount_to_stuff as i64);
        }

        if self.play_number % PRINT_INTERVAL == 0 {
            self.report();
        }
    }

    /// Hand the frame in `inbuf` to the sink, through a stuffer when a
    /// correction or software attenuation is needed.
    fn emit(&mut self, amount_to_stuff: i32, volume: VolumeState, rng: &mut ThreadRng) {
        if amount_to_stuff == 0 && volume.fix_volume == UNITY_VOLUME {
            if let Err(e) = self.output.play(&self.inbuf) {
                log::warn!("sink error: {}", e);
            }
            return;
        }

        let frames = match self.config.packet_stuffing {
            Stuffing::Basic => stuff_basic(
                &self.inbuf,
                &mut self.outbuf,
                amount_to_stuff,
                volume.fix_volume,
                &mut self.dither,
                rng,
            ),
            Stuffing::Soxr => match stuff_resample(
                &self.inbuf,
                &mut self.outbuf,
                amount_to_stuff,
                volume.software_mixer_volume,
                volume.fix_volume,
                &mut self.dither,
            ) {
                Ok(frames) => frames,
                Err(e) => {
                    log::error!("resampling stuffer failed: {}; falling back to basic", e);
                    stuff_basic(
                        &self.inbuf,
                        &mut self.outbuf,
                        amount_to_stuff,
                        volume.fix_volume,
                        &mut self.dither,
                        rng,
                    )
                }
            },
        };

        if let Err(e) = self.output.play(&self.outbuf[..frames * CHANNELS]) {
            log::warn!("sink error: {}", e);
        }
    }

    fn report(&mut self) {
        if self.config.statistics_requested {
            if self.at_least_one_frame_seen {
                if let Some(avg) = self.window.averages() {
                    let ppm = 1_000_000.0 / FRAMES_PER_PACKET as f64;
                    let state = self.shared.stream.lock();
                    if self.output.delay().is_some() {
                        log::info!(
                            "sync error: {:.1} (frames); net correction: {:.1} (ppm); \
                             corrections: {:.1} (ppm); missing packets {}; late packets {}; \
                             too late packets {}; resend requests {}; min DAC queue size {}; \
                             min and max buffer occupancy {} and {}",
                            avg.sync_error,
                            avg.correction * ppm,
                            avg.insertions_and_deletions * ppm,
                            state.missing_packets,
                            state.late_packets,
                            state.too_late_packets,
                            state.resend_requests,
                            self.minimum_dac_queue,
                            self.minimum_buffer_occupancy,
                            self.maximum_buffer_occupancy
                        );
                    } else {
                        log::info!(
                            "synchronisation disabled. missing packets {}; late packets {}; \
                             too late packets {}; resend requests {}; min and max buffer \
                             occupancy {} and {}",
                            state.missing_packets,
                            state.late_packets,
                            state.too_late_packets,
                            state.resend_requests,
                            self.minimum_buffer_occupancy,
                            self.maximum_buffer_occupancy
                        );
                    }
                }
            } else {
                log::info!("no frames received in the last sampling interval");
            }
        }
        self.minimum_dac_queue = i64::MAX;
        self.maximum_buffer_occupancy = 0;
        self.minimum_buffer_occupancy = BUFFER_FRAMES as i32;
        self.at_least_one_frame_seen = false;
    }
}
