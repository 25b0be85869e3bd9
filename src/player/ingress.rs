// ABOUTME: Ingress path: classify, decrypt, decode, deposit into the ring
// ABOUTME: Runs on the network thread under the stream mutex

use crate::audio::MAX_PACKET;
use crate::error::Error;
use crate::player::{Shared, StreamState, Upstream};
use crate::protocol::{seq, SeqNum};
use crate::Result;

/// Accept one packet from the network.
///
/// Classifies the sequence number against the cursors, clears and requests
/// resends for any gap it opens, then decrypts and decodes the payload
/// straight into its ring slot. Wakes the egress thread on the way out.
pub(crate) fn put_packet(
    shared: &Shared,
    upstream: &dyn Upstream,
    seqno: SeqNum,
    timestamp: u32,
    payload: &[u8],
) {
    if payload.len() > MAX_PACKET {
        log::warn!(
            "dropping oversized packet of {} bytes, seqno {}",
            payload.len(),
            seqno
        );
        return;
    }

    let mut state = shared.stream.lock();
    state.packet_count += 1;
    state.time_of_last_audio_packet = Some(shared.clock.now());

    if !state.connection_state_to_output {
        return;
    }

    let boundary = shared.flush.lock().rtp_timestamp;
    if boundary != 0 && (timestamp == boundary || seq::ts_after(timestamp, boundary)) {
        log::debug!(
            "dropping flushed packet, seqno {}, timestamp {}, flushing to {}",
            seqno,
            timestamp,
            boundary
        );
    } else {
        if boundary != 0 && seq::ts_after(boundary, timestamp) {
            // First packet past the flush boundary; the filter comes off.
            shared.flush.lock().rtp_timestamp = 0;
        }
        deposit(&mut state, upstream, seqno, timestamp, payload);
    }

    shared.flowcontrol.notify_one();
}

fn deposit(
    state: &mut StreamState,
    upstream: &dyn Upstream,
    seqno: SeqNum,
    timestamp: u32,
    payload: &[u8],
) {
    if !state.synced {
        log::debug!("syncing to seqno {}", seqno);
        state.ab_write = seqno;
        state.ab_read = seqno;
        state.synced = true;
    }

    let origin = state.ab_read;
    let target = if seqno == state.ab_write {
        // The packet we were expecting.
        state.ab_write = seqno.successor();
        Some(seqno)
    } else if seq::after(origin, state.ab_write, seqno) {
        // Newer than expected: everything in between becomes a hole and is
        // asked for again in a single request.
        let gap =
            seq::ordinate(origin, seqno.predecessor()) - seq::ordinate(origin, state.ab_write) + 1;
        if gap <= 0 {
            log::warn!("unexpected gap size: {}", gap);
        }
        for i in 0..gap.max(0) as u16 {
            state.ring.clear(state.ab_write.offset(i));
        }
        upstream.request_resend(state.ab_write, gap.max(0) as u32);
        state.resend_requests += 1;
        state.ab_write = seqno.successor();
        Some(seqno)
    } else if seq::after(origin, origin, seqno) {
        // Late, but its slot has not been played yet.
        state.late_packets += 1;
        Some(seqno)
    } else {
        state.too_late_packets += 1;
        None
    };

    if let Some(target) = target {
        if let Err(e) = decode_into_slot(state, target, timestamp, payload) {
            log::error!(
                "decoder failed on seqno {}: {}; requesting shutdown",
                target,
                e
            );
            upstream.request_shutdown();
        }
    }
}

fn decode_into_slot(
    state: &mut StreamState,
    seqno: SeqNum,
    timestamp: u32,
    payload: &[u8],
) -> Result<()> {
    let expected = state.ring.samples_per_packet();
    let StreamState {
        ring,
        cipher,
        decoder,
        packet_scratch,
        ..
    } = state;
    let slot = ring.slot_mut(seqno);

    let plain: &[u8] = match cipher {
        Some(cipher) => {
            let len = cipher.decrypt(payload, packet_scratch)?;
            &packet_scratch[..len]
        }
        None => payload,
    };

    let wrote = decoder.decode(plain, &mut slot.data)?;
    if wrote != expected {
        return Err(Error::Decode(format!(
            "decoded {} samples, expected {}",
            wrote, expected
        )));
    }

    slot.ready = true;
    slot.timestamp = timestamp;
    slot.sequence = seqno;
    Ok(())
}
