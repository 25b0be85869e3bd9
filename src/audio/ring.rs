// ABOUTME: Fixed-size ring of decoded-PCM slots indexed by sequence number
// ABOUTME: Slot buffers are allocated once per session and never reallocated

use crate::audio::CHANNELS;
use crate::protocol::SeqNum;

/// Number of slots in the ring. Must be a power of two so that indexing by
/// `seq mod BUFFER_FRAMES` distributes wrapped sequence numbers evenly.
pub const BUFFER_FRAMES: usize = 512;

/// One decoded packet's worth of PCM, plus the identity it arrived under.
///
/// `ready == false` means the slot is a hole: missing, not yet arrived,
/// already consumed, or flushed.
pub struct Slot {
    /// Whether `data` holds authoritative PCM for `sequence`.
    pub ready: bool,
    /// Media timestamp of the packet in this slot.
    pub timestamp: u32,
    /// Sequence number of the packet in this slot.
    pub sequence: SeqNum,
    /// Interleaved stereo PCM, exactly one packet long.
    pub data: Box<[i16]>,
}

/// Ring of [`BUFFER_FRAMES`] slots keyed by wrapping sequence number.
///
/// The slot buffers form an arena owned by the ring for the whole session;
/// a slot's `ready` flag is the single bit that transfers effective
/// ownership of the PCM bytes between the ingress and egress threads.
pub struct FrameRing {
    slots: Vec<Slot>,
    samples_per_packet: usize,
}

impl FrameRing {
    /// Allocate a ring for packets of `frame_size` stereo frames.
    pub fn new(frame_size: usize) -> Self {
        let samples_per_packet = frame_size * CHANNELS;
        let slots = (0..BUFFER_FRAMES)
            .map(|_| Slot {
                ready: false,
                timestamp: 0,
                sequence: SeqNum(0),
                data: vec![0i16; samples_per_packet].into_boxed_slice(),
            })
            .collect();
        Self {
            slots,
            samples_per_packet,
        }
    }

    /// The slot index a sequence number maps to.
    #[inline]
    pub fn index(seq: SeqNum) -> usize {
        seq.0 as usize % BUFFER_FRAMES
    }

    /// Borrow the slot for `seq`.
    #[inline]
    pub fn slot(&self, seq: SeqNum) -> &Slot {
        &self.slots[Self::index(seq)]
    }

    /// Mutably borrow the slot for `seq`.
    #[inline]
    pub fn slot_mut(&mut self, seq: SeqNum) -> &mut Slot {
        &mut self.slots[Self::index(seq)]
    }

    /// Turn the slot for `seq` back into a hole.
    pub fn clear(&mut self, seq: SeqNum) {
        let slot = self.slot_mut(seq);
        slot.ready = false;
        slot.timestamp = 0;
        slot.sequence = SeqNum(0);
    }

    /// Turn every slot back into a hole. Buffers stay allocated.
    pub fn resync(&mut self) {
        for slot in &mut self.slots {
            slot.ready = false;
            slot.sequence = SeqNum(0);
        }
    }

    /// Interleaved i16 sample count of one packet.
    #[inline]
    pub fn samples_per_packet(&self) -> usize {
        self.samples_per_packet
    }
}
