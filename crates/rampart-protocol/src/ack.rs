//! Per-packet acknowledgement tracking.
//!
//! Every outgoing packet is stamped with `(sequence, ack, ack_bits)`: its
//! own sequence number, the most recent sequence received from the peer,
//! and a 32-bit bitmap where bit `i` acknowledges `ack - i`. Redundantly
//! acking the last 33 packets on every send is what makes acknowledgement
//! survive the loss of individual packets without any dedicated ack
//! traffic.
//!
//! [`AckSystem`] guarantees each sent sequence fires its ack event at most
//! once, however many times the peer's bitmaps repeat it.

use rampart_core::sequence::SequenceBuffer;

/// Sliding-window size for sent and received packet tracking.
pub const SLIDING_WINDOW_SIZE: usize = 256;

#[derive(Debug, Default, Clone, Copy)]
struct SentPacketData {
    acked: bool,
}

/// Presence in the buffer is the entire payload.
#[derive(Debug, Default, Clone, Copy)]
struct ReceivedPacketData;

/// Sent/received sequence windows for one endpoint of a connection.
#[derive(Debug)]
pub struct AckSystem {
    sent_packets: SequenceBuffer<SentPacketData>,
    received_packets: SequenceBuffer<ReceivedPacketData>,
}

impl Default for AckSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl AckSystem {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sent_packets: SequenceBuffer::new(SLIDING_WINDOW_SIZE),
            received_packets: SequenceBuffer::new(SLIDING_WINDOW_SIZE),
        }
    }

    /// The sequence number the next outgoing packet will carry.
    #[must_use]
    pub fn next_sequence(&self) -> u16 {
        self.sent_packets.sequence()
    }

    /// Stamp an outgoing packet: assign its sequence, record it as sent and
    /// unacked, and generate the receive-side piggyback.
    pub fn stamp_outgoing(&mut self) -> (u16, u16, u32) {
        let (ack, ack_bits) = self.ack_bits();
        let sequence = self.sent_packets.sequence();
        self.sent_packets
            .insert(sequence)
            .expect("the next sequence is always insertable");
        (sequence, ack, ack_bits)
    }

    /// `(ack, ack_bits)` for the current receive window.
    #[must_use]
    pub fn ack_bits(&self) -> (u16, u32) {
        let ack = self.received_packets.sequence().wrapping_sub(1);
        let mut ack_bits = 0u32;
        for i in 0..32u16 {
            if self.received_packets.exists(ack.wrapping_sub(i)) {
                ack_bits |= 1 << i;
            }
        }
        (ack, ack_bits)
    }

    /// Record an inbound packet sequence. Returns `false` when the sequence
    /// is too old for the window and the packet should be discarded.
    pub fn register_received(&mut self, sequence: u16) -> bool {
        self.received_packets.insert(sequence).is_some()
    }

    /// Walk an inbound `(ack, ack_bits)` pair, invoking `on_ack` once for
    /// each newly acknowledged sent sequence.
    pub fn process_acks(&mut self, ack: u16, ack_bits: u32, mut on_ack: impl FnMut(u16)) {
        let mut bits = ack_bits;
        for i in 0..32u16 {
            if bits & 1 == 1 {
                let sequence = ack.wrapping_sub(i);
                if let Some(entry) = self.sent_packets.find(sequence) {
                    if !entry.acked {
                        entry.acked = true;
                        tracing::trace!(sequence, "packet acked");
                        on_ack(sequence);
                    }
                }
            }
            bits >>= 1;
        }
    }

    pub fn reset(&mut self) {
        self.sent_packets.reset();
        self.received_packets.reset();
    }
}
