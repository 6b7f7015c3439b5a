//! Reliable-ordered message delivery over unreliable sequenced packets.
//!
//! The [`Channel`] owns a send queue, a receive window and the ack system.
//! Sending assigns each message the next 16-bit id; every outgoing packet
//! re-packs, oldest-first, whatever unacked messages are due for (re)send
//! and fit the packet budget. Acks release messages from the send queue;
//! the receive side buffers out-of-order arrivals and hands messages to the
//! application strictly in id order with no gaps and no duplicates.
//!
//! A packet carrying a message beyond the receive window is not recorded as
//! received at all — acking it would let the sender stop resending a
//! message this side has no room to store.
//!
//! Send-queue overflow and measure failures are sticky: the channel shuts
//! down until [`Channel::reset`], because dropping a single message would
//! silently break the ordering guarantee.

pub mod constants;

use std::rc::Rc;

use rampart_core::message::{Message, MessageFactory, MessageHandle, MessagePayload};
use rampart_core::packet::ConnectionPacket;
use rampart_core::sequence::{SequenceBuffer, sequence_greater_than, sequence_less_than};
use rampart_core::stream::{MeasureStream, Stream, bits_required};

use crate::ack::AckSystem;
use crate::error::ChannelError;
use self::constants::*;

#[derive(Debug, Default)]
struct SendQueueEntry {
    message: Option<MessageHandle>,
    time_last_sent: f64,
    measured_bits: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct SentPacketEntry {
    time_sent: f64,
    num_message_ids: u16,
    acked: bool,
}

#[derive(Debug, Default)]
struct ReceiveQueueEntry {
    message: Option<MessageHandle>,
}

/// One endpoint of a reliable-ordered message stream.
#[derive(Debug)]
pub struct Channel {
    error: Option<ChannelError>,
    acks: AckSystem,

    message_overhead_bits: usize,

    send_message_id: u16,
    receive_message_id: u16,
    oldest_unacked_message_id: u16,

    send_queue: SequenceBuffer<SendQueueEntry>,
    sent_packets: SequenceBuffer<SentPacketEntry>,
    receive_queue: SequenceBuffer<ReceiveQueueEntry>,

    /// Message ids per sent packet, `MAX_MESSAGES_PER_PACKET` per slot,
    /// indexed by the sent-packet buffer slot. One allocation, reused for
    /// the life of the channel.
    sent_packet_message_ids: Vec<u16>,
}

impl Channel {
    /// Create a channel for messages of the given factory's types.
    #[must_use]
    pub fn new(factory: &dyn MessageFactory) -> Self {
        let type_bits = bits_required(0, u32::from(factory.max_message_type())) as usize;
        Self {
            error: None,
            acks: AckSystem::new(),
            message_overhead_bits: MESSAGE_ID_BITS + type_bits,
            send_message_id: 0,
            receive_message_id: 0,
            oldest_unacked_message_id: 0,
            send_queue: SequenceBuffer::new(MESSAGE_SEND_QUEUE_SIZE),
            sent_packets: SequenceBuffer::new(MESSAGE_SENT_PACKETS_SIZE),
            receive_queue: SequenceBuffer::new(MESSAGE_RECEIVE_QUEUE_SIZE),
            sent_packet_message_ids: vec![0; MAX_MESSAGES_PER_PACKET * MESSAGE_SENT_PACKETS_SIZE],
        }
    }

    /// The sticky error, if the channel has shut down.
    #[must_use]
    pub fn error(&self) -> Option<&ChannelError> {
        self.error.as_ref()
    }

    /// Whether another message can be queued right now.
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.error.is_none() && self.send_queue.available(self.send_message_id)
    }

    /// Id the next sent message will be assigned.
    #[must_use]
    pub fn send_message_id(&self) -> u16 {
        self.send_message_id
    }

    /// Oldest message id not yet acknowledged.
    #[must_use]
    pub fn oldest_unacked_message_id(&self) -> u16 {
        self.oldest_unacked_message_id
    }

    /// Queue a message for reliable delivery, taking ownership of it.
    pub fn send(
        &mut self,
        msg_type: u16,
        payload: Box<dyn MessagePayload>,
    ) -> Result<(), ChannelError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if !self.send_queue.available(self.send_message_id) {
            self.error = Some(ChannelError::SendQueueFull);
            tracing::warn!("send queue full, channel shutting down");
            return Err(ChannelError::SendQueueFull);
        }

        // measure against half the packet budget so any accepted message is
        // guaranteed to fit a packet on its own
        let mut measure = MeasureStream::with_budget(MESSAGE_PACKET_BUDGET * 8 / 2);
        if let Err(cause) = payload.write(&mut measure) {
            let error = ChannelError::SerializeMeasureFailed(cause);
            self.error = Some(error.clone());
            tracing::warn!(?msg_type, "message measure failed, channel shutting down");
            return Err(error);
        }
        let measured_bits = measure.bits_processed() + self.message_overhead_bits;

        let id = self.send_message_id;
        let message = Rc::new(Message::new(msg_type, id, payload));
        let entry = self
            .send_queue
            .insert(id)
            .expect("slot availability was checked above");
        entry.message = Some(message);
        entry.time_last_sent = -1.0;
        entry.measured_bits = measured_bits;

        self.send_message_id = self.send_message_id.wrapping_add(1);
        tracing::trace!(id, measured_bits, "message queued");
        Ok(())
    }

    /// Take the next in-order message, if it has arrived.
    pub fn receive(&mut self) -> Option<MessageHandle> {
        if self.error.is_some() {
            return None;
        }
        let entry = self.receive_queue.find(self.receive_message_id)?;
        let message = entry
            .message
            .take()
            .expect("receive queue entries always hold a message");
        debug_assert_eq!(message.id(), self.receive_message_id);
        self.receive_queue.remove(self.receive_message_id);
        self.receive_message_id = self.receive_message_id.wrapping_add(1);
        Some(message)
    }

    /// Build the next outgoing packet: stamp sequence and acks, then pack
    /// every unacked message that is due and fits the budget.
    pub fn write_packet(&mut self, now: f64) -> Option<ConnectionPacket> {
        if self.error.is_some() {
            return None;
        }
        let (sequence, ack, ack_bits) = self.acks.stamp_outgoing();
        let message_ids = self.messages_to_send(now);
        self.record_sent_packet(sequence, &message_ids, now);

        let messages = message_ids
            .iter()
            .map(|&id| {
                let entry = self
                    .send_queue
                    .find(id)
                    .expect("packed ids come from live send-queue entries");
                Rc::clone(entry.message.as_ref().expect("send entries hold a message"))
            })
            .collect();

        Some(ConnectionPacket {
            sequence,
            ack,
            ack_bits,
            messages,
        })
    }

    /// Ingest an inbound packet. Returns `false` when the packet was
    /// discarded (early message, stale sequence, or channel shut down);
    /// discarded packets leave no trace in the ack state.
    pub fn read_packet(&mut self, packet: &ConnectionPacket) -> bool {
        if self.error.is_some() {
            return false;
        }
        if !self.process_packet_messages(packet) {
            tracing::debug!(
                sequence = packet.sequence,
                "packet carries early message, discarded"
            );
            return false;
        }
        if !self.acks.register_received(packet.sequence) {
            tracing::debug!(sequence = packet.sequence, "stale packet discarded");
            return false;
        }

        let mut acked = Vec::new();
        self.acks
            .process_acks(packet.ack, packet.ack_bits, |sequence| {
                acked.push(sequence);
            });
        for sequence in acked {
            self.process_message_ack(sequence);
        }
        true
    }

    /// Drop all state, clear any sticky error, and start over from id 0.
    pub fn reset(&mut self) {
        self.error = None;
        self.acks.reset();
        self.send_message_id = 0;
        self.receive_message_id = 0;
        self.oldest_unacked_message_id = 0;
        self.send_queue.reset();
        self.sent_packets.reset();
        self.receive_queue.reset();
    }

    // ------------------------------------------------------------------ //
    // Send path
    // ------------------------------------------------------------------ //

    /// Pick message ids for the next packet, oldest-first, marking each as
    /// sent at `now`.
    fn messages_to_send(&mut self, now: f64) -> Vec<u16> {
        let mut ids = Vec::new();
        if self.send_queue.find(self.oldest_unacked_message_id).is_none() {
            return ids; // queue empty from the oldest-unacked cursor
        }

        let mut available_bits = MESSAGE_PACKET_BUDGET * 8;
        for offset in 0..MESSAGE_SEND_QUEUE_SIZE {
            if available_bits <= GIVE_UP_BITS {
                break;
            }
            let message_id = self.oldest_unacked_message_id.wrapping_add(offset as u16);
            let Some(entry) = self.send_queue.find(message_id) else {
                break; // a gap: ids past it must never be sent first
            };
            if entry.time_last_sent + MESSAGE_RESEND_RATE <= now
                && entry.measured_bits <= available_bits
            {
                entry.time_last_sent = now;
                available_bits -= entry.measured_bits;
                ids.push(message_id);
            }
            if ids.len() == MAX_MESSAGES_PER_PACKET {
                break;
            }
        }
        ids
    }

    fn record_sent_packet(&mut self, sequence: u16, message_ids: &[u16], now: f64) {
        let slot = self.sent_packets.index_of(sequence);
        let entry = self
            .sent_packets
            .insert(sequence)
            .expect("outgoing sequences always advance the window");
        entry.time_sent = now;
        entry.num_message_ids = message_ids.len() as u16;
        entry.acked = false;

        let base = slot * MAX_MESSAGES_PER_PACKET;
        self.sent_packet_message_ids[base..base + message_ids.len()].copy_from_slice(message_ids);
    }

    // ------------------------------------------------------------------ //
    // Ack path
    // ------------------------------------------------------------------ //

    /// A packet we sent was acknowledged: release its messages and advance
    /// the oldest-unacked cursor over any newly contiguous acked prefix.
    fn process_message_ack(&mut self, sequence: u16) {
        let Some(entry) = self.sent_packets.find(sequence) else {
            return;
        };
        if entry.acked {
            return;
        }
        entry.acked = true;
        let count = entry.num_message_ids as usize;

        let base = self.sent_packets.index_of(sequence) * MAX_MESSAGES_PER_PACKET;
        for slot in base..base + count {
            let message_id = self.sent_packet_message_ids[slot];
            if self.send_queue.exists(message_id) {
                tracing::trace!(message_id, "message acked");
                self.send_queue.remove(message_id);
            }
        }
        self.update_oldest_unacked_message_id();
    }

    fn update_oldest_unacked_message_id(&mut self) {
        let stop = self.send_message_id;
        while self.oldest_unacked_message_id != stop
            && !self.send_queue.exists(self.oldest_unacked_message_id)
        {
            self.oldest_unacked_message_id = self.oldest_unacked_message_id.wrapping_add(1);
        }
        debug_assert!(!sequence_greater_than(self.oldest_unacked_message_id, stop));
    }

    // ------------------------------------------------------------------ //
    // Receive path
    // ------------------------------------------------------------------ //

    /// File a packet's messages into the receive window. Returns `false`
    /// when any message lies beyond the window, in which case the packet
    /// must not be acked.
    fn process_packet_messages(&mut self, packet: &ConnectionPacket) -> bool {
        let mut early_message = false;
        let min_message_id = self.receive_message_id;
        let max_message_id = min_message_id.wrapping_add(MESSAGE_RECEIVE_QUEUE_SIZE as u16 - 1);

        for message in &packet.messages {
            let message_id = message.id();
            if sequence_less_than(message_id, min_message_id) {
                continue; // already delivered
            }
            if sequence_greater_than(message_id, max_message_id) {
                early_message = true;
                continue;
            }
            if self.receive_queue.exists(message_id) {
                continue; // duplicate
            }
            let entry = self
                .receive_queue
                .insert(message_id)
                .expect("id is inside the receive window");
            entry.message = Some(Rc::clone(message));
        }
        !early_message
    }
}
