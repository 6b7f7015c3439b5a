//! Reliable message channel constants.

/// Maximum messages packed into one connection packet.
pub const MAX_MESSAGES_PER_PACKET: usize = rampart_core::constants::MAX_MESSAGES_PER_PACKET;

/// Send queue capacity; also the bound on ids in flight (power of two).
pub const MESSAGE_SEND_QUEUE_SIZE: usize = 1024;

/// How many sent packets' message-id lists are remembered for ack handling.
pub const MESSAGE_SENT_PACKETS_SIZE: usize = 256;

/// Receive window capacity (power of two).
pub const MESSAGE_RECEIVE_QUEUE_SIZE: usize = 1024;

/// Per-packet byte budget for packed messages.
pub const MESSAGE_PACKET_BUDGET: usize = 1024;

/// Minimum interval in seconds between transmissions of one message id.
pub const MESSAGE_RESEND_RATE: f64 = 0.1;

/// Stop packing once fewer than this many budget bits remain.
pub const GIVE_UP_BITS: usize = 64;

/// Per-message wire overhead beyond the payload: the 16-bit id. The type
/// tag's width depends on the message factory and is added at runtime.
pub const MESSAGE_ID_BITS: usize = 16;
