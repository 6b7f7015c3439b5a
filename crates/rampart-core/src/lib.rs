//! Wire-level foundations for the rampart client/server protocol.
//!
//! This crate holds everything below the state machines: wrapping 16-bit
//! sequence arithmetic and the sliding-window [`sequence::SequenceBuffer`],
//! the bit-packed serialization streams, the application message model, and
//! the packet sum type with its codec. The connection state machines live in
//! `rampart-protocol`; transports live in `rampart-interfaces`.

pub mod constants;
pub mod error;
pub mod message;
pub mod packet;
pub mod sequence;
pub mod stream;
