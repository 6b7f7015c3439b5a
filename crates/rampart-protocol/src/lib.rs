//! Connection state machines for the rampart client/server protocol.
//!
//! This crate implements the stateful protocol logic: per-packet
//! acknowledgement tracking, the reliable-ordered message channel, the
//! challenge/response handshake on both the client and server side, and the
//! server's flood-resistant challenge table. Everything is tick-driven and
//! single-threaded; time is a monotonic `f64` supplied by the caller, and
//! packets move through a caller-provided [`interface::NetworkInterface`].

pub mod ack;
pub mod challenge;
pub mod channel;
pub mod client;
pub mod constants;
pub mod error;
pub mod interface;
pub mod replay;
pub mod server;
pub mod time;
