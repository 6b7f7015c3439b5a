//! The transport seam between state machines and the network.
//!
//! Client and server endpoints are generic over a [`NetworkInterface`]. An
//! implementation owns the socket (or a test double), the wire codec and
//! any per-address packet encryption; the state machines only ever see
//! whole, already-validated [`Packet`] values with their source address.

use std::net::SocketAddr;

use rampart_core::constants::KEY_BYTES;
use rampart_core::packet::Packet;

/// A non-blocking packet transport.
pub trait NetworkInterface {
    /// Queue `packet` for delivery to `to`. Transports drop packets they
    /// cannot send; delivery is never guaranteed at this layer.
    fn send_packet(&mut self, to: SocketAddr, packet: Packet);

    /// Take the next received packet, or `None` when the receive queue is
    /// drained for this tick.
    fn receive_packet(&mut self) -> Option<(SocketAddr, Packet)>;

    /// Install per-direction AEAD keys for `address`. Transports that do
    /// not encrypt ignore this.
    fn add_encryption_mapping(
        &mut self,
        address: SocketAddr,
        send_key: [u8; KEY_BYTES],
        receive_key: [u8; KEY_BYTES],
    ) {
        let _ = (address, send_key, receive_key);
    }

    /// Drop the encryption mapping for `address`, if any.
    fn remove_encryption_mapping(&mut self, address: SocketAddr) {
        let _ = address;
    }
}
