//! Non-blocking UDP packet transport.
//!
//! One datagram carries one packet. The first byte says how to read the
//! rest:
//!
//! ```text
//! 0x00 || codec bytes                      cleartext
//! 0x01 || nonce counter (u64 LE) || AEAD(codec bytes)   encrypted
//! ```
//!
//! With encryption enabled, every packet type except the connection request
//! is sealed under the per-address mapping installed during the token
//! exchange; the request itself must stay cleartext because the server has
//! no keys for an address until it has opened the request's token.
//! Datagrams that fail to authenticate, arrive from an unmapped address, or
//! arrive cleartext where encryption is required are dropped whole — they
//! never reach the state machines.

use std::net::{SocketAddr, UdpSocket};
use std::rc::Rc;

use rampart_core::constants::{AUTH_BYTES, KEY_BYTES, NONCE_BYTES};
use rampart_core::message::MessageFactory;
use rampart_core::packet::Packet;
use rampart_crypto::aead;
use rampart_protocol::interface::NetworkInterface;

use crate::error::InterfaceError;

const PREFIX_CLEAR: u8 = 0x00;
const PREFIX_ENCRYPTED: u8 = 0x01;

/// Encrypted framing overhead: prefix, nonce counter, auth tag.
pub const ENCRYPTION_OVERHEAD: usize = 1 + 8 + AUTH_BYTES;

/// Most simultaneous per-address key mappings.
pub const MAX_ENCRYPTION_MAPPINGS: usize = 1024;

/// Configuration for a [`UdpInterface`].
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Local address to bind; port 0 picks an ephemeral port.
    pub bind_address: SocketAddr,
    /// Largest datagram accepted in either direction.
    pub max_packet_size: usize,
    /// Require AEAD for everything except connection requests.
    pub encryption: bool,
}

impl UdpConfig {
    #[must_use]
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            max_packet_size: 4096,
            encryption: false,
        }
    }

    #[must_use]
    pub fn encrypted(bind_address: SocketAddr) -> Self {
        Self {
            encryption: true,
            ..Self::new(bind_address)
        }
    }
}

#[derive(Clone)]
struct EncryptionMapping {
    address: SocketAddr,
    send_key: [u8; KEY_BYTES],
    receive_key: [u8; KEY_BYTES],
}

/// A non-blocking UDP transport speaking the packet codec.
pub struct UdpInterface {
    socket: UdpSocket,
    factory: Rc<dyn MessageFactory>,
    config: UdpConfig,
    mappings: Vec<EncryptionMapping>,
    next_nonce: u64,
    receive_buffer: Vec<u8>,
}

impl UdpInterface {
    /// Bind a non-blocking socket. Bind failure makes the endpoint
    /// unusable, so it surfaces here rather than being logged away.
    pub fn new(config: UdpConfig, factory: Rc<dyn MessageFactory>) -> Result<Self, InterfaceError> {
        let socket = UdpSocket::bind(config.bind_address).map_err(InterfaceError::Bind)?;
        socket.set_nonblocking(true)?;
        tracing::debug!(local = ?socket.local_addr(), "udp interface bound");
        let receive_buffer = vec![0u8; config.max_packet_size];
        Ok(Self {
            socket,
            factory,
            config,
            mappings: Vec::new(),
            next_nonce: 0,
            receive_buffer,
        })
    }

    pub fn local_address(&self) -> Result<SocketAddr, InterfaceError> {
        Ok(self.socket.local_addr()?)
    }

    fn find_mapping(&self, address: SocketAddr) -> Option<&EncryptionMapping> {
        self.mappings.iter().find(|m| m.address == address)
    }

    fn encode_datagram(&mut self, to: SocketAddr, packet: &Packet) -> Option<Vec<u8>> {
        let bytes = match packet.write(self.factory.as_ref()) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(%error, "failed to serialize outgoing packet");
                return None;
            }
        };

        let encrypt = self.config.encryption && !matches!(packet, Packet::ConnectionRequest(_));
        if !encrypt {
            let mut datagram = Vec::with_capacity(1 + bytes.len());
            datagram.push(PREFIX_CLEAR);
            datagram.extend_from_slice(&bytes);
            return Some(datagram);
        }

        let Some(send_key) = self.find_mapping(to).map(|m| m.send_key) else {
            tracing::warn!(%to, "no encryption mapping for destination, packet dropped");
            return None;
        };
        let counter = self.next_nonce;
        self.next_nonce += 1;
        let nonce = aead::counter_nonce(counter);
        let sealed = match aead::encrypt(&bytes, &[PREFIX_ENCRYPTED], &nonce, &send_key) {
            Ok(sealed) => sealed,
            Err(error) => {
                tracing::warn!(%error, "packet encryption failed");
                return None;
            }
        };
        let mut datagram = Vec::with_capacity(1 + 8 + sealed.len());
        datagram.push(PREFIX_ENCRYPTED);
        datagram.extend_from_slice(&counter.to_le_bytes());
        datagram.extend_from_slice(&sealed);
        Some(datagram)
    }

    fn decode_datagram(&self, data: &[u8], from: SocketAddr) -> Option<Packet> {
        let (&prefix, body) = data.split_first()?;
        match prefix {
            PREFIX_CLEAR => {
                let packet = match Packet::read(body, self.factory.as_ref()) {
                    Ok(packet) => packet,
                    Err(error) => {
                        tracing::debug!(%from, %error, "malformed packet dropped");
                        return None;
                    }
                };
                if self.config.encryption && !matches!(packet, Packet::ConnectionRequest(_)) {
                    tracing::debug!(%from, "cleartext packet where encryption is required");
                    return None;
                }
                Some(packet)
            }
            PREFIX_ENCRYPTED => {
                let Some(mapping) = self.find_mapping(from) else {
                    tracing::debug!(%from, "encrypted packet from unmapped address dropped");
                    return None;
                };
                if body.len() < 8 + AUTH_BYTES {
                    tracing::debug!(%from, "runt encrypted packet dropped");
                    return None;
                }
                let counter = u64::from_le_bytes(body[..8].try_into().expect("checked length"));
                let nonce: [u8; NONCE_BYTES] = aead::counter_nonce(counter);
                let plaintext =
                    match aead::decrypt(&body[8..], &[PREFIX_ENCRYPTED], &nonce, &mapping.receive_key)
                    {
                        Ok(plaintext) => plaintext,
                        Err(_) => {
                            tracing::debug!(%from, "packet failed authentication, dropped");
                            return None;
                        }
                    };
                match Packet::read(&plaintext, self.factory.as_ref()) {
                    Ok(packet) => Some(packet),
                    Err(error) => {
                        tracing::debug!(%from, %error, "malformed packet dropped");
                        None
                    }
                }
            }
            _ => {
                tracing::debug!(%from, prefix, "unknown datagram prefix dropped");
                None
            }
        }
    }
}

impl NetworkInterface for UdpInterface {
    fn send_packet(&mut self, to: SocketAddr, packet: Packet) {
        let Some(datagram) = self.encode_datagram(to, &packet) else {
            return;
        };
        if datagram.len() > self.config.max_packet_size {
            tracing::warn!(
                size = datagram.len(),
                max = self.config.max_packet_size,
                "oversized packet dropped"
            );
            return;
        }
        if let Err(error) = self.socket.send_to(&datagram, to) {
            tracing::warn!(%to, %error, "udp send failed");
        }
    }

    fn receive_packet(&mut self) -> Option<(SocketAddr, Packet)> {
        loop {
            let mut buffer = std::mem::take(&mut self.receive_buffer);
            let result = self.socket.recv_from(&mut buffer);
            self.receive_buffer = buffer;
            match result {
                Ok((length, from)) => {
                    let data = &self.receive_buffer[..length];
                    if let Some(packet) = self.decode_datagram(data, from) {
                        return Some((from, packet));
                    }
                    // malformed datagram: keep draining the socket
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => return None,
                Err(error) => {
                    tracing::warn!(%error, "udp receive failed");
                    return None;
                }
            }
        }
    }

    fn add_encryption_mapping(
        &mut self,
        address: SocketAddr,
        send_key: [u8; KEY_BYTES],
        receive_key: [u8; KEY_BYTES],
    ) {
        if let Some(mapping) = self.mappings.iter_mut().find(|m| m.address == address) {
            mapping.send_key = send_key;
            mapping.receive_key = receive_key;
            return;
        }
        if self.mappings.len() >= MAX_ENCRYPTION_MAPPINGS {
            tracing::warn!(%address, "encryption mapping table full");
            return;
        }
        self.mappings.push(EncryptionMapping {
            address,
            send_key,
            receive_key,
        });
    }

    fn remove_encryption_mapping(&mut self, address: SocketAddr) {
        self.mappings.retain(|m| m.address != address);
    }
}
