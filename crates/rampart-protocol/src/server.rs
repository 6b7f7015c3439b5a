//! Server side of the connection handshake.
//!
//! The server never allocates a client slot for an unproven address: a
//! connection request only ever costs a challenge-table entry, and the
//! requester has to echo the challenge salt from its claimed address before
//! a slot is committed. In the secure variant the request must additionally
//! carry a connect token sealed by the matchmaker, which the server opens,
//! validates and checks against the replay guard before even consulting the
//! challenge table.
//!
//! Tick-driven like the client: [`Server::send_packets`] emits keep-alives,
//! [`Server::receive_packets`] drains the interface,
//! [`Server::check_for_timeout`] sweeps silent clients.

use std::net::SocketAddr;

use rampart_core::constants::KEY_BYTES;
use rampart_core::packet::{ConnectionRequestPacket, DeniedReason, Packet};
use rampart_crypto::aead::random_u64;
use rampart_crypto::token::ConnectToken;

use crate::challenge::ChallengeTable;
use crate::constants::{
    CHALLENGE_SEND_RATE, CONNECTION_CONFIRM_SEND_RATE, CONNECTION_KEEP_ALIVE_SEND_RATE,
    KEEP_ALIVE_TIME_OUT, MAX_CLIENTS, NEVER_SENT,
};
use crate::interface::NetworkInterface;
use crate::replay::ReplayGuard;
use crate::time::{send_due, timed_out};

/// How connection requests are authenticated.
#[derive(Debug, Clone)]
pub enum Security {
    /// Accept any request; the client's random salt is its identity.
    Insecure,
    /// Require a matchmaker connect token sealed under `private_key`.
    Secure { private_key: [u8; KEY_BYTES] },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_clients: usize,
    /// The address clients reach this server at; secure tokens must list it.
    pub public_address: SocketAddr,
    pub protocol_id: u32,
    pub security: Security,
}

impl ServerConfig {
    #[must_use]
    pub fn insecure(public_address: SocketAddr, protocol_id: u32) -> Self {
        Self {
            max_clients: MAX_CLIENTS,
            public_address,
            protocol_id,
            security: Security::Insecure,
        }
    }

    #[must_use]
    pub fn secure(
        public_address: SocketAddr,
        protocol_id: u32,
        private_key: [u8; KEY_BYTES],
    ) -> Self {
        Self {
            max_clients: MAX_CLIENTS,
            public_address,
            protocol_id,
            security: Security::Secure { private_key },
        }
    }
}

#[derive(Debug, Clone)]
struct ClientSlot {
    connected: bool,
    client_id: u64,
    address: Option<SocketAddr>,
    connect_time: f64,
    last_packet_send_time: f64,
    last_packet_receive_time: f64,
}

impl ClientSlot {
    fn empty() -> Self {
        Self {
            connected: false,
            client_id: 0,
            address: None,
            connect_time: 0.0,
            last_packet_send_time: NEVER_SENT,
            last_packet_receive_time: NEVER_SENT,
        }
    }
}

/// A connection-accepting server endpoint.
#[derive(Debug)]
pub struct Server<I: NetworkInterface> {
    io: I,
    config: ServerConfig,
    num_connected_clients: usize,
    slots: Vec<ClientSlot>,
    challenges: ChallengeTable,
    replay: ReplayGuard,
}

impl<I: NetworkInterface> Server<I> {
    #[must_use]
    pub fn new(io: I, config: ServerConfig) -> Self {
        assert!(config.max_clients > 0 && config.max_clients <= MAX_CLIENTS);
        let slots = vec![ClientSlot::empty(); config.max_clients];
        Self {
            io,
            config,
            num_connected_clients: 0,
            slots,
            challenges: ChallengeTable::new(random_u64()),
            replay: ReplayGuard::new(),
        }
    }

    #[must_use]
    pub fn connected_client_count(&self) -> usize {
        self.num_connected_clients
    }

    #[must_use]
    pub fn is_client_connected(&self, index: usize) -> bool {
        self.slots[index].connected
    }

    #[must_use]
    pub fn client_id(&self, index: usize) -> u64 {
        self.slots[index].client_id
    }

    #[must_use]
    pub fn client_address(&self, index: usize) -> Option<SocketAddr> {
        self.slots[index].address
    }

    /// When the client in `index` completed its handshake.
    #[must_use]
    pub fn client_connect_time(&self, index: usize) -> f64 {
        self.slots[index].connect_time
    }

    /// Challenge-table load, exposed for flood monitoring.
    #[must_use]
    pub fn challenge_occupancy(&self) -> usize {
        self.challenges.occupancy()
    }

    #[must_use]
    pub fn interface(&self) -> &I {
        &self.io
    }

    #[must_use]
    pub fn interface_mut(&mut self) -> &mut I {
        &mut self.io
    }

    /// Send a keep-alive to every connected client that is due one.
    pub fn send_packets(&mut self, now: f64) {
        for index in 0..self.slots.len() {
            if !self.slots[index].connected {
                continue;
            }
            if send_due(
                self.slots[index].last_packet_send_time,
                CONNECTION_KEEP_ALIVE_SEND_RATE,
                now,
            ) {
                self.send_to_client(index, Packet::KeepAlive, now);
            }
        }
    }

    /// Drain the interface and run the handshake over each packet.
    pub fn receive_packets(&mut self, now: f64) {
        while let Some((from, packet)) = self.io.receive_packet() {
            match packet {
                Packet::ConnectionRequest(request) => {
                    self.process_connection_request(&request, from, now);
                }
                Packet::ConnectionResponse { challenge_salt } => {
                    self.process_connection_response(challenge_salt, from, now);
                }
                Packet::KeepAlive => self.process_keep_alive(from, now),
                Packet::Disconnect => self.process_disconnect(from, now),
                _ => {}
            }
        }
    }

    /// Disconnect every client that has gone silent too long.
    pub fn check_for_timeout(&mut self, now: f64) {
        for index in 0..self.slots.len() {
            if !self.slots[index].connected {
                continue;
            }
            if timed_out(
                self.slots[index].last_packet_receive_time,
                KEEP_ALIVE_TIME_OUT,
                now,
            ) {
                tracing::debug!(
                    index,
                    client_id = self.slots[index].client_id,
                    "client timed out"
                );
                self.disconnect_client(index, now);
            }
        }
    }

    /// Tear down a connected client, sending a courtesy disconnect.
    /// Idempotent: disconnecting a free slot is a no-op.
    pub fn disconnect_client(&mut self, index: usize, now: f64) {
        if !self.slots[index].connected {
            return;
        }
        tracing::debug!(index, client_id = self.slots[index].client_id, "client disconnected");
        self.send_to_client(index, Packet::Disconnect, now);
        if let Some(address) = self.slots[index].address {
            self.io.remove_encryption_mapping(address);
        }
        self.slots[index] = ClientSlot::empty();
        self.num_connected_clients -= 1;
    }

    // ------------------------------------------------------------------ //
    // Handshake: connection request
    // ------------------------------------------------------------------ //

    fn process_connection_request(
        &mut self,
        request: &ConnectionRequestPacket,
        from: SocketAddr,
        now: f64,
    ) {
        tracing::trace!(%from, "processing connection request");

        // identity is the token's client id when secure, the salt otherwise
        let client_id = match self.authenticate_request(request, from, now) {
            Some(client_id) => client_id,
            None => return,
        };

        // exact reconnect: the confirming keep-alive may have been lost
        if let Some(index) = self.find_client_index(from, client_id) {
            if send_due(
                self.slots[index].last_packet_send_time,
                CONNECTION_CONFIRM_SEND_RATE,
                now,
            ) {
                self.send_to_client(index, Packet::KeepAlive, now);
            }
            return;
        }

        // same address or same id connected elsewhere: refuse
        if self.is_address_connected(from) || self.is_id_connected(client_id) {
            tracing::debug!(%from, client_id, "denied: already connected");
            self.io
                .send_packet(from, Packet::ConnectionDenied(DeniedReason::AlreadyConnected));
            return;
        }

        if self.num_connected_clients == self.config.max_clients {
            tracing::debug!(%from, "denied: server is full");
            self.io
                .send_packet(from, Packet::ConnectionDenied(DeniedReason::ServerFull));
            return;
        }

        let challenge_salt = random_u64();
        let Some(entry) = self
            .challenges
            .find_or_insert(from, client_id, challenge_salt, now)
        else {
            return; // table pressure or slot collision: drop silently
        };
        let salt = entry.challenge_salt;
        if send_due(entry.last_packet_send_time, CHALLENGE_SEND_RATE, now) {
            tracing::debug!(%from, client_id, "sending connection challenge");
            self.io
                .send_packet(from, Packet::ConnectionChallenge { challenge_salt: salt });
            self.challenges.touch_send_time(from, client_id, now);
        }
    }

    /// Validate the request's credentials and return the client identity.
    fn authenticate_request(
        &mut self,
        request: &ConnectionRequestPacket,
        from: SocketAddr,
        now: f64,
    ) -> Option<u64> {
        let Security::Secure { private_key } = &self.config.security else {
            return Some(request.client_salt);
        };

        let Some(token_data) = request.token.as_deref() else {
            tracing::debug!(%from, "request without token on a secure server, dropped");
            return None;
        };
        // tokens carry wall-ish timestamps on the same timebase as `now`
        let timestamp = now.max(0.0) as u64;
        let token = match ConnectToken::open(
            token_data,
            private_key,
            self.config.protocol_id,
            timestamp,
        ) {
            Ok(token) => token,
            Err(error) => {
                tracing::debug!(%from, %error, "connect token rejected");
                return None;
            }
        };
        if !token.permits_address(self.config.public_address) {
            tracing::debug!(%from, "token does not permit this server");
            return None;
        }
        if !self
            .replay
            .check_and_remember(token.client_id, token.expiry_timestamp, from, timestamp)
        {
            return None;
        }

        // per-direction session keys: we send under server_to_client
        self.io.add_encryption_mapping(
            from,
            token.server_to_client_key,
            token.client_to_server_key,
        );
        Some(token.client_id)
    }

    // ------------------------------------------------------------------ //
    // Handshake: challenge response
    // ------------------------------------------------------------------ //

    fn process_connection_response(&mut self, challenge_salt: u64, from: SocketAddr, now: f64) {
        // response resends after the confirming keep-alive was lost
        if let Some(index) = self.find_client_index_by_address(from) {
            if send_due(
                self.slots[index].last_packet_send_time,
                CONNECTION_CONFIRM_SEND_RATE,
                now,
            ) {
                self.send_to_client(index, Packet::KeepAlive, now);
            }
            return;
        }

        let Some(entry) = self.challenges.find_response(from, challenge_salt, now) else {
            tracing::debug!(%from, "challenge response without matching challenge, dropped");
            return;
        };
        let client_id = entry.client_id;
        let entry_send_time = entry.last_packet_send_time;

        if self.num_connected_clients == self.config.max_clients {
            if send_due(entry_send_time, CHALLENGE_SEND_RATE, now) {
                tracing::debug!(%from, "denied at response: server is full");
                self.io
                    .send_packet(from, Packet::ConnectionDenied(DeniedReason::ServerFull));
                self.challenges.touch_send_time(from, client_id, now);
            }
            return;
        }

        let index = self
            .find_free_client_index()
            .expect("a non-full server always has a free slot");
        self.connect_client(index, from, client_id, now);
    }

    fn connect_client(&mut self, index: usize, address: SocketAddr, client_id: u64, now: f64) {
        tracing::debug!(index, client_id, %address, "client connected");
        self.num_connected_clients += 1;
        self.slots[index] = ClientSlot {
            connected: true,
            client_id,
            address: Some(address),
            connect_time: now,
            last_packet_send_time: now,
            last_packet_receive_time: now,
        };
        // confirm immediately; the keep-alive is what moves the client to
        // its connected state
        self.io.send_packet(address, Packet::KeepAlive);
    }

    // ------------------------------------------------------------------ //
    // Established-connection packets
    // ------------------------------------------------------------------ //

    fn process_keep_alive(&mut self, from: SocketAddr, now: f64) {
        if let Some(index) = self.find_client_index_by_address(from) {
            self.slots[index].last_packet_receive_time = now;
        }
    }

    fn process_disconnect(&mut self, from: SocketAddr, now: f64) {
        if let Some(index) = self.find_client_index_by_address(from) {
            self.disconnect_client(index, now);
        }
    }

    // ------------------------------------------------------------------ //
    // Slot lookups
    // ------------------------------------------------------------------ //

    fn find_client_index(&self, address: SocketAddr, client_id: u64) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.connected && slot.address == Some(address) && slot.client_id == client_id
        })
    }

    fn find_client_index_by_address(&self, address: SocketAddr) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.connected && slot.address == Some(address))
    }

    fn find_free_client_index(&self) -> Option<usize> {
        self.slots.iter().position(|slot| !slot.connected)
    }

    fn is_address_connected(&self, address: SocketAddr) -> bool {
        self.find_client_index_by_address(address).is_some()
    }

    fn is_id_connected(&self, client_id: u64) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.connected && slot.client_id == client_id)
    }

    fn send_to_client(&mut self, index: usize, packet: Packet, now: f64) {
        let address = self.slots[index]
            .address
            .expect("connected slots always have an address");
        self.io.send_packet(address, packet);
        self.slots[index].last_packet_send_time = now;
    }
}
