//! Client side of the connection handshake.
//!
//! ```text
//! DISCONNECTED --connect()--> SENDING_CONNECTION_REQUEST
//!     --ConnectionChallenge--> SENDING_CHALLENGE_RESPONSE
//!     --KeepAlive-----------> CONNECTED
//! ```
//!
//! plus terminal failure states for timeouts and denials, observable via
//! [`Client::connection_failed`]. The client is tick-driven: call
//! [`Client::send_packets`], [`Client::receive_packets`] and
//! [`Client::check_for_timeout`] once per tick with the current monotonic
//! time. Every inbound packet is validated against the server address
//! first; packets from anywhere else are ignored without a state change.

use std::net::SocketAddr;

use rampart_core::packet::{ConnectionRequestPacket, DeniedReason, Packet, TokenData};
use rampart_crypto::aead::random_u64;
use rampart_crypto::token::ConnectToken;

use crate::constants::{
    CHALLENGE_RESPONSE_TIME_OUT, CONNECTION_KEEP_ALIVE_SEND_RATE, CONNECTION_REQUEST_SEND_RATE,
    CONNECTION_REQUEST_TIME_OUT, CONNECTION_RESPONSE_SEND_RATE, KEEP_ALIVE_TIME_OUT, NEVER_SENT,
};
use crate::interface::NetworkInterface;
use crate::time::{send_due, timed_out};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    SendingConnectionRequest,
    SendingChallengeResponse,
    Connected,
    ConnectionRequestTimedOut,
    ChallengeResponseTimedOut,
    KeepAliveTimedOut,
    ConnectionDeniedFull,
    ConnectionDeniedAlreadyConnected,
}

/// A connecting or connected client endpoint.
#[derive(Debug)]
pub struct Client<I: NetworkInterface> {
    io: I,
    state: ClientState,
    server_address: Option<SocketAddr>,
    client_salt: u64,
    challenge_salt: u64,
    token: Option<Box<TokenData>>,
    last_packet_send_time: f64,
    last_packet_receive_time: f64,
}

impl<I: NetworkInterface> Client<I> {
    #[must_use]
    pub fn new(io: I) -> Self {
        Self {
            io,
            state: ClientState::Disconnected,
            server_address: None,
            client_salt: 0,
            challenge_salt: 0,
            token: None,
            last_packet_send_time: NEVER_SENT,
            last_packet_receive_time: NEVER_SENT,
        }
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    #[must_use]
    pub fn is_connecting(&self) -> bool {
        matches!(
            self.state,
            ClientState::SendingConnectionRequest | ClientState::SendingChallengeResponse
        )
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    /// Whether the last connection attempt ended in a terminal failure.
    #[must_use]
    pub fn connection_failed(&self) -> bool {
        matches!(
            self.state,
            ClientState::ConnectionRequestTimedOut
                | ClientState::ChallengeResponseTimedOut
                | ClientState::KeepAliveTimedOut
                | ClientState::ConnectionDeniedFull
                | ClientState::ConnectionDeniedAlreadyConnected
        )
    }

    #[must_use]
    pub fn interface(&self) -> &I {
        &self.io
    }

    #[must_use]
    pub fn interface_mut(&mut self) -> &mut I {
        &mut self.io
    }

    /// Begin connecting with a random salt as identity (insecure variant).
    pub fn connect(&mut self, server_address: SocketAddr, now: f64) {
        self.disconnect(now);
        self.client_salt = random_u64();
        self.token = None;
        self.begin_connect(server_address, now);
    }

    /// Begin connecting with a matchmaker token. The session keys from the
    /// clear token are installed on the interface before the first request.
    pub fn connect_secure(
        &mut self,
        server_address: SocketAddr,
        token: &ConnectToken,
        sealed: TokenData,
        now: f64,
    ) {
        self.disconnect(now);
        self.client_salt = token.client_id;
        self.io.add_encryption_mapping(
            server_address,
            token.client_to_server_key,
            token.server_to_client_key,
        );
        self.token = Some(Box::new(sealed));
        self.begin_connect(server_address, now);
    }

    fn begin_connect(&mut self, server_address: SocketAddr, now: f64) {
        tracing::debug!(server = %server_address, "connecting");
        self.server_address = Some(server_address);
        self.state = ClientState::SendingConnectionRequest;
        // one full send interval in the past: the first request goes out on
        // the next tick
        self.last_packet_send_time = now - 1.0;
        self.last_packet_receive_time = now;
    }

    /// Disconnect, sending a courtesy packet when currently connected.
    /// Idempotent; terminal failure states are cleared back to
    /// `Disconnected`.
    pub fn disconnect(&mut self, now: f64) {
        if self.state == ClientState::Connected {
            tracing::debug!("client-side disconnect");
            self.send_to_server(Packet::Disconnect, now);
        }
        self.reset_connection_data();
    }

    /// Emit whatever packet the current state owes the server.
    pub fn send_packets(&mut self, now: f64) {
        match self.state {
            ClientState::SendingConnectionRequest => {
                if send_due(self.last_packet_send_time, CONNECTION_REQUEST_SEND_RATE, now) {
                    let request = Packet::ConnectionRequest(ConnectionRequestPacket {
                        client_salt: self.client_salt,
                        token: self.token.clone(),
                    });
                    self.send_to_server(request, now);
                }
            }
            ClientState::SendingChallengeResponse => {
                if send_due(
                    self.last_packet_send_time,
                    CONNECTION_RESPONSE_SEND_RATE,
                    now,
                ) {
                    let response = Packet::ConnectionResponse {
                        challenge_salt: self.challenge_salt,
                    };
                    self.send_to_server(response, now);
                }
            }
            ClientState::Connected => {
                if send_due(
                    self.last_packet_send_time,
                    CONNECTION_KEEP_ALIVE_SEND_RATE,
                    now,
                ) {
                    self.send_to_server(Packet::KeepAlive, now);
                }
            }
            _ => {}
        }
    }

    /// Drain the interface and run the state machine over each packet.
    pub fn receive_packets(&mut self, now: f64) {
        while let Some((from, packet)) = self.io.receive_packet() {
            let Some(server_address) = self.server_address else {
                continue;
            };
            if from != server_address {
                continue; // not our server, ignore silently
            }
            match packet {
                Packet::ConnectionDenied(reason) => self.process_denied(reason),
                Packet::ConnectionChallenge { challenge_salt } => {
                    self.process_challenge(challenge_salt, now);
                }
                Packet::KeepAlive => self.process_keep_alive(now),
                Packet::Disconnect => self.process_disconnect(now),
                _ => {}
            }
        }
    }

    /// Evaluate the current state's timeout.
    pub fn check_for_timeout(&mut self, now: f64) {
        match self.state {
            ClientState::SendingConnectionRequest => {
                if timed_out(
                    self.last_packet_receive_time,
                    CONNECTION_REQUEST_TIME_OUT,
                    now,
                ) {
                    tracing::debug!("connection request timed out");
                    self.state = ClientState::ConnectionRequestTimedOut;
                }
            }
            ClientState::SendingChallengeResponse => {
                if timed_out(
                    self.last_packet_receive_time,
                    CHALLENGE_RESPONSE_TIME_OUT,
                    now,
                ) {
                    tracing::debug!("challenge response timed out");
                    self.state = ClientState::ChallengeResponseTimedOut;
                }
            }
            ClientState::Connected => {
                if timed_out(self.last_packet_receive_time, KEEP_ALIVE_TIME_OUT, now) {
                    tracing::debug!("keep-alive timed out");
                    // courtesy disconnect, then park in the terminal state
                    self.send_to_server(Packet::Disconnect, now);
                    self.state = ClientState::KeepAliveTimedOut;
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------ //
    // Packet handlers
    // ------------------------------------------------------------------ //

    fn process_denied(&mut self, reason: DeniedReason) {
        if self.state != ClientState::SendingConnectionRequest {
            return;
        }
        tracing::debug!(?reason, "connection denied by server");
        self.state = match reason {
            DeniedReason::ServerFull => ClientState::ConnectionDeniedFull,
            DeniedReason::AlreadyConnected => ClientState::ConnectionDeniedAlreadyConnected,
        };
    }

    fn process_challenge(&mut self, challenge_salt: u64, now: f64) {
        if self.state != ClientState::SendingConnectionRequest {
            return;
        }
        tracing::debug!(challenge_salt, "received connection challenge");
        self.challenge_salt = challenge_salt;
        self.state = ClientState::SendingChallengeResponse;
        self.last_packet_receive_time = now;
    }

    fn process_keep_alive(&mut self, now: f64) {
        match self.state {
            ClientState::SendingChallengeResponse => {
                tracing::debug!("connection confirmed, client connected");
                self.state = ClientState::Connected;
                self.last_packet_receive_time = now;
            }
            ClientState::Connected => {
                self.last_packet_receive_time = now;
            }
            _ => {}
        }
    }

    fn process_disconnect(&mut self, now: f64) {
        if self.state != ClientState::Connected {
            return;
        }
        tracing::debug!("server disconnected us");
        self.disconnect(now);
    }

    // ------------------------------------------------------------------ //

    fn send_to_server(&mut self, packet: Packet, now: f64) {
        let server_address = self
            .server_address
            .expect("sending states always have a server address");
        self.io.send_packet(server_address, packet);
        self.last_packet_send_time = now;
    }

    fn reset_connection_data(&mut self) {
        if let Some(server_address) = self.server_address {
            self.io.remove_encryption_mapping(server_address);
        }
        self.server_address = None;
        self.state = ClientState::Disconnected;
        self.client_salt = 0;
        self.challenge_salt = 0;
        self.token = None;
        self.last_packet_send_time = NEVER_SENT;
        self.last_packet_receive_time = NEVER_SENT;
    }
}
