//! Secure-variant handshake scenarios: token issue, validation, replay.

mod common;

use common::{TestInterface, TestNetwork, addr};
use rampart_core::packet::{ConnectionRequestPacket, Packet};
use rampart_crypto::aead;
use rampart_crypto::token::TokenIssuer;
use rampart_protocol::client::Client;
use rampart_protocol::server::{Server, ServerConfig};

const PROTOCOL_ID: u32 = 0x1234_1651;
const TICK: f64 = 0.1;

struct Fixture {
    network: TestNetwork,
    server: Server<TestInterface>,
    issuer: TokenIssuer,
}

fn fixture() -> Fixture {
    let network = TestNetwork::new();
    let server_address = addr(1, 50000);
    let private_key = aead::generate_key();
    let server = Server::new(
        network.endpoint(server_address),
        ServerConfig::secure(server_address, PROTOCOL_ID, private_key),
    );
    Fixture {
        network,
        server,
        issuer: TokenIssuer::new(PROTOCOL_ID, private_key),
    }
}

fn tick(client: &mut Client<TestInterface>, server: &mut Server<TestInterface>, now: f64) {
    client.send_packets(now);
    server.receive_packets(now);
    server.send_packets(now);
    client.receive_packets(now);
    client.check_for_timeout(now);
    server.check_for_timeout(now);
}

#[test]
fn secure_handshake_connects_and_records_the_client_id() {
    let mut f = fixture();
    let mut client = Client::new(f.network.endpoint(addr(2, 60000)));

    let (token, sealed) = f
        .issuer
        .issue(1_231_241, 0, vec![addr(1, 50000)])
        .expect("token should mint");
    client.connect_secure(addr(1, 50000), &token, sealed, 0.0);

    let mut now = 0.0;
    for _ in 0..3 {
        tick(&mut client, &mut f.server, now);
        now += TICK;
    }

    assert!(client.is_connected());
    assert_eq!(f.server.connected_client_count(), 1);
    assert_eq!(f.server.client_id(0), 1_231_241);
}

#[test]
fn tokenless_request_is_dropped_by_a_secure_server() {
    let mut f = fixture();
    f.network.inject(
        addr(7, 60000),
        addr(1, 50000),
        Packet::ConnectionRequest(ConnectionRequestPacket {
            client_salt: 7,
            token: None,
        }),
    );
    f.server.receive_packets(0.0);
    assert_eq!(f.server.challenge_occupancy(), 0);
    assert_eq!(f.server.connected_client_count(), 0);
}

#[test]
fn tampered_token_is_dropped_without_state_change() {
    let mut f = fixture();
    let (_, sealed) = f.issuer.issue(42, 0, vec![addr(1, 50000)]).unwrap();

    let mut tampered = sealed;
    tampered.ciphertext[100] ^= 0x01;
    f.network.inject(
        addr(7, 60000),
        addr(1, 50000),
        Packet::ConnectionRequest(ConnectionRequestPacket {
            client_salt: 0,
            token: Some(Box::new(tampered)),
        }),
    );
    f.server.receive_packets(0.0);
    assert_eq!(f.server.challenge_occupancy(), 0);
    assert_eq!(f.server.connected_client_count(), 0);
}

#[test]
fn token_sealed_under_another_key_is_dropped() {
    let mut f = fixture();
    let mut rogue_issuer = TokenIssuer::new(PROTOCOL_ID, aead::generate_key());
    let (_, sealed) = rogue_issuer.issue(42, 0, vec![addr(1, 50000)]).unwrap();
    f.network.inject(
        addr(7, 60000),
        addr(1, 50000),
        Packet::ConnectionRequest(ConnectionRequestPacket {
            client_salt: 0,
            token: Some(Box::new(sealed)),
        }),
    );
    f.server.receive_packets(0.0);
    assert_eq!(f.server.challenge_occupancy(), 0);
}

#[test]
fn expired_token_is_dropped() {
    let mut f = fixture();
    let (token, sealed) = f.issuer.issue(42, 0, vec![addr(1, 50000)]).unwrap();
    let mut client = Client::new(f.network.endpoint(addr(2, 60000)));

    // the token expires 10s after minting; connect at t = 20
    let mut now = 20.0;
    client.connect_secure(addr(1, 50000), &token, sealed, now);
    for _ in 0..3 {
        tick(&mut client, &mut f.server, now);
        now += TICK;
    }
    assert!(!client.is_connected());
    assert_eq!(f.server.challenge_occupancy(), 0);
}

#[test]
fn token_for_a_different_server_is_dropped() {
    let mut f = fixture();
    // token lists some other server, not ours
    let (token, sealed) = f.issuer.issue(42, 0, vec![addr(9, 50000)]).unwrap();
    let mut client = Client::new(f.network.endpoint(addr(2, 60000)));

    let mut now = 0.0;
    client.connect_secure(addr(1, 50000), &token, sealed, now);
    for _ in 0..3 {
        tick(&mut client, &mut f.server, now);
        now += TICK;
    }
    assert!(!client.is_connected());
    assert_eq!(f.server.challenge_occupancy(), 0);
}

#[test]
fn replayed_token_from_another_address_is_dropped() {
    let mut f = fixture();
    let (token, sealed) = f.issuer.issue(42, 0, vec![addr(1, 50000)]).unwrap();
    let mut client = Client::new(f.network.endpoint(addr(2, 60000)));

    let mut now = 0.0;
    client.connect_secure(addr(1, 50000), &token, sealed.clone(), now);
    for _ in 0..3 {
        tick(&mut client, &mut f.server, now);
        now += TICK;
    }
    assert!(client.is_connected());

    // an eavesdropper replays the captured request from its own address
    f.network.inject(
        addr(66, 60000),
        addr(1, 50000),
        Packet::ConnectionRequest(ConnectionRequestPacket {
            client_salt: 0,
            token: Some(Box::new(sealed)),
        }),
    );
    f.server.receive_packets(now);
    assert_eq!(f.server.connected_client_count(), 1);
    assert_eq!(f.server.challenge_occupancy(), 1);
}
