//! In-memory packet network shared by the integration tests.
//!
//! Endpoints exchange `Packet` values directly — no serialization, no
//! sockets — so these tests exercise pure state-machine behavior. The
//! network also supports injecting packets with spoofed source addresses,
//! which the flood tests rely on.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::rc::Rc;

use rampart_core::packet::Packet;
use rampart_protocol::interface::NetworkInterface;

#[derive(Default)]
struct NetworkInner {
    queues: HashMap<SocketAddr, VecDeque<(SocketAddr, Packet)>>,
}

/// A zero-loss, zero-latency test network.
#[derive(Clone, Default)]
pub struct TestNetwork {
    inner: Rc<RefCell<NetworkInner>>,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint bound to `address`.
    pub fn endpoint(&self, address: SocketAddr) -> TestInterface {
        TestInterface {
            address,
            inner: Rc::clone(&self.inner),
        }
    }

    /// Deliver a packet claiming to come from `from` — the source address
    /// is attacker-controlled, exactly like UDP.
    pub fn inject(&self, from: SocketAddr, to: SocketAddr, packet: Packet) {
        self.inner
            .borrow_mut()
            .queues
            .entry(to)
            .or_default()
            .push_back((from, packet));
    }
}

pub struct TestInterface {
    address: SocketAddr,
    inner: Rc<RefCell<NetworkInner>>,
}

impl NetworkInterface for TestInterface {
    fn send_packet(&mut self, to: SocketAddr, packet: Packet) {
        self.inner
            .borrow_mut()
            .queues
            .entry(to)
            .or_default()
            .push_back((self.address, packet));
    }

    fn receive_packet(&mut self) -> Option<(SocketAddr, Packet)> {
        self.inner
            .borrow_mut()
            .queues
            .get_mut(&self.address)?
            .pop_front()
    }
}

pub fn addr(host: u8, port: u16) -> SocketAddr {
    format!("10.0.0.{host}:{port}").parse().unwrap()
}
