//! In-memory network simulator for protocol tests.
//!
//! Endpoints exchange packet values directly through shared queues, with
//! seeded-RNG loss, duplication and reordering applied on send. The same
//! seed always produces the same delivery schedule, so even heavy-loss
//! soak tests are reproducible.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rampart_core::packet::Packet;
use rampart_protocol::interface::NetworkInterface;

/// Fault model applied to every sent packet.
#[derive(Debug, Clone, Copy)]
pub struct SimulatorConfig {
    /// Probability a packet is dropped outright.
    pub loss: f64,
    /// Probability a delivered packet is delivered twice.
    pub duplicate: f64,
    /// Probability a delivered packet is swapped behind the packet already
    /// queued ahead of it.
    pub reorder: f64,
}

impl SimulatorConfig {
    /// A perfect network.
    #[must_use]
    pub fn ideal() -> Self {
        Self {
            loss: 0.0,
            duplicate: 0.0,
            reorder: 0.0,
        }
    }

    /// Uniform loss with no other faults.
    #[must_use]
    pub fn lossy(loss: f64) -> Self {
        Self {
            loss,
            ..Self::ideal()
        }
    }
}

struct SimulatorInner {
    rng: StdRng,
    config: SimulatorConfig,
    queues: HashMap<SocketAddr, VecDeque<(SocketAddr, Packet)>>,
}

/// A shared simulated network; create one per test and hand out endpoints.
#[derive(Clone)]
pub struct Simulator {
    inner: Rc<RefCell<SimulatorInner>>,
}

impl Simulator {
    #[must_use]
    pub fn new(config: SimulatorConfig, seed: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SimulatorInner {
                rng: StdRng::seed_from_u64(seed),
                config,
                queues: HashMap::new(),
            })),
        }
    }

    /// An endpoint sending from and receiving at `address`.
    #[must_use]
    pub fn endpoint(&self, address: SocketAddr) -> SimulatorEndpoint {
        SimulatorEndpoint {
            address,
            inner: Rc::clone(&self.inner),
        }
    }
}

/// One endpoint of a [`Simulator`].
pub struct SimulatorEndpoint {
    address: SocketAddr,
    inner: Rc<RefCell<SimulatorInner>>,
}

impl NetworkInterface for SimulatorEndpoint {
    fn send_packet(&mut self, to: SocketAddr, packet: Packet) {
        let mut inner = self.inner.borrow_mut();
        let config = inner.config;

        if inner.rng.gen::<f64>() < config.loss {
            tracing::trace!(%to, "simulator dropped packet");
            return;
        }
        let duplicate = inner.rng.gen::<f64>() < config.duplicate;
        let reorder = inner.rng.gen::<f64>() < config.reorder;

        let from = self.address;
        let queue = inner.queues.entry(to).or_default();
        queue.push_back((from, packet.clone()));
        if duplicate {
            queue.push_back((from, packet));
        }
        if reorder && queue.len() >= 2 {
            let last = queue.len() - 1;
            queue.swap(last, last - 1);
        }
    }

    fn receive_packet(&mut self) -> Option<(SocketAddr, Packet)> {
        self.inner
            .borrow_mut()
            .queues
            .get_mut(&self.address)?
            .pop_front()
    }
}
