//! The server's challenge table.
//!
//! Connection requests do not allocate client slots; they allocate (at
//! most) one entry here, keyed by a seeded hash of the request's printable
//! source address and client identity. Because the per-process seed is
//! random, an attacker cannot construct requests that collide into the same
//! slot, and the hard 25% occupancy cap keeps open addressing at expected
//! O(1) even under a flood of spoofed addresses. Expired entries are
//! overwritten opportunistically rather than swept.

use std::net::SocketAddr;

use rampart_crypto::hash::h64;

use crate::constants::{CHALLENGE_HASH_SIZE, CHALLENGE_SEND_RATE, CHALLENGE_TIME_OUT};

/// One pending challenge: a client we have answered with a salt but who has
/// not yet proven it can receive at its claimed address.
#[derive(Debug, Clone)]
pub struct ChallengeEntry {
    pub client_id: u64,
    pub challenge_salt: u64,
    pub create_time: f64,
    pub last_packet_send_time: f64,
    pub address: SocketAddr,
}

/// Open-addressed, flood-resistant table of pending challenges.
#[derive(Debug)]
pub struct ChallengeTable {
    seed: u64,
    num_entries: usize,
    entries: Vec<Option<ChallengeEntry>>,
}

impl ChallengeTable {
    /// Create a table salted with the per-process `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let mut entries = Vec::with_capacity(CHALLENGE_HASH_SIZE);
        entries.resize_with(CHALLENGE_HASH_SIZE, || None);
        Self {
            seed,
            num_entries: 0,
            entries,
        }
    }

    /// Live entry count (expired entries count until overwritten).
    #[must_use]
    pub fn occupancy(&self) -> usize {
        self.num_entries
    }

    /// Hard cap on occupancy: a quarter of the table.
    #[must_use]
    pub fn max_occupancy() -> usize {
        CHALLENGE_HASH_SIZE / 4
    }

    fn index(&self, address: SocketAddr, client_id: u64) -> usize {
        let mut keyed = address.to_string().into_bytes();
        keyed.extend_from_slice(&client_id.to_le_bytes());
        (h64(&keyed, self.seed) % CHALLENGE_HASH_SIZE as u64) as usize
    }

    /// Find the challenge for `(address, client_id)`, or create one with
    /// `challenge_salt` if its slot is free or expired.
    ///
    /// Returns `None` — dropping the request silently — when the slot is
    /// held by a different live challenger, or when the table has hit its
    /// occupancy cap and no matching entry exists.
    pub fn find_or_insert(
        &mut self,
        address: SocketAddr,
        client_id: u64,
        challenge_salt: u64,
        now: f64,
    ) -> Option<&mut ChallengeEntry> {
        let index = self.index(address, client_id);

        // a live matching entry is reused as-is; an expired one is replaced
        // below so the challenger gets a fresh salt and lifetime
        let matches_live = self.entries[index].as_ref().is_some_and(|e| {
            e.client_id == client_id
                && e.address == address
                && e.create_time + CHALLENGE_TIME_OUT >= now
        });
        if matches_live {
            return self.entries[index].as_mut();
        }

        if self.num_entries >= Self::max_occupancy() {
            // only expired entries are ever evicted; live challengers keep
            // their slots and over-cap requests are dropped
            self.purge_expired(now);
            if self.num_entries >= Self::max_occupancy() {
                tracing::debug!(
                    occupancy = self.num_entries,
                    "challenge table at capacity, dropping request"
                );
                return None;
            }
        }

        let expired = self.entries[index]
            .as_ref()
            .is_some_and(|e| e.create_time + CHALLENGE_TIME_OUT < now);
        if self.entries[index].is_some() && !expired {
            return None; // slot held by a different live challenger
        }

        if self.entries[index].is_none() {
            self.num_entries += 1;
        }
        tracing::debug!(index, client_id, "challenge entry created");
        self.entries[index] = Some(ChallengeEntry {
            client_id,
            challenge_salt,
            create_time: now,
            // two send intervals in the past, so the first challenge goes
            // out immediately
            last_packet_send_time: now - CHALLENGE_SEND_RATE * 2.0,
            address,
        });
        self.entries[index].as_mut()
    }

    /// Drop every expired entry. Runs only when the occupancy cap is hit,
    /// so steady-state requests stay O(1).
    fn purge_expired(&mut self, now: f64) {
        for slot in &mut self.entries {
            if slot
                .as_ref()
                .is_some_and(|e| e.create_time + CHALLENGE_TIME_OUT < now)
            {
                *slot = None;
                self.num_entries -= 1;
            }
        }
    }

    /// Locate the live, unexpired challenge a response answers: matching
    /// source address and echoed salt.
    #[must_use]
    pub fn find_response(
        &self,
        address: SocketAddr,
        challenge_salt: u64,
        now: f64,
    ) -> Option<&ChallengeEntry> {
        self.entries.iter().flatten().find(|e| {
            e.address == address
                && e.challenge_salt == challenge_salt
                && e.create_time + CHALLENGE_TIME_OUT >= now
        })
    }

    /// Record that a packet was just sent for this challenger.
    pub fn touch_send_time(&mut self, address: SocketAddr, client_id: u64, now: f64) {
        let index = self.index(address, client_id);
        if let Some(entry) = self.entries[index].as_mut() {
            if entry.client_id == client_id && entry.address == address {
                entry.last_packet_send_time = now;
            }
        }
    }
}
