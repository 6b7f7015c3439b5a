//! Seeded 64-bit hashing.
//!
//! The server's challenge table is indexed by a hash of the request's
//! printable source address and client identity, folded with a per-process
//! random seed. The seed is what keeps an attacker from precomputing
//! colliding requests; SHA-256 keeps them from finding collisions even if
//! the seed leaks.

use sha2::{Digest, Sha256};

/// Hash `data` under `seed` to 64 bits (first 8 bytes of SHA-256).
#[must_use]
pub fn h64(data: &[u8], seed: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(data);
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}
