//! Authenticated encryption.
//!
//! All sealing in the protocol — connect tokens and post-handshake packet
//! encryption — goes through XChaCha20-Poly1305: 32-byte keys, 24-byte
//! nonces, 16-byte tags. The extended nonce is what lets packet encryption
//! use a simple little-endian counter without birthday-bound worries.

use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use rand::rngs::OsRng;

use rampart_core::constants::{AUTH_BYTES, KEY_BYTES, NONCE_BYTES};

use crate::error::CryptoError;

/// Seal `plaintext`, binding `aad`. Output is `plaintext.len() + AUTH_BYTES`.
pub fn encrypt(
    plaintext: &[u8],
    aad: &[u8],
    nonce: &[u8; NONCE_BYTES],
    key: &[u8; KEY_BYTES],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::EncryptFailed)
}

/// Open `ciphertext`, verifying the tag and `aad`.
pub fn decrypt(
    ciphertext: &[u8],
    aad: &[u8],
    nonce: &[u8; NONCE_BYTES],
    key: &[u8; KEY_BYTES],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < AUTH_BYTES {
        return Err(CryptoError::CiphertextTooShort {
            actual: ciphertext.len(),
            min: AUTH_BYTES,
        });
    }
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Generate a fresh random key.
#[must_use]
pub fn generate_key() -> [u8; KEY_BYTES] {
    let mut key = [0u8; KEY_BYTES];
    OsRng.fill_bytes(&mut key);
    key
}

/// Fill `buf` with OS randomness.
pub fn random_bytes(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

/// Random 64-bit value for salts and seeds.
#[must_use]
pub fn random_u64() -> u64 {
    OsRng.next_u64()
}

/// Widen a 64-bit counter into a full nonce (low bytes little-endian).
#[must_use]
pub fn counter_nonce(counter: u64) -> [u8; NONCE_BYTES] {
    let mut nonce = [0u8; NONCE_BYTES];
    nonce[..8].copy_from_slice(&counter.to_le_bytes());
    nonce
}
