//! Error types for the rampart-crypto crate.

use rampart_core::error::StreamError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("ciphertext too short: {actual} bytes (minimum {min})")]
    CiphertextTooShort { actual: usize, min: usize },
}

/// Failures while minting, sealing or opening connect tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("token must bind between 1 and {max} server addresses, got {actual}")]
    BadAddressCount { actual: usize, max: usize },

    #[error("server address is not parseable: {0}")]
    BadAddress(String),

    #[error("token expired at {expiry}, now {now}")]
    Expired { expiry: u64, now: u64 },

    #[error("token protocol id {actual:#010x} does not match {expected:#010x}")]
    WrongProtocol { actual: u32, expected: u32 },
}
