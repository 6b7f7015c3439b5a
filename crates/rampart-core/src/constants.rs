//! Wire-level protocol constants.
//!
//! These sizes are part of the packet formats and are shared by every crate
//! in the workspace. Rates, timeouts and queue capacities live with the
//! state machines in `rampart-protocol`.

/// AEAD key size in bytes (XChaCha20-Poly1305).
pub const KEY_BYTES: usize = 32;

/// AEAD nonce size in bytes (XChaCha20-Poly1305 extended nonce).
pub const NONCE_BYTES: usize = 24;

/// AEAD authentication tag size in bytes.
pub const AUTH_BYTES: usize = 16;

/// Serialized size of a connect token before sealing. Tokens are padded to
/// this size so their ciphertext length does not leak the address count.
pub const TOKEN_BYTES: usize = 1024;

/// Sealed connect token size: plaintext plus the authentication tag.
pub const TOKEN_CIPHERTEXT_BYTES: usize = TOKEN_BYTES + AUTH_BYTES;

/// Maximum number of server addresses a connect token may bind.
pub const MAX_SERVERS_PER_TOKEN: usize = 8;

/// Maximum number of messages a single connection packet may carry.
pub const MAX_MESSAGES_PER_PACKET: usize = 64;

/// Zero padding appended to tokenless connection requests so a request is
/// never smaller than any reply it can provoke.
pub const REQUEST_PADDING_BYTES: usize = 256;

/// Longest printable address accepted in a connect token.
pub const MAX_ADDRESS_STRING_LENGTH: usize = 63;
