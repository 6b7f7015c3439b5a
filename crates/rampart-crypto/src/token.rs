//! Matchmaker connect tokens.
//!
//! A trusted matchmaker mints a [`ConnectToken`] authorizing one client to
//! join one server set before a short expiry, and seals it under a key it
//! shares with the server operator. The client cannot read or forge the
//! sealed blob; it forwards it verbatim inside its connection request. The
//! token carries one fresh session key per direction, so a client never
//! learns another client's traffic keys.
//!
//! # Sealed layout
//!
//! The token serializes into a fixed 1024-byte plaintext (padded, so the
//! ciphertext length does not leak the address count), then:
//!
//! ```text
//! ciphertext = XChaCha20-Poly1305(plaintext, aad = protocol_id_le, nonce, key)
//! ```
//!
//! The nonce is a monotonic matchmaker counter widened to 24 bytes.

use std::net::SocketAddr;

use rampart_core::constants::{
    KEY_BYTES, MAX_ADDRESS_STRING_LENGTH, MAX_SERVERS_PER_TOKEN, NONCE_BYTES, TOKEN_BYTES,
};
use rampart_core::packet::TokenData;
use rampart_core::stream::{ReadStream, Stream, WriteStream};

use crate::aead;
use crate::error::TokenError;

/// How long a freshly minted token stays valid, in seconds.
pub const TOKEN_EXPIRY_SECONDS: u64 = 10;

/// A connect token in the clear, as known to the matchmaker and the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectToken {
    pub protocol_id: u32,
    pub client_id: u64,
    pub expiry_timestamp: u64,
    pub server_addresses: Vec<SocketAddr>,
    pub client_to_server_key: [u8; KEY_BYTES],
    pub server_to_client_key: [u8; KEY_BYTES],
}

impl ConnectToken {
    /// Mint a token for `client_id`, valid for [`TOKEN_EXPIRY_SECONDS`]
    /// from `now_timestamp`, with fresh random session keys.
    pub fn generate(
        protocol_id: u32,
        client_id: u64,
        now_timestamp: u64,
        server_addresses: Vec<SocketAddr>,
    ) -> Result<Self, TokenError> {
        if server_addresses.is_empty() || server_addresses.len() > MAX_SERVERS_PER_TOKEN {
            return Err(TokenError::BadAddressCount {
                actual: server_addresses.len(),
                max: MAX_SERVERS_PER_TOKEN,
            });
        }
        Ok(Self {
            protocol_id,
            client_id,
            expiry_timestamp: now_timestamp + TOKEN_EXPIRY_SECONDS,
            server_addresses,
            client_to_server_key: aead::generate_key(),
            server_to_client_key: aead::generate_key(),
        })
    }

    /// Whether `address` is one of the servers this token may be used on.
    #[must_use]
    pub fn permits_address(&self, address: SocketAddr) -> bool {
        self.server_addresses.contains(&address)
    }

    /// Serialize into the fixed-size plaintext buffer.
    pub fn write(&self) -> Result<[u8; TOKEN_BYTES], TokenError> {
        if self.server_addresses.is_empty() || self.server_addresses.len() > MAX_SERVERS_PER_TOKEN {
            return Err(TokenError::BadAddressCount {
                actual: self.server_addresses.len(),
                max: MAX_SERVERS_PER_TOKEN,
            });
        }

        let mut stream = WriteStream::new();
        let mut protocol_id = self.protocol_id;
        let mut client_id = self.client_id;
        let mut expiry = self.expiry_timestamp;
        stream.serialize_u32(&mut protocol_id)?;
        stream.serialize_u64(&mut client_id)?;
        stream.serialize_u64(&mut expiry)?;

        let mut count = self.server_addresses.len() as u32;
        stream.serialize_int(&mut count, 1, MAX_SERVERS_PER_TOKEN as u32)?;
        for address in &self.server_addresses {
            let mut printable = address.to_string();
            stream.serialize_string(&mut printable, MAX_ADDRESS_STRING_LENGTH)?;
        }

        let mut c2s = self.client_to_server_key;
        let mut s2c = self.server_to_client_key;
        stream.serialize_bytes(&mut c2s)?;
        stream.serialize_bytes(&mut s2c)?;

        let bytes = stream.finish();
        debug_assert!(bytes.len() <= TOKEN_BYTES);
        let mut plaintext = [0u8; TOKEN_BYTES];
        plaintext[..bytes.len()].copy_from_slice(&bytes);
        Ok(plaintext)
    }

    /// Parse a token from its fixed-size plaintext buffer.
    pub fn read(plaintext: &[u8; TOKEN_BYTES]) -> Result<Self, TokenError> {
        let mut stream = ReadStream::new(plaintext);
        let mut protocol_id = 0u32;
        let mut client_id = 0u64;
        let mut expiry_timestamp = 0u64;
        stream.serialize_u32(&mut protocol_id)?;
        stream.serialize_u64(&mut client_id)?;
        stream.serialize_u64(&mut expiry_timestamp)?;

        let mut count = 0u32;
        stream.serialize_int(&mut count, 1, MAX_SERVERS_PER_TOKEN as u32)?;
        let mut server_addresses = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut printable = String::new();
            stream.serialize_string(&mut printable, MAX_ADDRESS_STRING_LENGTH)?;
            let address = printable
                .parse()
                .map_err(|_| TokenError::BadAddress(printable.clone()))?;
            server_addresses.push(address);
        }

        let mut client_to_server_key = [0u8; KEY_BYTES];
        let mut server_to_client_key = [0u8; KEY_BYTES];
        stream.serialize_bytes(&mut client_to_server_key)?;
        stream.serialize_bytes(&mut server_to_client_key)?;

        Ok(Self {
            protocol_id,
            client_id,
            expiry_timestamp,
            server_addresses,
            client_to_server_key,
            server_to_client_key,
        })
    }

    /// Seal the token under the matchmaker/server shared key.
    pub fn seal(
        &self,
        nonce: &[u8; NONCE_BYTES],
        key: &[u8; KEY_BYTES],
    ) -> Result<TokenData, TokenError> {
        let plaintext = self.write()?;
        let aad = self.protocol_id.to_le_bytes();
        let sealed = aead::encrypt(&plaintext, &aad, nonce, key)?;
        let ciphertext = sealed
            .try_into()
            .expect("AEAD output is plaintext length plus the tag");
        Ok(TokenData {
            ciphertext: Box::new(ciphertext),
            nonce: *nonce,
        })
    }

    /// Open a sealed token and validate protocol id and expiry.
    ///
    /// Address binding is the caller's check: the server verifies its own
    /// address with [`ConnectToken::permits_address`].
    pub fn open(
        data: &TokenData,
        key: &[u8; KEY_BYTES],
        expected_protocol_id: u32,
        now_timestamp: u64,
    ) -> Result<Self, TokenError> {
        let aad = expected_protocol_id.to_le_bytes();
        let plaintext_vec = aead::decrypt(data.ciphertext.as_ref(), &aad, &data.nonce, key)?;
        let plaintext: [u8; TOKEN_BYTES] = plaintext_vec
            .try_into()
            .expect("AEAD strips exactly the tag");
        let token = Self::read(&plaintext)?;

        if token.protocol_id != expected_protocol_id {
            return Err(TokenError::WrongProtocol {
                actual: token.protocol_id,
                expected: expected_protocol_id,
            });
        }
        if token.expiry_timestamp <= now_timestamp {
            return Err(TokenError::Expired {
                expiry: token.expiry_timestamp,
                now: now_timestamp,
            });
        }
        Ok(token)
    }
}

/// Matchmaker-side token mint: owns the shared key and the nonce counter.
#[derive(Debug)]
pub struct TokenIssuer {
    protocol_id: u32,
    key: [u8; KEY_BYTES],
    next_nonce: u64,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(protocol_id: u32, key: [u8; KEY_BYTES]) -> Self {
        Self {
            protocol_id,
            key,
            next_nonce: 0,
        }
    }

    /// Mint and seal a token for `client_id`. Returns the clear token (for
    /// the client) and the sealed blob (for the server, via the client).
    pub fn issue(
        &mut self,
        client_id: u64,
        now_timestamp: u64,
        server_addresses: Vec<SocketAddr>,
    ) -> Result<(ConnectToken, TokenData), TokenError> {
        let token =
            ConnectToken::generate(self.protocol_id, client_id, now_timestamp, server_addresses)?;
        let nonce = aead::counter_nonce(self.next_nonce);
        self.next_nonce += 1;
        let sealed = token.seal(&nonce, &self.key)?;
        Ok((token, sealed))
    }
}
