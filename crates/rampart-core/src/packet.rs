//! Packet types and their bit-packed wire codec.
//!
//! Every datagram body is one [`Packet`]: a 3-bit type tag followed by the
//! type's own layout. The connection packet piggybacks the ack system state
//! on every send:
//!
//! ```text
//! sequence(16) || ack(16) || ack_bits(32) || has_messages(1)
//!   [ num_messages || ids(16 each) || (type_tag || payload) per message ]
//! ```
//!
//! Reads are strict: truncation, out-of-range fields and unregistered
//! message types abort with an error and the datagram is dropped whole.

use std::rc::Rc;

use crate::constants::{
    MAX_MESSAGES_PER_PACKET, NONCE_BYTES, REQUEST_PADDING_BYTES, TOKEN_CIPHERTEXT_BYTES,
};
use crate::error::PacketError;
use crate::message::{Message, MessageFactory, MessageHandle};
use crate::stream::{ReadStream, Stream, WriteStream};

/// Number of wire packet types; type tags are bounded to `[0, 6]`.
pub const NUM_PACKET_TYPES: u32 = 7;

// ---------------------------------------------------------------------------
// Packet bodies
// ---------------------------------------------------------------------------

/// Why a server refused a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeniedReason {
    ServerFull,
    AlreadyConnected,
}

/// A sealed connect token as carried on the wire: AEAD ciphertext plus the
/// nonce the matchmaker sealed it under.
#[derive(Clone)]
pub struct TokenData {
    pub ciphertext: Box<[u8; TOKEN_CIPHERTEXT_BYTES]>,
    pub nonce: [u8; NONCE_BYTES],
}

impl std::fmt::Debug for TokenData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenData")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// First packet of the handshake.
///
/// Secure connections attach the matchmaker's sealed token; insecure ones
/// identify themselves with a random salt and pad the packet so a request
/// is never smaller than any reply it can provoke.
#[derive(Debug, Clone)]
pub struct ConnectionRequestPacket {
    pub client_salt: u64,
    pub token: Option<Box<TokenData>>,
}

/// Reliable-channel payload packet with piggybacked acks.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPacket {
    pub sequence: u16,
    pub ack: u16,
    pub ack_bits: u32,
    pub messages: Vec<MessageHandle>,
}

/// One wire packet.
#[derive(Debug, Clone)]
pub enum Packet {
    ConnectionRequest(ConnectionRequestPacket),
    ConnectionDenied(DeniedReason),
    ConnectionChallenge { challenge_salt: u64 },
    ConnectionResponse { challenge_salt: u64 },
    KeepAlive,
    Disconnect,
    Connection(ConnectionPacket),
}

impl Packet {
    /// Wire type tag.
    #[must_use]
    pub fn packet_type(&self) -> u32 {
        match self {
            Packet::ConnectionRequest(_) => 0,
            Packet::ConnectionDenied(_) => 1,
            Packet::ConnectionChallenge { .. } => 2,
            Packet::ConnectionResponse { .. } => 3,
            Packet::KeepAlive => 4,
            Packet::Disconnect => 5,
            Packet::Connection(_) => 6,
        }
    }

    /// Serialize to wire bytes.
    pub fn write(&self, factory: &dyn MessageFactory) -> Result<Vec<u8>, PacketError> {
        let mut stream = WriteStream::new();
        let mut tag = self.packet_type();
        stream.serialize_int(&mut tag, 0, NUM_PACKET_TYPES - 1)?;

        match self {
            Packet::ConnectionRequest(request) => write_request(&mut stream, request)?,
            Packet::ConnectionDenied(reason) => {
                let mut value = match reason {
                    DeniedReason::ServerFull => 0u32,
                    DeniedReason::AlreadyConnected => 1,
                };
                stream.serialize_int(&mut value, 0, 1)?;
            }
            Packet::ConnectionChallenge { challenge_salt }
            | Packet::ConnectionResponse { challenge_salt } => {
                let mut salt = *challenge_salt;
                stream.serialize_u64(&mut salt)?;
            }
            Packet::KeepAlive | Packet::Disconnect => {}
            Packet::Connection(connection) => {
                write_connection(&mut stream, connection, factory)?;
            }
        }
        let bytes = stream.finish();
        tracing::trace!(
            packet_type = self.packet_type(),
            len = bytes.len(),
            "packet written"
        );
        Ok(bytes)
    }

    /// Parse a packet from wire bytes.
    pub fn read(bytes: &[u8], factory: &dyn MessageFactory) -> Result<Packet, PacketError> {
        let mut stream = ReadStream::new(bytes);
        let mut tag = 0u32;
        stream
            .serialize_int(&mut tag, 0, NUM_PACKET_TYPES - 1)
            .map_err(|_| PacketError::UnknownPacketType)?;

        let packet = match tag {
            0 => Packet::ConnectionRequest(read_request(&mut stream)?),
            1 => {
                let mut value = 0u32;
                stream.serialize_int(&mut value, 0, 1)?;
                Packet::ConnectionDenied(if value == 0 {
                    DeniedReason::ServerFull
                } else {
                    DeniedReason::AlreadyConnected
                })
            }
            2 | 3 => {
                let mut challenge_salt = 0u64;
                stream.serialize_u64(&mut challenge_salt)?;
                if tag == 2 {
                    Packet::ConnectionChallenge { challenge_salt }
                } else {
                    Packet::ConnectionResponse { challenge_salt }
                }
            }
            4 => Packet::KeepAlive,
            5 => Packet::Disconnect,
            6 => Packet::Connection(read_connection(&mut stream, factory)?),
            _ => return Err(PacketError::UnknownPacketType),
        };
        tracing::trace!(packet_type = tag, len = bytes.len(), "packet read");
        Ok(packet)
    }
}

// ---------------------------------------------------------------------------
// Body serializers
// ---------------------------------------------------------------------------

fn write_request(
    stream: &mut WriteStream,
    request: &ConnectionRequestPacket,
) -> Result<(), PacketError> {
    let mut salt = request.client_salt;
    stream.serialize_u64(&mut salt)?;
    let mut has_token = request.token.is_some();
    stream.serialize_bool(&mut has_token)?;
    if let Some(token) = &request.token {
        let mut ciphertext = *token.ciphertext;
        let mut nonce = token.nonce;
        stream.serialize_bytes(&mut ciphertext)?;
        stream.serialize_bytes(&mut nonce)?;
    } else {
        let mut padding = [0u8; REQUEST_PADDING_BYTES];
        stream.serialize_bytes(&mut padding)?;
    }
    Ok(())
}

fn read_request(stream: &mut ReadStream<'_>) -> Result<ConnectionRequestPacket, PacketError> {
    let mut client_salt = 0u64;
    stream.serialize_u64(&mut client_salt)?;
    let mut has_token = false;
    stream.serialize_bool(&mut has_token)?;
    let token = if has_token {
        let mut ciphertext = Box::new([0u8; TOKEN_CIPHERTEXT_BYTES]);
        let mut nonce = [0u8; NONCE_BYTES];
        stream.serialize_bytes(ciphertext.as_mut())?;
        stream.serialize_bytes(&mut nonce)?;
        Some(Box::new(TokenData { ciphertext, nonce }))
    } else {
        // requests below the padded size are rejected outright
        let mut padding = [0u8; REQUEST_PADDING_BYTES];
        stream.serialize_bytes(&mut padding)?;
        None
    };
    Ok(ConnectionRequestPacket { client_salt, token })
}

fn write_connection(
    stream: &mut WriteStream,
    packet: &ConnectionPacket,
    factory: &dyn MessageFactory,
) -> Result<(), PacketError> {
    let mut sequence = packet.sequence;
    let mut ack = packet.ack;
    let mut ack_bits = packet.ack_bits;
    stream.serialize_u16(&mut sequence)?;
    stream.serialize_u16(&mut ack)?;
    stream.serialize_u32(&mut ack_bits)?;

    let mut has_messages = !packet.messages.is_empty();
    stream.serialize_bool(&mut has_messages)?;
    if !has_messages {
        return Ok(());
    }

    let max_message_type = u32::from(factory.max_message_type());
    let mut num_messages = packet.messages.len() as u32;
    debug_assert!(num_messages as usize <= MAX_MESSAGES_PER_PACKET);
    stream.serialize_int(&mut num_messages, 1, MAX_MESSAGES_PER_PACKET as u32)?;

    for message in &packet.messages {
        let mut id = message.id();
        stream.serialize_u16(&mut id)?;
    }
    for message in &packet.messages {
        let mut msg_type = u32::from(message.msg_type());
        stream.serialize_int(&mut msg_type, 0, max_message_type)?;
        message.payload().write(stream)?;
    }
    Ok(())
}

fn read_connection(
    stream: &mut ReadStream<'_>,
    factory: &dyn MessageFactory,
) -> Result<ConnectionPacket, PacketError> {
    let mut packet = ConnectionPacket::default();
    stream.serialize_u16(&mut packet.sequence)?;
    stream.serialize_u16(&mut packet.ack)?;
    stream.serialize_u32(&mut packet.ack_bits)?;

    let mut has_messages = false;
    stream.serialize_bool(&mut has_messages)?;
    if !has_messages {
        return Ok(packet);
    }

    let max_message_type = u32::from(factory.max_message_type());
    let mut num_messages = 0u32;
    stream.serialize_int(&mut num_messages, 1, MAX_MESSAGES_PER_PACKET as u32)?;

    let mut ids = [0u16; MAX_MESSAGES_PER_PACKET];
    for id in ids.iter_mut().take(num_messages as usize) {
        stream.serialize_u16(id)?;
    }
    packet.messages.reserve(num_messages as usize);
    for index in 0..num_messages as usize {
        let mut msg_type = 0u32;
        stream.serialize_int(&mut msg_type, 0, max_message_type)?;
        let msg_type = msg_type as u16;
        let mut payload = factory
            .create(msg_type)
            .ok_or(PacketError::UnknownMessageType(msg_type))?;
        payload.read(stream)?;
        packet
            .messages
            .push(Rc::new(Message::new(msg_type, ids[index], payload)));
    }
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use std::any::Any;

    #[derive(Debug, Default)]
    struct TestPayload {
        value: u32,
    }

    impl crate::message::MessagePayload for TestPayload {
        fn write(&self, stream: &mut dyn Stream) -> Result<(), StreamError> {
            let mut value = self.value;
            stream.serialize_int(&mut value, 0, 1000)
        }

        fn read(&mut self, stream: &mut dyn Stream) -> Result<(), StreamError> {
            stream.serialize_int(&mut self.value, 0, 1000)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct TestFactory;

    impl MessageFactory for TestFactory {
        fn create(&self, msg_type: u16) -> Option<Box<dyn crate::message::MessagePayload>> {
            (msg_type == 0).then(|| Box::<TestPayload>::default() as _)
        }

        fn num_types(&self) -> u16 {
            1
        }
    }

    fn message(id: u16, value: u32) -> MessageHandle {
        Rc::new(Message::new(0, id, Box::new(TestPayload { value })))
    }

    #[test]
    fn handshake_packets_round_trip() {
        let factory = TestFactory;
        let packets = [
            Packet::ConnectionDenied(DeniedReason::ServerFull),
            Packet::ConnectionDenied(DeniedReason::AlreadyConnected),
            Packet::ConnectionChallenge {
                challenge_salt: 0xDEAD_BEEF_1234_5678,
            },
            Packet::ConnectionResponse {
                challenge_salt: 0xBADC_0FFE_E0DD_F00D,
            },
            Packet::KeepAlive,
            Packet::Disconnect,
        ];
        for packet in &packets {
            let bytes = packet.write(&factory).unwrap();
            let parsed = Packet::read(&bytes, &factory).unwrap();
            assert_eq!(parsed.packet_type(), packet.packet_type());
            match (packet, &parsed) {
                (
                    Packet::ConnectionChallenge { challenge_salt: a },
                    Packet::ConnectionChallenge { challenge_salt: b },
                )
                | (
                    Packet::ConnectionResponse { challenge_salt: a },
                    Packet::ConnectionResponse { challenge_salt: b },
                ) => assert_eq!(a, b),
                (Packet::ConnectionDenied(a), Packet::ConnectionDenied(b)) => assert_eq!(a, b),
                _ => {}
            }
        }
    }

    #[test]
    fn request_round_trip_insecure() {
        let factory = TestFactory;
        let packet = Packet::ConnectionRequest(ConnectionRequestPacket {
            client_salt: 0x1122_3344_5566_7788,
            token: None,
        });
        let bytes = packet.write(&factory).unwrap();
        // salt + flag + padding, bit-packed
        assert!(bytes.len() > REQUEST_PADDING_BYTES);

        let Packet::ConnectionRequest(parsed) = Packet::read(&bytes, &factory).unwrap() else {
            panic!("wrong packet type");
        };
        assert_eq!(parsed.client_salt, 0x1122_3344_5566_7788);
        assert!(parsed.token.is_none());
    }

    #[test]
    fn request_round_trip_with_token() {
        let factory = TestFactory;
        let token = TokenData {
            ciphertext: Box::new([0xA5; TOKEN_CIPHERTEXT_BYTES]),
            nonce: [0x5A; NONCE_BYTES],
        };
        let packet = Packet::ConnectionRequest(ConnectionRequestPacket {
            client_salt: 0,
            token: Some(Box::new(token)),
        });
        let bytes = packet.write(&factory).unwrap();

        let Packet::ConnectionRequest(parsed) = Packet::read(&bytes, &factory).unwrap() else {
            panic!("wrong packet type");
        };
        let parsed_token = parsed.token.unwrap();
        assert_eq!(parsed_token.ciphertext[..], [0xA5; TOKEN_CIPHERTEXT_BYTES]);
        assert_eq!(parsed_token.nonce, [0x5A; NONCE_BYTES]);
    }

    #[test]
    fn truncated_request_is_rejected() {
        let factory = TestFactory;
        let packet = Packet::ConnectionRequest(ConnectionRequestPacket {
            client_salt: 1,
            token: None,
        });
        let bytes = packet.write(&factory).unwrap();
        let short = &bytes[..bytes.len() / 2];
        assert!(matches!(
            Packet::read(short, &factory),
            Err(PacketError::Stream(StreamError::Truncated { .. }))
        ));
    }

    #[test]
    fn connection_round_trip_empty() {
        let factory = TestFactory;
        let packet = Packet::Connection(ConnectionPacket {
            sequence: 100,
            ack: 99,
            ack_bits: 0xFFFF_FFFF,
            messages: Vec::new(),
        });
        let bytes = packet.write(&factory).unwrap();

        let Packet::Connection(parsed) = Packet::read(&bytes, &factory).unwrap() else {
            panic!("wrong packet type");
        };
        assert_eq!(parsed.sequence, 100);
        assert_eq!(parsed.ack, 99);
        assert_eq!(parsed.ack_bits, 0xFFFF_FFFF);
        assert!(parsed.messages.is_empty());
    }

    #[test]
    fn connection_round_trip_with_messages() {
        let factory = TestFactory;
        let messages: Vec<MessageHandle> = (0..10).map(|i| message(i, u32::from(i) * 3)).collect();
        let packet = Packet::Connection(ConnectionPacket {
            sequence: 5,
            ack: 4,
            ack_bits: 0b1011,
            messages,
        });
        let bytes = packet.write(&factory).unwrap();

        let Packet::Connection(parsed) = Packet::read(&bytes, &factory).unwrap() else {
            panic!("wrong packet type");
        };
        assert_eq!(parsed.messages.len(), 10);
        for (i, msg) in parsed.messages.iter().enumerate() {
            assert_eq!(msg.id(), i as u16);
            assert_eq!(msg.payload_as::<TestPayload>().unwrap().value, i as u32 * 3);
        }
    }

    #[test]
    fn connection_round_trip_max_messages() {
        let factory = TestFactory;
        let messages: Vec<MessageHandle> = (0..MAX_MESSAGES_PER_PACKET as u16)
            .map(|i| message(i, 7))
            .collect();
        let packet = Packet::Connection(ConnectionPacket {
            sequence: 0,
            ack: 0,
            ack_bits: 0,
            messages,
        });
        let bytes = packet.write(&factory).unwrap();

        let Packet::Connection(parsed) = Packet::read(&bytes, &factory).unwrap() else {
            panic!("wrong packet type");
        };
        assert_eq!(parsed.messages.len(), MAX_MESSAGES_PER_PACKET);
    }

    #[test]
    fn unknown_message_type_rejects_packet() {
        struct TwoTypeFactory;
        impl MessageFactory for TwoTypeFactory {
            fn create(&self, msg_type: u16) -> Option<Box<dyn crate::message::MessagePayload>> {
                (msg_type == 0).then(|| Box::<TestPayload>::default() as _)
            }
            fn num_types(&self) -> u16 {
                2
            }
        }

        // writer claims two types exist, but type 1 has no registration
        let factory = TwoTypeFactory;
        let msg = Rc::new(Message::new(1, 0, Box::new(TestPayload { value: 1 })));
        let packet = Packet::Connection(ConnectionPacket {
            sequence: 0,
            ack: 0,
            ack_bits: 0,
            messages: vec![msg],
        });
        let bytes = packet.write(&factory).unwrap();
        assert!(matches!(
            Packet::read(&bytes, &factory),
            Err(PacketError::UnknownMessageType(1))
        ));
    }

    #[test]
    fn truncated_message_payload_rejects_packet() {
        let factory = TestFactory;
        let packet = Packet::Connection(ConnectionPacket {
            sequence: 0,
            ack: 0,
            ack_bits: 0,
            messages: vec![message(0, 999)],
        });
        let bytes = packet.write(&factory).unwrap();
        let short = &bytes[..bytes.len() - 1];
        assert!(matches!(
            Packet::read(short, &factory),
            Err(PacketError::Stream(StreamError::Truncated { .. }))
        ));
    }

    #[test]
    fn garbage_type_tag_is_rejected() {
        let factory = TestFactory;
        // 3-bit tag value 7 is outside [0, 6]
        let bytes = [0b1110_0000u8, 0, 0, 0];
        assert!(matches!(
            Packet::read(&bytes, &factory),
            Err(PacketError::UnknownPacketType)
        ));
    }
}
