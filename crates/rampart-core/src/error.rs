//! Error types for the rampart-core crate.

use thiserror::Error;

/// Failures surfaced by the bit-level serialization streams.
///
/// Write streams only fail on caller mistakes (out-of-range values); read
/// streams additionally fail on truncated or corrupt input, and measure
/// streams fail when a value would exceed the measuring budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("bit stream exhausted: needed {needed} bits, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("value {value} outside serializable range [{min}, {max}]")]
    OutOfRange { value: u32, min: u32, max: u32 },

    #[error("measured size {bits} bits exceeds budget of {budget} bits")]
    OverBudget { bits: usize, budget: usize },

    #[error("string length {len} exceeds maximum {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("string is not valid utf-8")]
    InvalidString,
}

/// Failures surfaced by the packet codec.
///
/// Any of these means the datagram is dropped whole; a malformed packet
/// never reaches connection state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("unknown packet type tag")]
    UnknownPacketType,

    #[error("message type {0} is not registered with the message factory")]
    UnknownMessageType(u16),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let variants: Vec<StreamError> = vec![
            StreamError::Truncated {
                needed: 16,
                remaining: 3,
            },
            StreamError::OutOfRange {
                value: 9,
                min: 0,
                max: 7,
            },
            StreamError::OverBudget {
                bits: 5000,
                budget: 4096,
            },
            StreamError::StringTooLong { len: 90, max: 63 },
            StreamError::InvalidString,
        ];
        for v in &variants {
            assert!(!v.to_string().is_empty(), "{v:?} should have a Display");
        }
    }

    #[test]
    fn test_packet_error_from_stream_error() {
        let e: PacketError = StreamError::InvalidString.into();
        assert!(matches!(e, PacketError::Stream(StreamError::InvalidString)));
    }
}
