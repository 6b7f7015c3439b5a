//! Bit-level serialization streams.
//!
//! Packets are bit-packed, most-significant-bit first. The same serialize
//! function drives three modes through the [`Stream`] trait:
//!
//! - [`WriteStream`] packs values into a byte buffer,
//! - [`ReadStream`] unpacks them, surfacing truncation and range errors,
//! - [`MeasureStream`] counts bits without touching memory, so a message's
//!   on-wire size is known before a packet budget is spent on it.
//!
//! Every `serialize_*` method takes `&mut` to the value: writing reads it,
//! reading overwrites it, measuring ignores it.

use crate::error::StreamError;

/// Bits needed to represent any value in `[min, max]`.
#[must_use]
pub const fn bits_required(min: u32, max: u32) -> u32 {
    if min == max {
        0
    } else {
        u32::BITS - (max - min).leading_zeros()
    }
}

const fn mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

// ---------------------------------------------------------------------------
// Bit packer / unpacker
// ---------------------------------------------------------------------------

/// Packs values into a byte vector, most-significant-bit first.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    scratch: u64,
    scratch_bits: u32,
}

impl BitWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `bits` bits of `value`.
    pub fn write_bits(&mut self, value: u32, bits: u32) {
        debug_assert!(bits <= 32);
        self.scratch = (self.scratch << bits) | u64::from(value & mask(bits));
        self.scratch_bits += bits;
        while self.scratch_bits >= 8 {
            self.scratch_bits -= 8;
            self.bytes.push((self.scratch >> self.scratch_bits) as u8);
        }
    }

    #[must_use]
    pub fn bits_written(&self) -> usize {
        self.bytes.len() * 8 + self.scratch_bits as usize
    }

    /// Flush any partial byte (zero-padded) and return the buffer.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        if self.scratch_bits > 0 {
            let pad = 8 - self.scratch_bits;
            self.write_bits(0, pad);
        }
        self.bytes
    }
}

/// Unpacks values from a byte slice, most-significant-bit first.
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    byte_index: usize,
    scratch: u64,
    scratch_bits: u32,
    bits_read: usize,
}

impl<'a> BitReader<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            byte_index: 0,
            scratch: 0,
            scratch_bits: 0,
            bits_read: 0,
        }
    }

    #[must_use]
    pub fn bits_read(&self) -> usize {
        self.bits_read
    }

    #[must_use]
    pub fn bits_remaining(&self) -> usize {
        self.bytes.len() * 8 - self.bits_read
    }

    /// Read the next `bits` bits as an unsigned value.
    pub fn read_bits(&mut self, bits: u32) -> Result<u32, StreamError> {
        debug_assert!(bits <= 32);
        if self.bits_remaining() < bits as usize {
            return Err(StreamError::Truncated {
                needed: bits as usize,
                remaining: self.bits_remaining(),
            });
        }
        while self.scratch_bits < bits {
            self.scratch = (self.scratch << 8) | u64::from(self.bytes[self.byte_index]);
            self.byte_index += 1;
            self.scratch_bits += 8;
        }
        self.scratch_bits -= bits;
        self.bits_read += bits as usize;
        Ok((self.scratch >> self.scratch_bits) as u32 & mask(bits))
    }
}

// ---------------------------------------------------------------------------
// Stream trait
// ---------------------------------------------------------------------------

/// Object-safe serialization surface shared by write, read and measure modes.
pub trait Stream {
    /// True for write and measure modes.
    fn is_writing(&self) -> bool;

    /// True only when unpacking received data.
    fn is_reading(&self) -> bool {
        !self.is_writing()
    }

    /// Serialize the low `bits` bits of `value`.
    fn serialize_bits(&mut self, value: &mut u32, bits: u32) -> Result<(), StreamError>;

    fn bits_processed(&self) -> usize;

    /// Bits left to read; unbounded for write streams.
    fn bits_remaining(&self) -> usize;

    fn serialize_bool(&mut self, value: &mut bool) -> Result<(), StreamError> {
        let mut bit = u32::from(*value);
        self.serialize_bits(&mut bit, 1)?;
        *value = bit != 0;
        Ok(())
    }

    fn serialize_u16(&mut self, value: &mut u16) -> Result<(), StreamError> {
        let mut wide = u32::from(*value);
        self.serialize_bits(&mut wide, 16)?;
        *value = wide as u16;
        Ok(())
    }

    fn serialize_u32(&mut self, value: &mut u32) -> Result<(), StreamError> {
        self.serialize_bits(value, 32)
    }

    fn serialize_u64(&mut self, value: &mut u64) -> Result<(), StreamError> {
        let mut high = (*value >> 32) as u32;
        let mut low = *value as u32;
        self.serialize_bits(&mut high, 32)?;
        self.serialize_bits(&mut low, 32)?;
        *value = (u64::from(high) << 32) | u64::from(low);
        Ok(())
    }

    /// Serialize a value bounded to `[min, max]` in the minimum number of
    /// bits (zero bits when the bound admits a single value). Reads reject
    /// values outside the bound.
    fn serialize_int(&mut self, value: &mut u32, min: u32, max: u32) -> Result<(), StreamError> {
        debug_assert!(min <= max);
        if self.is_writing() && (*value < min || *value > max) {
            return Err(StreamError::OutOfRange {
                value: *value,
                min,
                max,
            });
        }
        let mut relative = value.wrapping_sub(min);
        self.serialize_bits(&mut relative, bits_required(min, max))?;
        if self.is_reading() {
            let unpacked = min.wrapping_add(relative);
            if unpacked > max {
                return Err(StreamError::OutOfRange {
                    value: unpacked,
                    min,
                    max,
                });
            }
            *value = unpacked;
        }
        Ok(())
    }

    /// Serialize a fixed-length run of bytes.
    fn serialize_bytes(&mut self, bytes: &mut [u8]) -> Result<(), StreamError> {
        for byte in bytes {
            let mut wide = u32::from(*byte);
            self.serialize_bits(&mut wide, 8)?;
            *byte = wide as u8;
        }
        Ok(())
    }

    /// Serialize a length-prefixed UTF-8 string of at most `max_len` bytes.
    fn serialize_string(&mut self, value: &mut String, max_len: usize) -> Result<(), StreamError> {
        let mut len = value.len() as u32;
        if self.is_writing() && len as usize > max_len {
            return Err(StreamError::StringTooLong {
                len: len as usize,
                max: max_len,
            });
        }
        self.serialize_int(&mut len, 0, max_len as u32)?;
        if self.is_reading() {
            let mut buf = vec![0u8; len as usize];
            self.serialize_bytes(&mut buf)?;
            *value = String::from_utf8(buf).map_err(|_| StreamError::InvalidString)?;
        } else {
            let mut buf = value.clone().into_bytes();
            self.serialize_bytes(&mut buf)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stream implementations
// ---------------------------------------------------------------------------

/// Packs serialized values into an owned byte buffer.
#[derive(Debug, Default)]
pub struct WriteStream {
    writer: BitWriter,
}

impl WriteStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush and take the serialized bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.writer.finish()
    }
}

impl Stream for WriteStream {
    fn is_writing(&self) -> bool {
        true
    }

    fn serialize_bits(&mut self, value: &mut u32, bits: u32) -> Result<(), StreamError> {
        self.writer.write_bits(*value, bits);
        Ok(())
    }

    fn bits_processed(&self) -> usize {
        self.writer.bits_written()
    }

    fn bits_remaining(&self) -> usize {
        usize::MAX
    }
}

/// Unpacks serialized values from a received byte slice.
#[derive(Debug)]
pub struct ReadStream<'a> {
    reader: BitReader<'a>,
}

impl<'a> ReadStream<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: BitReader::new(bytes),
        }
    }
}

impl Stream for ReadStream<'_> {
    fn is_writing(&self) -> bool {
        false
    }

    fn serialize_bits(&mut self, value: &mut u32, bits: u32) -> Result<(), StreamError> {
        *value = self.reader.read_bits(bits)?;
        Ok(())
    }

    fn bits_processed(&self) -> usize {
        self.reader.bits_read()
    }

    fn bits_remaining(&self) -> usize {
        self.reader.bits_remaining()
    }
}

/// Counts serialized bits without writing anything.
///
/// Behaves as a writing stream so write-side serialize branches run. An
/// optional budget turns oversized values into an error instead of a
/// silently wrong measurement.
#[derive(Debug, Default)]
pub struct MeasureStream {
    bits: usize,
    budget: Option<usize>,
}

impl MeasureStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure against a budget of `budget_bits`.
    #[must_use]
    pub fn with_budget(budget_bits: usize) -> Self {
        Self {
            bits: 0,
            budget: Some(budget_bits),
        }
    }
}

impl Stream for MeasureStream {
    fn is_writing(&self) -> bool {
        true
    }

    fn serialize_bits(&mut self, _value: &mut u32, bits: u32) -> Result<(), StreamError> {
        self.bits += bits as usize;
        if let Some(budget) = self.budget {
            if self.bits > budget {
                return Err(StreamError::OverBudget {
                    bits: self.bits,
                    budget,
                });
            }
        }
        Ok(())
    }

    fn bits_processed(&self) -> usize {
        self.bits
    }

    fn bits_remaining(&self) -> usize {
        match self.budget {
            Some(budget) => budget.saturating_sub(self.bits),
            None => usize::MAX,
        }
    }
}
