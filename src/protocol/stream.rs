//! Binary Packet Stream
//!
//! Position-tracked byte buffer every protocol message is encoded to and
//! decoded from. Reads past the end fail with `TruncatedInput`; the
//! enclosing packet decode must abort at that point, never continue.

use thiserror::Error;

/// Maximum number of bytes a u32 varint may occupy.
const MAX_VARINT_BYTES: usize = 5;

/// Errors raised by stream primitives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// A read ran past the end of the buffer.
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A varint used more than the maximum number of bytes.
    #[error("variable-length integer too long")]
    VarIntTooLong,

    /// A length-prefixed string was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Sequential read/write cursor over a byte buffer.
///
/// Writes append at the end; reads consume from an internal offset.
#[derive(Debug, Clone, Default)]
pub struct PacketStream {
    buffer: Vec<u8>,
    offset: usize,
}

impl PacketStream {
    /// Create an empty stream for encoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap received bytes for decoding.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            buffer: bytes,
            offset: 0,
        }
    }

    /// Consume the stream, yielding the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    /// Whether every byte has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&[u8], StreamError> {
        if self.remaining() < n {
            return Err(StreamError::TruncatedInput {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buffer[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8, StreamError> {
        Ok(self.take(1)?[0])
    }

    /// Write a single byte.
    pub fn write_byte(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Read a boolean (any nonzero byte is true).
    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        Ok(self.read_byte()? != 0)
    }

    /// Write a boolean as 0 or 1.
    pub fn write_bool(&mut self, value: bool) {
        self.write_byte(u8::from(value));
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Write a big-endian u32.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Read a big-endian u64.
    pub fn read_u64(&mut self) -> Result<u64, StreamError> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(arr))
    }

    /// Write a big-endian u64.
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Read an unsigned varint (7 bits per byte, 0x80 continuation,
    /// least-significant group first).
    pub fn read_unsigned_var_int(&mut self) -> Result<u32, StreamError> {
        let mut value: u32 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte()?;
            value |= u32::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(StreamError::VarIntTooLong)
    }

    /// Write an unsigned varint.
    pub fn write_unsigned_var_int(&mut self, mut value: u32) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.write_byte(byte);
            if value == 0 {
                break;
            }
        }
    }

    /// Read a varint length-prefixed raw byte blob.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, StreamError> {
        let len = self.read_unsigned_var_int()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Write a varint length-prefixed raw byte blob.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_unsigned_var_int(bytes.len() as u32);
        self.buffer.extend_from_slice(bytes);
    }

    /// Read a varint length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, StreamError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| StreamError::InvalidUtf8)
    }

    /// Write a varint length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }
}

// =============================================================================
// TESTS
// =============================================================================
