//! Packet buffer with a read cursor
//!
//! Every integer is little-endian. Strings are an `i32` byte length followed
//! by that many UTF-8 bytes. Writes always append; reads advance the cursor
//! and fail with `CodecError::Truncated` instead of reading past the end.

use crate::error::CodecError;

/// Marker that opens every command packet
pub const COMMAND_MARKER: i16 = -1;

/// A mutable byte buffer with a read cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    buf: Vec<u8>,
    pos: usize,
}

impl Packet {
    /// Create an empty packet for writing
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap received bytes for reading, cursor at the start
    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    /// The whole buffer, independent of the cursor
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Move the cursor back by `n` bytes (saturating at the start)
    pub fn rewind(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: &str) -> Result<(), CodecError> {
        let len = i32::try_from(value.len()).map_err(|_| CodecError::TooLarge(value.len()))?;
        self.write_i32(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Take the next `n` bytes, advancing the cursor
    fn take(&mut self, n: usize) -> Result<&[u8], CodecError> {
        let remaining = self.remaining();
        if remaining < n {
            return Err(CodecError::Truncated {
                needed: n,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        let bytes = self.take(2)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an `i16` without consuming it
    pub fn peek_i16(&mut self) -> Result<i16, CodecError> {
        let value = self.read_i16()?;
        self.rewind(2);
        Ok(value)
    }

    /// Read a non-negative `i32` count
    pub fn read_count(&mut self) -> Result<usize, CodecError> {
        let count = self.read_i32()?;
        usize::try_from(count).map_err(|_| CodecError::NegativeLength(count))
    }

    /// Read a length-prefixed UTF-8 string
    ///
    /// On failure the cursor is left where it was.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let start = self.pos;
        let result = self.read_count().and_then(|len| {
            let bytes = self.take(len)?.to_vec();
            String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
        });
        if result.is_err() {
            self.pos = start;
        }
        result
    }
}
