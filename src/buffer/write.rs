//! Write buffer for encoding wire data
//!
//! Mirror of [`super::ReadBuffer`]; see that module for the encoding rules.

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::length;
use crate::error::{Error, Result};

/// A buffer for writing protocol data
#[derive(Debug)]
pub struct WriteBuffer {
    data: BytesMut,
    /// Optional hard cap, used when encoding into fixed-size fields
    max_capacity: Option<usize>,
}

impl WriteBuffer {
    /// Create a new WriteBuffer with default capacity
    pub fn new() -> Self {
        Self {
            data: BytesMut::with_capacity(8192),
            max_capacity: None,
        }
    }

    /// Create a new WriteBuffer with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            max_capacity: None,
        }
    }

    /// Create a new WriteBuffer with a maximum capacity limit
    pub fn with_max_capacity(max_capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(max_capacity.min(8192)),
            max_capacity: Some(max_capacity),
        }
    }

    /// Current length of data in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The buffer contents as a byte slice
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the buffer into immutable Bytes
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    #[inline]
    fn ensure_capacity(&self, n: usize) -> Result<()> {
        if let Some(max) = self.max_capacity {
            if self.data.len() + n > max {
                return Err(Error::BufferOverflow {
                    needed: n,
                    available: max.saturating_sub(self.data.len()),
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Fixed-width writes (network byte order)
    // =========================================================================

    /// Write a single byte
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.ensure_capacity(1)?;
        self.data.put_u8(value);
        Ok(())
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_capacity(bytes.len())?;
        self.data.put_slice(bytes);
        Ok(())
    }

    /// Write `n` zero bytes
    pub fn write_zeros(&mut self, n: usize) -> Result<()> {
        self.ensure_capacity(n)?;
        self.data.put_bytes(0, n);
        Ok(())
    }

    /// Write a 16-bit unsigned integer, big-endian
    pub fn write_u16_be(&mut self, value: u16) -> Result<()> {
        self.ensure_capacity(2)?;
        self.data.put_u16(value);
        Ok(())
    }

    /// Write a 32-bit unsigned integer, big-endian
    pub fn write_u32_be(&mut self, value: u32) -> Result<()> {
        self.ensure_capacity(4)?;
        self.data.put_u32(value);
        Ok(())
    }

    /// Write a 64-bit unsigned integer, big-endian
    pub fn write_u64_be(&mut self, value: u64) -> Result<()> {
        self.ensure_capacity(8)?;
        self.data.put_u64(value);
        Ok(())
    }

    // =========================================================================
    // Variable-length integer writes
    // =========================================================================

    /// Write a ub1 (single byte)
    #[inline]
    pub fn write_ub1(&mut self, value: u8) -> Result<()> {
        self.write_u8(value)
    }

    /// Write a ub2 (count byte then minimal big-endian value bytes)
    pub fn write_ub2(&mut self, value: u16) -> Result<()> {
        self.write_ub8(value as u64)
    }

    /// Write a ub4 (count byte then minimal big-endian value bytes)
    pub fn write_ub4(&mut self, value: u32) -> Result<()> {
        self.write_ub8(value as u64)
    }

    /// Write a ub8 (count byte then minimal big-endian value bytes)
    pub fn write_ub8(&mut self, value: u64) -> Result<()> {
        if value == 0 {
            return self.write_u8(0);
        }
        let n = (8 - value.leading_zeros() as usize / 8) as u8;
        self.write_u8(n)?;
        for i in (0..n).rev() {
            self.write_u8((value >> (8 * i as u64)) as u8)?;
        }
        Ok(())
    }

    // =========================================================================
    // Length-prefixed byte strings
    // =========================================================================

    /// Write a length-prefixed byte string, switching to the chunked long
    /// form when `bytes` exceeds the inline limit
    pub fn write_bytes_with_length(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() <= length::MAX_SHORT as usize {
            self.write_u8(bytes.len() as u8)?;
            self.write_bytes(bytes)
        } else {
            self.write_u8(length::LONG_INDICATOR)?;
            for chunk in bytes.chunks(32767) {
                self.write_ub4(chunk.len() as u32)?;
                self.write_bytes(chunk)?;
            }
            self.write_ub4(0)
        }
    }

    /// Write the NULL indicator in place of a byte string
    pub fn write_null(&mut self) -> Result<()> {
        self.write_u8(0)
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_str_with_length(&mut self, s: &str) -> Result<()> {
        self.write_bytes_with_length(s.as_bytes())
    }

    /// Write a keyword/value pair, the form used in authentication and
    /// piggyback messages: each component is its byte count followed by the
    /// length-prefixed bytes (omitted entirely when empty), then the flags
    pub fn write_key_value(&mut self, key: &str, value: &str, flags: u32) -> Result<()> {
        self.write_ub4(key.len() as u32)?;
        if !key.is_empty() {
            self.write_bytes_with_length(key.as_bytes())?;
        }
        self.write_ub4(value.len() as u32)?;
        if !value.is_empty() {
            self.write_bytes_with_length(value.as_bytes())?;
        }
        self.write_ub4(flags)
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}
