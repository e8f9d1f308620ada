//! Read buffer for decoding wire data
//!
//! Integers on the wire come in two shapes: fixed-width big-endian (packet
//! headers, negotiation blocks) and the variable-length "ub" form used inside
//! TTC messages, where a leading count byte gives the number of value bytes
//! that follow. Variable-length byte strings carry a single length byte up to
//! 252, or the long indicator (254) followed by ub4-sized chunks terminated
//! by a zero-length chunk.

use bytes::Bytes;

use crate::constants::length;
use crate::error::{Error, Result};

/// A buffer for reading protocol data
#[derive(Debug)]
pub struct ReadBuffer {
    data: Bytes,
    pos: usize,
}

impl ReadBuffer {
    /// Create a new ReadBuffer from bytes
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a new ReadBuffer from a byte slice
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
            pos: 0,
        }
    }

    /// Current read position
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of bytes remaining to be read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if there are at least `n` bytes remaining
    #[inline]
    pub fn has_remaining(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    /// Skip `n` bytes
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure_remaining(n)?;
        self.pos += n;
        Ok(())
    }

    #[inline]
    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            Err(Error::BufferUnderflow {
                needed: n,
                available: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Fixed-width reads (network byte order)
    // =========================================================================

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure_remaining(1)?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    /// Read a 16-bit unsigned integer, big-endian
    pub fn read_u16_be(&mut self) -> Result<u16> {
        self.ensure_remaining(2)?;
        let value = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    /// Read a 32-bit unsigned integer, big-endian
    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.ensure_remaining(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_be_bytes(raw))
    }

    /// Read a 64-bit unsigned integer, big-endian
    pub fn read_u64_be(&mut self) -> Result<u64> {
        self.ensure_remaining(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_be_bytes(raw))
    }

    /// Read exactly `n` raw bytes as an owned slice of the backing buffer
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.ensure_remaining(n)?;
        let bytes = self.data.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(bytes)
    }

    /// Read exactly `n` raw bytes into a Vec
    pub fn read_bytes_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.read_bytes(n)?.to_vec())
    }

    // =========================================================================
    // Variable-length integer reads
    // =========================================================================

    fn read_ub_length(&mut self) -> Result<u8> {
        let len = self.read_u8()?;
        // High bit marks a negative value in signed contexts; callers that
        // need the sign use read_sb* which re-checks it.
        Ok(len & 0x7f)
    }

    /// Read a ub1 (single byte)
    #[inline]
    pub fn read_ub1(&mut self) -> Result<u8> {
        self.read_u8()
    }

    /// Read a ub2 (count byte then 0..2 value bytes)
    pub fn read_ub2(&mut self) -> Result<u16> {
        let len = self.read_ub_length()?;
        match len {
            0 => Ok(0),
            1 => Ok(self.read_u8()? as u16),
            2 => self.read_u16_be(),
            _ => Err(Error::InvalidLengthIndicator(len)),
        }
    }

    /// Read a ub4 (count byte then 0..4 value bytes)
    pub fn read_ub4(&mut self) -> Result<u32> {
        let len = self.read_ub_length()?;
        match len {
            0 => Ok(0),
            1 => Ok(self.read_u8()? as u32),
            2 => Ok(self.read_u16_be()? as u32),
            3 => {
                let hi = self.read_u8()? as u32;
                let lo = self.read_u16_be()? as u32;
                Ok((hi << 16) | lo)
            }
            4 => self.read_u32_be(),
            _ => Err(Error::InvalidLengthIndicator(len)),
        }
    }

    /// Read a ub8 (count byte then 0..8 value bytes)
    pub fn read_ub8(&mut self) -> Result<u64> {
        let len = self.read_ub_length()?;
        if len > 8 {
            return Err(Error::InvalidLengthIndicator(len));
        }
        let mut value: u64 = 0;
        for _ in 0..len {
            value = (value << 8) | self.read_u8()? as u64;
        }
        Ok(value)
    }

    // =========================================================================
    // Length-prefixed byte strings
    // =========================================================================

    /// Read a length-prefixed byte string, transparently handling the
    /// chunked long form. Returns `None` for the NULL indicator.
    pub fn read_bytes_with_length(&mut self) -> Result<Option<Vec<u8>>> {
        let first = self.read_u8()?;
        match first {
            0 | length::NULL_INDICATOR => Ok(None),
            length::LONG_INDICATOR => {
                let mut out = Vec::new();
                loop {
                    let chunk_len = self.read_ub4()? as usize;
                    if chunk_len == 0 {
                        break;
                    }
                    out.extend_from_slice(&self.read_bytes(chunk_len)?);
                }
                Ok(Some(out))
            }
            n => Ok(Some(self.read_bytes_vec(n as usize)?)),
        }
    }

    /// Skip a length-prefixed byte string without materializing it
    pub fn skip_bytes_with_length(&mut self) -> Result<()> {
        let first = self.read_u8()?;
        match first {
            0 | length::NULL_INDICATOR => Ok(()),
            length::LONG_INDICATOR => {
                loop {
                    let chunk_len = self.read_ub4()? as usize;
                    if chunk_len == 0 {
                        break;
                    }
                    self.skip(chunk_len)?;
                }
                Ok(())
            }
            n => self.skip(n as usize),
        }
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_str_with_length(&mut self) -> Result<Option<String>> {
        match self.read_bytes_with_length()? {
            None => Ok(None),
            Some(raw) => String::from_utf8(raw)
                .map(Some)
                .map_err(|e| Error::UnsupportedConversion(format!("invalid UTF-8 string: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::WriteBuffer;

    #[test]
    fn test_fixed_width_reads() {
        let mut buf = ReadBuffer::from_slice(&[0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x03]);
        assert_eq!(buf.read_u8().unwrap(), 1);
        assert_eq!(buf.read_u16_be().unwrap(), 2);
        assert_eq!(buf.read_u32_be().unwrap(), 3);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_underflow() {
        let mut buf = ReadBuffer::from_slice(&[0x01]);
        assert!(matches!(
            buf.read_u32_be(),
            Err(Error::BufferUnderflow { needed: 4, available: 1 })
        ));
    }

    #[test]
    fn test_ub2_shapes() {
        let mut buf = ReadBuffer::from_slice(&[0x00, 0x01, 0x7f, 0x02, 0x01, 0x00]);
        assert_eq!(buf.read_ub2().unwrap(), 0);
        assert_eq!(buf.read_ub2().unwrap(), 0x7f);
        assert_eq!(buf.read_ub2().unwrap(), 0x100);
    }

    #[test]
    fn test_ub4_three_byte_form() {
        let mut buf = ReadBuffer::from_slice(&[0x03, 0x01, 0x02, 0x03]);
        assert_eq!(buf.read_ub4().unwrap(), 0x010203);
    }

    #[test]
    fn test_ub8_roundtrip() {
        for value in [0u64, 1, 255, 256, 65536, u32::MAX as u64 + 1, u64::MAX] {
            let mut w = WriteBuffer::new();
            w.write_ub8(value).unwrap();
            let mut r = ReadBuffer::from_slice(w.as_slice());
            assert_eq!(r.read_ub8().unwrap(), value);
        }
    }

    #[test]
    fn test_invalid_length_indicator() {
        let mut buf = ReadBuffer::from_slice(&[0x05, 0, 0, 0, 0, 0]);
        assert!(matches!(
            buf.read_ub4(),
            Err(Error::InvalidLengthIndicator(5))
        ));
    }

    #[test]
    fn test_inline_byte_string() {
        let mut buf = ReadBuffer::from_slice(&[0x03, b'a', b'b', b'c']);
        assert_eq!(buf.read_bytes_with_length().unwrap().unwrap(), b"abc");
    }

    #[test]
    fn test_null_byte_string() {
        let mut buf = ReadBuffer::from_slice(&[0xff]);
        assert!(buf.read_bytes_with_length().unwrap().is_none());
    }

    #[test]
    fn test_chunked_byte_string() {
        // long indicator, chunk of 3, chunk of 2, terminator
        let data = [
            0xfe, 0x01, 0x03, b'a', b'b', b'c', 0x01, 0x02, b'd', b'e', 0x00,
        ];
        let mut buf = ReadBuffer::from_slice(&data);
        assert_eq!(buf.read_bytes_with_length().unwrap().unwrap(), b"abcde");
    }

    #[test]
    fn test_skip_chunked_byte_string() {
        let data = [0xfe, 0x01, 0x02, b'x', b'y', 0x00, 0x42];
        let mut buf = ReadBuffer::from_slice(&data);
        buf.skip_bytes_with_length().unwrap();
        assert_eq!(buf.read_u8().unwrap(), 0x42);
    }
}
