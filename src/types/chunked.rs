//! Inline vs. chunked wire representation
//!
//! String and RAW columns travel inline while their runtime length stays at
//! or below the inline limit (252 bytes). The first longer value switches the
//! column to the indirect chunked form for the rest of its lifetime; the
//! server signals the switch by re-describing the column with a LONG type.
//! [`ChunkedBytes`] models the two representations explicitly and
//! [`ChunkedBytes::promote`] applies the one-way promotion rule.

use bytes::Bytes;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::constants::INLINE_LENGTH_LIMIT;
use crate::error::Result;

/// A value in either the inline or the indirect chunked wire form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkedBytes {
    /// Single length-prefixed run, at most [`INLINE_LENGTH_LIMIT`] bytes
    Inline(Bytes),
    /// Sequence of ub4-prefixed chunks terminated by a zero-length chunk
    Chunked(Vec<Bytes>),
}

impl ChunkedBytes {
    /// Wrap raw bytes in the representation their length demands
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        if data.len() <= INLINE_LENGTH_LIMIT {
            ChunkedBytes::Inline(data)
        } else {
            ChunkedBytes::Chunked(
                data.chunks(32767)
                    .map(Bytes::copy_from_slice)
                    .collect(),
            )
        }
    }

    /// Whether this value is in the inline form
    pub fn is_inline(&self) -> bool {
        matches!(self, ChunkedBytes::Inline(_))
    }

    /// Total payload length
    pub fn len(&self) -> usize {
        match self {
            ChunkedBytes::Inline(b) => b.len(),
            ChunkedBytes::Chunked(chunks) => chunks.iter().map(|c| c.len()).sum(),
        }
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into contiguous bytes
    pub fn into_bytes(self) -> Bytes {
        match self {
            ChunkedBytes::Inline(b) => b,
            ChunkedBytes::Chunked(chunks) => {
                let mut out = Vec::with_capacity(chunks.iter().map(|c| c.len()).sum());
                for chunk in chunks {
                    out.extend_from_slice(&chunk);
                }
                Bytes::from(out)
            }
        }
    }

    /// One-way promotion to the chunked form. Once a column has crossed the
    /// inline threshold all subsequent values use the chunked encoding, even
    /// short ones.
    pub fn promote(self) -> Self {
        match self {
            ChunkedBytes::Inline(b) => ChunkedBytes::Chunked(vec![b]),
            chunked => chunked,
        }
    }

    /// Encode with the length prefix appropriate to the representation
    pub fn write(&self, buf: &mut WriteBuffer) -> Result<()> {
        match self {
            ChunkedBytes::Inline(b) => buf.write_bytes_with_length(b),
            ChunkedBytes::Chunked(chunks) => {
                buf.write_u8(crate::constants::length::LONG_INDICATOR)?;
                for chunk in chunks {
                    if !chunk.is_empty() {
                        buf.write_ub4(chunk.len() as u32)?;
                        buf.write_bytes(chunk)?;
                    }
                }
                buf.write_ub4(0)
            }
        }
    }

    /// Decode a value, preserving which representation the wire used
    pub fn read(buf: &mut ReadBuffer) -> Result<Option<Self>> {
        // peek at the indicator by reading it through the normal path
        let raw = buf.read_bytes_with_length()?;
        Ok(raw.map(|data| {
            if data.len() <= INLINE_LENGTH_LIMIT {
                ChunkedBytes::Inline(Bytes::from(data))
            } else {
                ChunkedBytes::Chunked(vec![Bytes::from(data)])
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_value_stays_inline() {
        let v = ChunkedBytes::from_bytes(vec![1u8; 252]);
        assert!(v.is_inline());
        assert_eq!(v.len(), 252);
    }

    #[test]
    fn test_long_value_goes_chunked() {
        let v = ChunkedBytes::from_bytes(vec![1u8; 253]);
        assert!(!v.is_inline());
        assert_eq!(v.len(), 253);
    }

    #[test]
    fn test_promotion_is_one_way() {
        let v = ChunkedBytes::from_bytes(vec![1u8; 10]).promote();
        assert!(!v.is_inline());
        let v = v.promote();
        assert!(!v.is_inline());
        assert_eq!(v.len(), 10);
    }

    #[test]
    fn test_wire_roundtrip_inline() {
        let v = ChunkedBytes::from_bytes(b"hello".to_vec());
        let mut w = WriteBuffer::new();
        v.write(&mut w).unwrap();
        let mut r = ReadBuffer::from_slice(w.as_slice());
        let back = ChunkedBytes::read(&mut r).unwrap().unwrap();
        assert_eq!(back.into_bytes().as_ref(), b"hello");
    }

    #[test]
    fn test_wire_roundtrip_chunked() {
        let data = vec![0x77u8; 70_000];
        let v = ChunkedBytes::from_bytes(data.clone());
        let mut w = WriteBuffer::new();
        v.write(&mut w).unwrap();
        let mut r = ReadBuffer::from_slice(w.as_slice());
        let back = ChunkedBytes::read(&mut r).unwrap().unwrap();
        assert_eq!(back.into_bytes().as_ref(), &data[..]);
    }

    #[test]
    fn test_promoted_short_value_uses_long_encoding() {
        let v = ChunkedBytes::from_bytes(b"ab".to_vec()).promote();
        let mut w = WriteBuffer::new();
        v.write(&mut w).unwrap();
        assert_eq!(w.as_slice()[0], crate::constants::length::LONG_INDICATOR);
        let mut r = ReadBuffer::from_slice(w.as_slice());
        let back = ChunkedBytes::read(&mut r).unwrap().unwrap();
        assert_eq!(back.into_bytes().as_ref(), b"ab");
    }
}
