//! Packet header encoding/decoding
//!
//! Every packet starts with an 8-byte header:
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! | Length (2 or 4) | Pkt Checksum(2) | Type(1)| Flags(1)| Hdr Checksum(2)|
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! ```
//!
//! For negotiated protocol versions >= 315 the length field widens to a
//! big-endian u32 and swallows the packet-checksum slot.

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::constants::{PacketType, PACKET_HEADER_SIZE};
use crate::error::{Error, Result};

/// Packet header (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Total packet length including the header
    pub length: u32,
    /// Packet type
    pub packet_type: PacketType,
    /// Packet flags
    pub flags: u8,
}

impl PacketHeader {
    /// Create a new packet header
    pub fn new(packet_type: PacketType, length: u32) -> Self {
        Self {
            length,
            packet_type,
            flags: 0,
        }
    }

    /// Create a new packet header with flags
    pub fn with_flags(packet_type: PacketType, length: u32, flags: u8) -> Self {
        Self {
            length,
            packet_type,
            flags,
        }
    }

    /// Parse a packet header from raw bytes.
    ///
    /// `large_sdu` selects the 4-byte length interpretation.
    pub fn parse(data: &[u8], large_sdu: bool) -> Result<Self> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(Error::PacketTooShort {
                expected: PACKET_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let mut buf = ReadBuffer::from_slice(data);
        Self::read(&mut buf, large_sdu)
    }

    /// Read a packet header from a buffer
    pub fn read(buf: &mut ReadBuffer, large_sdu: bool) -> Result<Self> {
        let length = if large_sdu {
            buf.read_u32_be()?
        } else {
            let len = buf.read_u16_be()? as u32;
            buf.skip(2)?; // packet checksum, always zero
            len
        };

        let packet_type = PacketType::try_from(buf.read_u8()?)?;
        let flags = buf.read_u8()?;
        buf.skip(2)?; // header checksum, always zero

        Ok(Self {
            length,
            packet_type,
            flags,
        })
    }

    /// Write a packet header to a buffer
    pub fn write(&self, buf: &mut WriteBuffer, large_sdu: bool) -> Result<()> {
        if large_sdu {
            buf.write_u32_be(self.length)?;
        } else {
            buf.write_u16_be(self.length as u16)?;
            buf.write_u16_be(0)?; // packet checksum
        }
        buf.write_u8(self.packet_type as u8)?;
        buf.write_u8(self.flags)?;
        buf.write_u16_be(0) // header checksum
    }

    /// Payload length (total length minus header)
    pub fn payload_length(&self) -> usize {
        (self.length as usize).saturating_sub(PACKET_HEADER_SIZE)
    }
}

/// Builder for constructing complete packets
#[derive(Debug)]
pub struct PacketBuilder {
    packet_type: PacketType,
    flags: u8,
    payload: WriteBuffer,
    large_sdu: bool,
}

impl PacketBuilder {
    /// Create a new packet builder for the given packet type
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            flags: 0,
            payload: WriteBuffer::new(),
            large_sdu: false,
        }
    }

    /// Select the 4-byte length field
    pub fn large_sdu(mut self, large_sdu: bool) -> Self {
        self.large_sdu = large_sdu;
        self
    }

    /// Set packet flags
    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Mutable access to the payload buffer
    pub fn payload(&mut self) -> &mut WriteBuffer {
        &mut self.payload
    }

    /// Build the complete packet
    pub fn build(self) -> Result<bytes::Bytes> {
        let total = PACKET_HEADER_SIZE + self.payload.len();
        let header = PacketHeader::with_flags(self.packet_type, total as u32, self.flags);

        let mut out = WriteBuffer::with_capacity(total);
        header.write(&mut out, self.large_sdu)?;
        out.write_bytes(self.payload.as_slice())?;
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_small_sdu() {
        let data = [
            0x00, 0x64, // length: 100
            0x00, 0x00, // packet checksum
            0x01, // type: CONNECT
            0x08, // flags
            0x00, 0x00, // header checksum
        ];
        let header = PacketHeader::parse(&data, false).unwrap();
        assert_eq!(header.length, 100);
        assert_eq!(header.packet_type, PacketType::Connect);
        assert_eq!(header.flags, 0x08);
    }

    #[test]
    fn test_parse_large_sdu() {
        let data = [0x00, 0x00, 0x20, 0x00, 0x06, 0x00, 0x00, 0x00];
        let header = PacketHeader::parse(&data, true).unwrap();
        assert_eq!(header.length, 8192);
        assert_eq!(header.packet_type, PacketType::Data);
    }

    #[test]
    fn test_roundtrip_both_widths() {
        for large in [false, true] {
            let original = PacketHeader::with_flags(PacketType::Accept, 256, 0x04);
            let mut buf = WriteBuffer::new();
            original.write(&mut buf, large).unwrap();
            let parsed = PacketHeader::parse(buf.as_slice(), large).unwrap();
            assert_eq!(parsed, original);
        }
    }

    #[test]
    fn test_payload_length() {
        let header = PacketHeader::new(PacketType::Data, 100);
        assert_eq!(header.payload_length(), 100 - PACKET_HEADER_SIZE);
    }

    #[test]
    fn test_builder() {
        let mut builder = PacketBuilder::new(PacketType::Connect);
        builder.payload().write_bytes(&[0x41, 0x42, 0x43]).unwrap();
        let packet = builder.build().unwrap();

        assert_eq!(packet.len(), 11);
        let header = PacketHeader::parse(&packet, false).unwrap();
        assert_eq!(header.length, 11);
        assert_eq!(header.packet_type, PacketType::Connect);
        assert_eq!(&packet[8..], &[0x41, 0x42, 0x43]);
    }

    #[test]
    fn test_parse_too_short() {
        assert!(PacketHeader::parse(&[0x00, 0x01, 0x02], false).is_err());
    }

    #[test]
    fn test_parse_invalid_type() {
        let data = [0x00, 0x08, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00];
        assert!(matches!(
            PacketHeader::parse(&data, false),
            Err(Error::InvalidPacketType(0xFF))
        ));
    }
}
