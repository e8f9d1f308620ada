//! Packet framing
//!
//! The packet layer frames protocol messages into typed packets with an
//! 8-byte header. Payloads of DATA packets start with a 2-byte data-flags
//! word; everything after that belongs to the message layer.

mod header;

pub use header::{PacketBuilder, PacketHeader};

use bytes::Bytes;

use crate::constants::{MarkerType, PacketType, PACKET_HEADER_SIZE};
use crate::error::Result;

/// A complete packet with header and payload
#[derive(Debug, Clone)]
pub struct Packet {
    /// The packet header
    pub header: PacketHeader,
    /// The packet payload (everything after the 8-byte header)
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet with the given header and payload
    pub fn new(header: PacketHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// The packet type
    pub fn packet_type(&self) -> PacketType {
        self.header.packet_type
    }

    /// Check if this is a DATA packet
    pub fn is_data(&self) -> bool {
        self.header.packet_type == PacketType::Data
    }

    /// Check if this is a MARKER packet
    pub fn is_marker(&self) -> bool {
        self.header.packet_type == PacketType::Marker
    }

    /// The marker type carried by a MARKER packet, if recognizable.
    ///
    /// Marker payload is 3 bytes: 0x01, 0x00, marker type.
    pub fn marker_type(&self) -> Option<MarkerType> {
        if !self.is_marker() || self.payload.len() < 3 {
            return None;
        }
        match self.payload[2] {
            1 => Some(MarkerType::Break),
            2 => Some(MarkerType::Reset),
            3 => Some(MarkerType::Interrupt),
            _ => None,
        }
    }

    /// Build a MARKER packet of the given type
    pub fn marker(marker_type: MarkerType, large_sdu: bool) -> Result<Bytes> {
        let mut builder = PacketBuilder::new(PacketType::Marker).large_sdu(large_sdu);
        builder.payload().write_u8(1)?;
        builder.payload().write_u8(0)?;
        builder.payload().write_u8(marker_type as u8)?;
        builder.build()
    }

    /// The data-flags word of a DATA packet payload
    pub fn data_flags(&self) -> u16 {
        if self.is_data() && self.payload.len() >= 2 {
            u16::from_be_bytes([self.payload[0], self.payload[1]])
        } else {
            0
        }
    }

    /// The message body of a DATA packet (payload minus the data flags)
    pub fn message_body(&self) -> Bytes {
        if self.is_data() && self.payload.len() >= 2 {
            self.payload.slice(2..)
        } else {
            self.payload.clone()
        }
    }
}

/// Split an oversized message payload into DATA packets no larger than the
/// negotiated SDU. The data-flags word is carried on every packet; only the
/// final packet carries the caller's flags.
pub fn split_into_data_packets(
    payload: &[u8],
    sdu: usize,
    large_sdu: bool,
    final_flags: u16,
) -> Result<Vec<Bytes>> {
    let max_chunk = sdu.saturating_sub(PACKET_HEADER_SIZE + 2).max(1);
    let mut packets = Vec::with_capacity(payload.len() / max_chunk + 1);

    let mut chunks = payload.chunks(max_chunk).peekable();
    loop {
        let chunk = match chunks.next() {
            Some(c) => c,
            None => break,
        };
        let is_last = chunks.peek().is_none();
        let mut builder = PacketBuilder::new(PacketType::Data).large_sdu(large_sdu);
        builder
            .payload()
            .write_u16_be(if is_last { final_flags } else { 0 })?;
        builder.payload().write_bytes(chunk)?;
        packets.push(builder.build()?);
    }

    if packets.is_empty() {
        // zero-length message still produces one packet carrying the flags
        let mut builder = PacketBuilder::new(PacketType::Data).large_sdu(large_sdu);
        builder.payload().write_u16_be(final_flags)?;
        packets.push(builder.build()?);
    }

    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_flags_and_body() {
        let header = PacketHeader::new(PacketType::Data, 12);
        let packet = Packet::new(header, Bytes::from_static(&[0x08, 0x00, 0xAA, 0xBB]));
        assert_eq!(packet.data_flags(), 0x0800);
        assert_eq!(&packet.message_body()[..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_marker_packet_roundtrip() {
        let raw = Packet::marker(MarkerType::Break, false).unwrap();
        let header = PacketHeader::parse(&raw, false).unwrap();
        let packet = Packet::new(header, raw.slice(PACKET_HEADER_SIZE..));
        assert!(packet.is_marker());
        assert_eq!(packet.marker_type(), Some(MarkerType::Break));
    }

    #[test]
    fn test_split_small_payload_single_packet() {
        let packets = split_into_data_packets(&[1, 2, 3], 8192, false, 0x0800).unwrap();
        assert_eq!(packets.len(), 1);
        // header + flags + 3 bytes
        assert_eq!(packets[0].len(), PACKET_HEADER_SIZE + 2 + 3);
    }

    #[test]
    fn test_split_chunks_to_sdu() {
        let payload = vec![0u8; 100];
        // sdu of 42 leaves 32 payload bytes per packet
        let packets = split_into_data_packets(&payload, 42, false, 0).unwrap();
        assert_eq!(packets.len(), 4);
        for p in &packets {
            assert!(p.len() <= 42);
        }
    }

    #[test]
    fn test_split_empty_payload() {
        let packets = split_into_data_packets(&[], 8192, false, 0x0800).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), PACKET_HEADER_SIZE + 2);
    }
}
