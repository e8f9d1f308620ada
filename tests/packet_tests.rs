//! Packet framing invariants

use oranet::constants::{MarkerType, PacketType, PACKET_HEADER_SIZE};
use oranet::packet::{split_into_data_packets, Packet, PacketBuilder, PacketHeader};

#[test]
fn test_declared_length_matches_readable_bytes() {
    let mut builder = PacketBuilder::new(PacketType::Data);
    builder.payload().write_u16_be(0).unwrap();
    builder.payload().write_bytes(&[1, 2, 3, 4, 5]).unwrap();
    let packet = builder.build().unwrap();

    let header = PacketHeader::parse(&packet, false).unwrap();
    assert_eq!(header.length as usize, packet.len());
    assert_eq!(header.payload_length(), packet.len() - PACKET_HEADER_SIZE);
}

#[test]
fn test_large_sdu_header_roundtrip() {
    let mut builder = PacketBuilder::new(PacketType::Data).large_sdu(true);
    builder.payload().write_bytes(&[0xAB; 100]).unwrap();
    let packet = builder.build().unwrap();

    let header = PacketHeader::parse(&packet, true).unwrap();
    assert_eq!(header.length as usize, packet.len());
    assert_eq!(header.packet_type, PacketType::Data);
}

#[test]
fn test_split_honors_sdu_for_every_packet() {
    let payload = vec![0x5Au8; 10_000];
    let sdu = 512;
    let packets = split_into_data_packets(&payload, sdu, false, 0x2000).unwrap();

    assert!(packets.len() > 1);
    let mut reassembled = Vec::new();
    for (i, raw) in packets.iter().enumerate() {
        assert!(raw.len() <= sdu, "packet {} exceeds the SDU", i);
        let header = PacketHeader::parse(raw, false).unwrap();
        assert_eq!(header.length as usize, raw.len());
        let packet = Packet::new(header, raw.slice(PACKET_HEADER_SIZE..));
        assert!(packet.is_data());
        // only the final packet carries the caller's flags
        if i + 1 == packets.len() {
            assert_eq!(packet.data_flags(), 0x2000);
        } else {
            assert_eq!(packet.data_flags(), 0);
        }
        reassembled.extend_from_slice(&packet.message_body());
    }
    assert_eq!(reassembled, payload);
}

#[test]
fn test_marker_packets_identify_their_type() {
    for marker_type in [MarkerType::Break, MarkerType::Reset] {
        let raw = Packet::marker(marker_type, false).unwrap();
        let header = PacketHeader::parse(&raw, false).unwrap();
        let packet = Packet::new(header, raw.slice(PACKET_HEADER_SIZE..));
        assert!(packet.is_marker());
        assert_eq!(packet.marker_type(), Some(marker_type));
    }
}

#[test]
fn test_unknown_packet_type_rejected() {
    let data = [0x00, 0x08, 0x00, 0x00, 0x42, 0x00, 0x00, 0x00];
    assert!(PacketHeader::parse(&data, false).is_err());
}
