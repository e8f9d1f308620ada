//! Session establishment packets
//!
//! The connect packet carries the negotiation header and the connect
//! descriptor; the server answers with accept, refuse or redirect. Connect
//! descriptors longer than 230 bytes spill into a follow-up DATA packet.
//!
//! Connect packet body layout (after the 8-byte header):
//!
//! ```text
//! Offset | Size | Description
//! -------+------+------------------
//!      0 |    2 | Protocol version (desired)
//!      2 |    2 | Protocol version (minimum)
//!      4 |    2 | Service options
//!      6 |    2 | SDU size (16-bit)
//!      8 |    2 | TDU size (16-bit)
//!     10 |    2 | Protocol characteristics
//!     12 |    2 | Line turnaround
//!     14 |    2 | Value of 1
//!     16 |    2 | Connect data length
//!     18 |    2 | Connect data offset (74)
//!     20 |    4 | Max receivable data
//!     24 |    2 | NSI flags
//!     26 |   24 | Reserved
//!     50 |    4 | SDU size (32-bit)
//!     54 |    4 | TDU size (32-bit)
//!     58 |    4 | Connect flags 1
//!     62 |    4 | Connect flags 2
//!     66 |    8 | Reserved
//!     74 |    n | Connect descriptor
//! ```

use bytes::Bytes;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::config::ConnectParams;
use crate::constants::{connection, service_options, version, PacketType, PACKET_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::packet::{Packet, PacketBuilder, PacketHeader};

/// Connect packet builder
#[derive(Debug)]
pub struct ConnectMessage {
    /// Desired protocol version
    pub version_desired: u16,
    /// Minimum acceptable protocol version
    pub version_minimum: u16,
    /// Requested SDU
    pub sdu: u32,
    /// Requested TDU
    pub tdu: u32,
    /// Connect descriptor text
    pub connect_data: String,
}

impl ConnectMessage {
    /// Build a connect message from connection parameters
    pub fn from_params(params: &ConnectParams) -> Self {
        Self {
            version_desired: version::DESIRED,
            version_minimum: version::MINIMUM,
            sdu: params.sdu,
            tdu: connection::DEFAULT_TDU as u32,
            connect_data: params.connect_descriptor(),
        }
    }

    fn write_negotiation_header(&self, buf: &mut WriteBuffer, data_len: usize) -> Result<()> {
        buf.write_u16_be(self.version_desired)?;
        buf.write_u16_be(self.version_minimum)?;
        buf.write_u16_be(service_options::DONT_CARE | service_options::CAN_RECV_ATTENTION)?;
        buf.write_u16_be(self.sdu.min(65535) as u16)?;
        buf.write_u16_be(self.tdu.min(65535) as u16)?;
        buf.write_u16_be(connection::PROTOCOL_CHARACTERISTICS)?;
        buf.write_u16_be(0)?; // line turnaround
        buf.write_u16_be(1)?; // hardware byte order marker
        buf.write_u16_be(data_len as u16)?;
        buf.write_u16_be(74)?; // connect data offset
        buf.write_u32_be(0)?; // max receivable data
        buf.write_u16_be(0)?; // NSI flags
        buf.write_zeros(24)?; // reserved
        buf.write_u32_be(self.sdu)?;
        buf.write_u32_be(self.tdu)?;
        buf.write_u32_be(0)?; // connect flags 1
        buf.write_u32_be(0)?; // connect flags 2
        buf.write_zeros(8) // reserved
    }

    /// Build the connect packet, plus a continuation DATA packet when the
    /// descriptor exceeds the inline limit
    pub fn build(&self) -> Result<(Bytes, Option<Bytes>)> {
        let data = self.connect_data.as_bytes();
        let fits_inline = data.len() <= connection::MAX_CONNECT_DATA as usize;

        let mut connect = PacketBuilder::new(PacketType::Connect);
        self.write_negotiation_header(connect.payload(), data.len())?;
        if fits_inline {
            connect.payload().write_bytes(data)?;
            return Ok((connect.build()?, None));
        }

        let mut continuation = PacketBuilder::new(PacketType::Data);
        continuation.payload().write_u16_be(0)?;
        continuation.payload().write_bytes(data)?;
        Ok((connect.build()?, Some(continuation.build()?)))
    }
}

/// Parsed accept packet
#[derive(Debug)]
pub struct AcceptMessage {
    /// Protocol version granted by the server
    pub protocol_version: u16,
    /// Service options echoed by the server
    pub service_options: u16,
    /// Negotiated SDU
    pub sdu: u32,
    /// Negotiated TDU
    pub tdu: u32,
}

impl AcceptMessage {
    /// Parse an accept packet
    pub fn parse(packet: &Packet) -> Result<Self> {
        if packet.packet_type() != PacketType::Accept {
            return Err(Error::ProtocolViolation(format!(
                "expected accept packet, got {:?}",
                packet.packet_type()
            )));
        }
        let mut buf = ReadBuffer::from_slice(&packet.payload);

        let protocol_version = buf.read_u16_be()?;
        if protocol_version < version::MINIMUM {
            return Err(Error::ProtocolVersionNotSupported(
                protocol_version,
                version::MINIMUM,
            ));
        }

        let service_options = buf.read_u16_be()?;
        let sdu_16 = buf.read_u16_be()? as u32;
        let tdu_16 = buf.read_u16_be()? as u32;
        buf.skip(2)?; // hardware byte order
        buf.skip(4)?; // accept data length + offset
        buf.skip(2)?; // NSI flags
        buf.skip(8)?; // reserved

        // 32-bit SDU replaces the 16-bit field on modern versions
        let sdu = if protocol_version >= version::MIN_LARGE_SDU && buf.has_remaining(4) {
            buf.read_u32_be()?
        } else {
            sdu_16
        };

        Ok(Self {
            protocol_version,
            service_options,
            sdu,
            tdu: tdu_16,
        })
    }
}

/// Parsed refuse packet
#[derive(Debug)]
pub struct RefuseMessage {
    /// Error code extracted from the refuse data, when present
    pub error_code: Option<u32>,
    /// Raw refuse data
    pub message: Option<String>,
}

impl RefuseMessage {
    /// Parse a refuse packet.
    ///
    /// Body: user reason (1), system reason (1), data length (2), then the
    /// refuse data, typically a `(DESCRIPTION=...(ERR=code)...)` string.
    pub fn parse(packet: &Packet) -> Result<Self> {
        let mut buf = ReadBuffer::from_slice(&packet.payload);
        buf.skip(2)?; // user + system reason
        let data_len = buf.read_u16_be()? as usize;
        let message = if data_len > 0 && buf.has_remaining(data_len) {
            Some(String::from_utf8_lossy(&buf.read_bytes(data_len)?).into_owned())
        } else {
            None
        };

        let error_code = message.as_deref().and_then(extract_err_code);
        Ok(Self {
            error_code,
            message,
        })
    }

    /// Convert to the error this refusal represents
    pub fn into_error(self, params: &ConnectParams) -> Error {
        match self.error_code {
            Some(12514) => {
                Error::InvalidServiceName(params.service_name().unwrap_or_default().to_string())
            }
            code => Error::ConnectionRefused {
                error_code: code,
                message: self.message,
            },
        }
    }
}

fn extract_err_code(data: &str) -> Option<u32> {
    let start = data.find("(ERR=")? + 5;
    let rest = &data[start..];
    let end = rest.find(')')?;
    rest[..end].parse().ok()
}

/// Parsed redirect packet
#[derive(Debug)]
pub struct RedirectMessage {
    /// Host to reconnect to
    pub host: String,
    /// Port to reconnect to
    pub port: u16,
}

impl RedirectMessage {
    /// Parse a redirect packet.
    ///
    /// Body: data length (2), then an address descriptor naming the new
    /// listener.
    pub fn parse(packet: &Packet) -> Result<Self> {
        let mut buf = ReadBuffer::from_slice(&packet.payload);
        let data_len = buf.read_u16_be()? as usize;
        if !buf.has_remaining(data_len) {
            return Err(Error::ProtocolViolation(
                "redirect data shorter than declared".into(),
            ));
        }
        let data = String::from_utf8_lossy(&buf.read_bytes(data_len)?).into_owned();

        let host = extract_param(&data, "HOST").ok_or_else(|| {
            Error::ProtocolViolation("redirect descriptor missing HOST".into())
        })?;
        let port = extract_param(&data, "PORT")
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| Error::ProtocolViolation("redirect descriptor missing PORT".into()))?;

        Ok(Self { host, port })
    }
}

fn extract_param(data: &str, key: &str) -> Option<String> {
    let needle = format!("({}=", key);
    let start = data.find(&needle)? + needle.len();
    let rest = &data[start..];
    let end = rest.find(')')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(packet_type: PacketType, payload: &[u8]) -> Packet {
        let header = PacketHeader::new(packet_type, (PACKET_HEADER_SIZE + payload.len()) as u32);
        Packet::new(header, Bytes::copy_from_slice(payload))
    }

    #[test]
    fn test_connect_inline() {
        let params = ConnectParams::new("localhost", 1521, "FREEPDB1", "u", "p");
        let msg = ConnectMessage::from_params(&params);
        let (connect, continuation) = msg.build().unwrap();
        assert!(continuation.is_none());
        assert_eq!(connect[4], PacketType::Connect as u8);
        // descriptor begins at offset 74 + header
        let descriptor = &connect[PACKET_HEADER_SIZE + 74..];
        assert!(std::str::from_utf8(descriptor).unwrap().contains("FREEPDB1"));
    }

    #[test]
    fn test_connect_spills_to_data_packet() {
        let long_service = "S".repeat(300);
        let params = ConnectParams::new("localhost", 1521, long_service, "u", "p");
        let (connect, continuation) = ConnectMessage::from_params(&params).build().unwrap();
        let continuation = continuation.expect("long descriptor needs continuation");
        assert_eq!(connect.len(), PACKET_HEADER_SIZE + 74);
        assert_eq!(continuation[4], PacketType::Data as u8);
    }

    #[test]
    fn test_accept_parse() {
        let mut payload = WriteBuffer::new();
        payload.write_u16_be(319).unwrap(); // version
        payload.write_u16_be(0x0001).unwrap(); // service options
        payload.write_u16_be(8192).unwrap(); // sdu 16
        payload.write_u16_be(65535).unwrap(); // tdu 16
        payload.write_u16_be(1).unwrap(); // byte order
        payload.write_u32_be(0).unwrap(); // data len + offset
        payload.write_u16_be(0).unwrap(); // NSI flags
        payload.write_zeros(8).unwrap(); // reserved
        payload.write_u32_be(65536).unwrap(); // sdu 32

        let accept = AcceptMessage::parse(&packet(PacketType::Accept, payload.as_slice())).unwrap();
        assert_eq!(accept.protocol_version, 319);
        assert_eq!(accept.sdu, 65536);
        assert_eq!(accept.tdu, 65535);
    }

    #[test]
    fn test_accept_rejects_old_version() {
        let mut payload = WriteBuffer::new();
        payload.write_u16_be(200).unwrap();
        payload.write_zeros(30).unwrap();
        assert!(matches!(
            AcceptMessage::parse(&packet(PacketType::Accept, payload.as_slice())),
            Err(Error::ProtocolVersionNotSupported(200, _))
        ));
    }

    #[test]
    fn test_accept_wrong_packet_type() {
        assert!(AcceptMessage::parse(&packet(PacketType::Data, &[])).is_err());
    }

    #[test]
    fn test_refuse_parse_with_err_code() {
        let data = b"(DESCRIPTION=(TMP=)(VSNNUM=0)(ERR=12514)(ERROR_STACK=(ERROR=(CODE=12514))))";
        let mut payload = WriteBuffer::new();
        payload.write_u8(0).unwrap();
        payload.write_u8(0).unwrap();
        payload.write_u16_be(data.len() as u16).unwrap();
        payload.write_bytes(data).unwrap();

        let refuse = RefuseMessage::parse(&packet(PacketType::Refuse, payload.as_slice())).unwrap();
        assert_eq!(refuse.error_code, Some(12514));

        let params = ConnectParams::new("h", 1521, "svc", "u", "p");
        assert!(matches!(
            refuse.into_error(&params),
            Error::InvalidServiceName(s) if s == "svc"
        ));
    }

    #[test]
    fn test_redirect_parse() {
        let data = b"(ADDRESS=(PROTOCOL=tcp)(HOST=10.0.0.5)(PORT=1522))";
        let mut payload = WriteBuffer::new();
        payload.write_u16_be(data.len() as u16).unwrap();
        payload.write_bytes(data).unwrap();

        let redirect =
            RedirectMessage::parse(&packet(PacketType::Redirect, payload.as_slice())).unwrap();
        assert_eq!(redirect.host, "10.0.0.5");
        assert_eq!(redirect.port, 1522);
    }

    #[test]
    fn test_redirect_missing_host() {
        let data = b"(ADDRESS=(PROTOCOL=tcp)(PORT=1522))";
        let mut payload = WriteBuffer::new();
        payload.write_u16_be(data.len() as u16).unwrap();
        payload.write_bytes(data).unwrap();
        assert!(RedirectMessage::parse(&packet(PacketType::Redirect, payload.as_slice())).is_err());
    }
}
