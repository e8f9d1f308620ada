//! Protocol and data-type negotiation messages
//!
//! Immediately after the accept packet, the client sends a protocol
//! negotiation message (announcing its version range and name) and a
//! data-type negotiation message (announcing charsets and the type table it
//! understands). The server's protocol response carries its banner, charset
//! ids and capability vectors.

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::capabilities::Capabilities;
use crate::constants::MessageType;
use crate::error::{Error, Result};

/// Client protocol negotiation message
#[derive(Debug)]
pub struct ProtocolRequest;

impl ProtocolRequest {
    /// Write the message body
    pub fn write(buf: &mut WriteBuffer) -> Result<()> {
        buf.write_u8(MessageType::Protocol as u8)?;
        buf.write_u8(6)?; // highest protocol understood
        buf.write_u8(0)?; // lowest acceptable
        buf.write_bytes(b"oranet\0") // client name, NUL terminated
    }
}

/// Server protocol negotiation response
#[derive(Debug)]
pub struct ProtocolResponse {
    /// Protocol level granted by the server
    pub server_version: u8,
    /// Server banner string
    pub server_banner: String,
    /// Database charset id
    pub charset_id: u16,
    /// Server flags
    pub server_flags: u8,
    /// Server compile-time capabilities
    pub server_compile_caps: Vec<u8>,
    /// Server runtime capabilities
    pub server_runtime_caps: Vec<u8>,
}

impl ProtocolResponse {
    /// Parse the body of a protocol response message (message type byte
    /// already consumed)
    pub fn parse(buf: &mut ReadBuffer) -> Result<Self> {
        let server_version = buf.read_u8()?;
        buf.skip(1)?; // always zero

        // NUL-terminated server banner
        let mut banner = Vec::new();
        loop {
            let b = buf.read_u8()?;
            if b == 0 {
                break;
            }
            banner.push(b);
            if banner.len() > 256 {
                return Err(Error::ProtocolViolation(
                    "unterminated server banner".into(),
                ));
            }
        }

        let charset_id = buf.read_u16_be()?;
        let server_flags = buf.read_u8()?;

        let compile_caps_len = buf.read_u8()? as usize;
        let server_compile_caps = buf.read_bytes_vec(compile_caps_len)?;
        let runtime_caps_len = buf.read_u8()? as usize;
        let server_runtime_caps = buf.read_bytes_vec(runtime_caps_len)?;

        Ok(Self {
            server_version,
            server_banner: String::from_utf8_lossy(&banner).into_owned(),
            charset_id,
            server_flags,
            server_compile_caps,
            server_runtime_caps,
        })
    }
}

/// Client data-type negotiation message
#[derive(Debug)]
pub struct DataTypesRequest;

impl DataTypesRequest {
    /// Write the message body: charsets, conversion flags and the
    /// terminating zero entry of the type table
    pub fn write(buf: &mut WriteBuffer, caps: &Capabilities) -> Result<()> {
        buf.write_u8(MessageType::DataTypes as u8)?;
        buf.write_u16_be(caps.charset_id)?;
        buf.write_u16_be(caps.charset_id)?;
        buf.write_u8(0x01)?; // client-side conversion
        buf.write_bytes(&caps.compile_caps)?;
        // empty data type table: the server falls back to its own defaults
        buf.write_u16_be(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_request_layout() {
        let mut buf = WriteBuffer::new();
        ProtocolRequest::write(&mut buf).unwrap();
        assert_eq!(buf.as_slice()[0], MessageType::Protocol as u8);
        assert_eq!(buf.as_slice()[1], 6);
        assert!(buf.as_slice().ends_with(b"oranet\0"));
    }

    #[test]
    fn test_protocol_response_roundtrip() {
        let mut w = WriteBuffer::new();
        w.write_u8(6).unwrap();
        w.write_u8(0).unwrap();
        w.write_bytes(b"Oracle Database 19c\0").unwrap();
        w.write_u16_be(873).unwrap();
        w.write_u8(1).unwrap();
        w.write_u8(3).unwrap();
        w.write_bytes(&[6, 1, 1]).unwrap();
        w.write_u8(2).unwrap();
        w.write_bytes(&[2, 1]).unwrap();

        let mut r = ReadBuffer::from_slice(w.as_slice());
        let resp = ProtocolResponse::parse(&mut r).unwrap();
        assert_eq!(resp.server_version, 6);
        assert_eq!(resp.server_banner, "Oracle Database 19c");
        assert_eq!(resp.charset_id, 873);
        assert_eq!(resp.server_compile_caps, vec![6, 1, 1]);
        assert_eq!(resp.server_runtime_caps, vec![2, 1]);
    }

    #[test]
    fn test_data_types_request_carries_charset() {
        let caps = Capabilities::new();
        let mut buf = WriteBuffer::new();
        DataTypesRequest::write(&mut buf, &caps).unwrap();
        assert_eq!(buf.as_slice()[0], MessageType::DataTypes as u8);
        assert_eq!(
            u16::from_be_bytes([buf.as_slice()[1], buf.as_slice()[2]]),
            caps.charset_id
        );
    }
}
