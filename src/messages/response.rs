//! Call response parsing
//!
//! Every call ends with the server streaming a sequence of typed messages
//! inside DATA packets: column describe information, row headers and row
//! data for queries, parameter key/value lists for logon calls, status words
//! for transaction control, and an error/status block that closes the call
//! (error code 0 means success; 1403 means the fetch ran off the end of the
//! result set).
//!
//! Message layouts handled here:
//!
//! - **Error** (4): ub4 call status, ub2 cursor id, ub2 error position,
//!   ub8 rows affected, ub4 error code, length-prefixed message when the
//!   code is nonzero.
//! - **DescribeInfo** (16): ub4 column count, then per column ub1 type,
//!   ub1 nullable, ub2 precision, ub2 scale + 130, ub4 max size,
//!   length-prefixed name.
//! - **RowHeader** (6): ub1 flags, ub2 request count, ub4 iteration, ub4
//!   iteration count, ub2 buffer length — all ignored after validation.
//! - **RowData** (7): one length-prefixed field per described column, or
//!   per OUT bind when the call carries out-bind values.
//! - **Parameter** (8): ub2 pair count, then keyword/value/flags triples.
//! - **Status** (9): ub4 call status, ub2 sequence.
//! - **Warning** (15): ub2 code, length-prefixed message, ignored.
//! - **BitVector** (21): one bit per described column.
//! - **IoVector** (11): ub2 count, one direction byte per bind.
//! - **EndOfResponse** (29): closes the response stream.

use std::collections::HashMap;

use crate::buffer::ReadBuffer;
use crate::constants::{MessageType, OracleType};
use crate::error::{Error, Result};
use crate::row::{ColumnInfo, Row, Value};

/// The error/status block that terminates a call
#[derive(Debug, Clone, Default)]
pub struct ErrorInfo {
    /// Call status word
    pub call_status: u32,
    /// Cursor id assigned or confirmed by the server
    pub cursor_id: u16,
    /// Byte offset of a parse error inside the SQL text
    pub error_position: u16,
    /// Rows affected by the call
    pub rows_affected: u64,
    /// Server error code; 0 on success
    pub code: u32,
    /// Server error message
    pub message: String,
}

impl ErrorInfo {
    /// Whether this block reports a real error (1403 ends a fetch, it does
    /// not fail the call)
    pub fn is_error(&self) -> bool {
        self.code != 0 && self.code != crate::constants::error_code::NO_DATA_FOUND
    }

    /// Whether the cursor is exhausted
    pub fn is_end_of_fetch(&self) -> bool {
        self.code == crate::constants::error_code::NO_DATA_FOUND
    }

    /// Convert into the error this block reports
    pub fn into_error(self) -> Error {
        Error::OracleError {
            code: self.code,
            message: self.message,
            offset: self.error_position as u32,
        }
    }
}

/// Everything a call response can carry
#[derive(Debug, Default)]
pub struct ServerResponse {
    /// Column metadata, present when the server (re)described the cursor
    pub columns: Option<Vec<ColumnInfo>>,
    /// Fetched rows
    pub rows: Vec<Row>,
    /// OUT bind values
    pub out_binds: Vec<Value>,
    /// Keyword/value parameters (authentication, piggyback responses)
    pub parameters: HashMap<String, String>,
    /// Chunk payload of a LOB read
    pub lob_data: Option<Vec<u8>>,
    /// Terminating error/status block
    pub error: Option<ErrorInfo>,
    /// Plain status word for calls that return no error block
    pub call_status: Option<u32>,
    /// Whether an explicit end-of-response marker was seen
    pub end_of_response: bool,
}

impl ServerResponse {
    /// Rows affected as reported by the terminating block
    pub fn rows_affected(&self) -> u64 {
        self.error.as_ref().map(|e| e.rows_affected).unwrap_or(0)
    }

    /// Promote a terminating error block into a failure
    pub fn into_result(self) -> Result<ServerResponse> {
        if let Some(info) = &self.error {
            if info.is_error() {
                return Err(info.clone().into_error());
            }
        }
        Ok(self)
    }
}

/// Streaming parser for the message sequence of one call response
#[derive(Debug)]
pub struct ResponseParser {
    /// Column metadata used to decode row data
    columns: Vec<ColumnInfo>,
    /// Expected OUT bind types; when nonempty, row data decodes as binds
    out_bind_types: Vec<OracleType>,
}

impl ResponseParser {
    /// Create a parser with no prior metadata
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            out_bind_types: Vec::new(),
        }
    }

    /// Seed column metadata from a cached statement so row data arriving
    /// without a fresh describe can be decoded
    pub fn with_columns(mut self, columns: Vec<ColumnInfo>) -> Self {
        self.columns = columns;
        self
    }

    /// Declare the OUT binds the call carries
    pub fn with_out_binds(mut self, types: Vec<OracleType>) -> Self {
        self.out_bind_types = types;
        self
    }

    /// Parse an accumulated response body
    pub fn parse(&mut self, body: &[u8]) -> Result<ServerResponse> {
        let mut buf = ReadBuffer::from_slice(body);
        let mut response = ServerResponse::default();

        while buf.remaining() > 0 {
            let message_type = MessageType::try_from(buf.read_u8()?)?;
            match message_type {
                MessageType::Error => {
                    response.error = Some(self.parse_error(&mut buf)?);
                }
                MessageType::DescribeInfo => {
                    let columns = self.parse_describe(&mut buf)?;
                    self.columns = columns.clone();
                    response.columns = Some(columns);
                }
                MessageType::RowHeader => {
                    buf.read_ub1()?; // flags
                    buf.read_ub2()?; // request count
                    buf.read_ub4()?; // iteration number
                    buf.read_ub4()?; // iteration count
                    buf.read_ub2()?; // buffer length
                }
                MessageType::RowData => {
                    if self.out_bind_types.is_empty() {
                        let row = self.parse_row(&mut buf)?;
                        response.rows.push(row);
                    } else {
                        response.out_binds = self.parse_out_binds(&mut buf)?;
                    }
                }
                MessageType::Parameter => {
                    self.parse_parameters(&mut buf, &mut response.parameters)?;
                }
                MessageType::Status => {
                    response.call_status = Some(buf.read_ub4()?);
                    buf.read_ub2()?; // sequence
                }
                MessageType::LobData => {
                    response.lob_data = buf.read_bytes_with_length()?;
                }
                MessageType::Warning => {
                    let _code = buf.read_ub2()?;
                    buf.skip_bytes_with_length()?;
                }
                MessageType::BitVector => {
                    let bytes = self.columns.len().div_ceil(8);
                    buf.skip(bytes)?;
                }
                MessageType::IoVector => {
                    let count = buf.read_ub2()? as usize;
                    buf.skip(count)?;
                }
                MessageType::ServerSidePiggyback => {
                    buf.read_ub1()?; // opcode
                    buf.skip_bytes_with_length()?;
                }
                MessageType::EndOfResponse => {
                    response.end_of_response = true;
                    break;
                }
                other => {
                    return Err(Error::ProtocolViolation(format!(
                        "unexpected message {:?} in call response",
                        other
                    )));
                }
            }
        }

        Ok(response)
    }

    fn parse_error(&self, buf: &mut ReadBuffer) -> Result<ErrorInfo> {
        let call_status = buf.read_ub4()?;
        let cursor_id = buf.read_ub2()?;
        let error_position = buf.read_ub2()?;
        let rows_affected = buf.read_ub8()?;
        let code = buf.read_ub4()?;
        let message = if code != 0 {
            buf.read_str_with_length()?.unwrap_or_default()
        } else {
            String::new()
        };
        Ok(ErrorInfo {
            call_status,
            cursor_id,
            error_position,
            rows_affected,
            code,
            message: message.trim_end().to_string(),
        })
    }

    fn parse_describe(&self, buf: &mut ReadBuffer) -> Result<Vec<ColumnInfo>> {
        let count = buf.read_ub4()? as usize;
        if count > 1000 {
            return Err(Error::ProtocolViolation(format!(
                "implausible column count {}",
                count
            )));
        }
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            let oracle_type = OracleType::try_from(buf.read_ub1()?)?;
            let nullable = buf.read_ub1()? != 0;
            let precision = buf.read_ub2()? as i16;
            let scale = buf.read_ub2()? as i16 - 130;
            let max_size = buf.read_ub4()?;
            let name = buf.read_str_with_length()?.unwrap_or_default();
            columns.push(ColumnInfo {
                name,
                oracle_type,
                max_size,
                precision,
                scale,
                nullable,
            });
        }
        Ok(columns)
    }

    fn parse_row(&self, buf: &mut ReadBuffer) -> Result<Row> {
        if self.columns.is_empty() {
            return Err(Error::ProtocolViolation(
                "row data arrived before any column description".into(),
            ));
        }
        let mut values = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let raw = buf.read_bytes_with_length()?;
            let value = match raw {
                None => Value::Null,
                Some(raw) => Value::decode(&raw, column.oracle_type)?,
            };
            values.push(value);
        }
        Ok(Row::new(values))
    }

    fn parse_out_binds(&self, buf: &mut ReadBuffer) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(self.out_bind_types.len());
        for oracle_type in &self.out_bind_types {
            let raw = buf.read_bytes_with_length()?;
            let value = match raw {
                None => Value::Null,
                Some(raw) => Value::decode(&raw, *oracle_type)?,
            };
            values.push(value);
        }
        Ok(values)
    }

    fn parse_parameters(
        &self,
        buf: &mut ReadBuffer,
        out: &mut HashMap<String, String>,
    ) -> Result<()> {
        let count = buf.read_ub2()? as usize;
        for _ in 0..count {
            let key_len = buf.read_ub4()? as usize;
            let key = if key_len > 0 {
                buf.read_str_with_length()?.unwrap_or_default()
            } else {
                String::new()
            };
            let value_len = buf.read_ub4()? as usize;
            let value = if value_len > 0 {
                buf.read_str_with_length()?.unwrap_or_default()
            } else {
                String::new()
            };
            buf.read_ub4()?; // flags
            if !key.is_empty() {
                out.insert(key, value);
            }
        }
        Ok(())
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-side response builder mirroring the layouts the parser
/// understands. Test-only: scripted transports use it to fabricate call
/// responses.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::buffer::WriteBuffer;

    pub(crate) struct ResponseBuilder {
        buf: WriteBuffer,
    }

    impl ResponseBuilder {
        pub fn new() -> Self {
            Self {
                buf: WriteBuffer::new(),
            }
        }

        pub fn error_block(mut self, code: u32, message: &str, rows_affected: u64) -> Self {
            self.buf.write_u8(MessageType::Error as u8).unwrap();
            self.buf.write_ub4(if code == 0 { 0 } else { 1 }).unwrap();
            self.buf.write_ub2(1).unwrap(); // cursor id
            self.buf.write_ub2(0).unwrap(); // error position
            self.buf.write_ub8(rows_affected).unwrap();
            self.buf.write_ub4(code).unwrap();
            if code != 0 {
                self.buf.write_str_with_length(message).unwrap();
            }
            self
        }

        pub fn error_block_with_cursor(
            mut self,
            code: u32,
            cursor_id: u16,
            rows_affected: u64,
        ) -> Self {
            self.buf.write_u8(MessageType::Error as u8).unwrap();
            self.buf.write_ub4(if code == 0 { 0 } else { 1 }).unwrap();
            self.buf.write_ub2(cursor_id).unwrap();
            self.buf.write_ub2(0).unwrap();
            self.buf.write_ub8(rows_affected).unwrap();
            self.buf.write_ub4(code).unwrap();
            if code != 0 {
                self.buf.write_str_with_length("error").unwrap();
            }
            self
        }

        pub fn describe(mut self, columns: &[(OracleType, &str)]) -> Self {
            self.buf.write_u8(MessageType::DescribeInfo as u8).unwrap();
            self.buf.write_ub4(columns.len() as u32).unwrap();
            for (oracle_type, name) in columns {
                self.buf.write_ub1(*oracle_type as u8).unwrap();
                self.buf.write_ub1(1).unwrap(); // nullable
                self.buf.write_ub2(0).unwrap(); // precision
                self.buf.write_ub2(130).unwrap(); // scale 0
                self.buf.write_ub4(4000).unwrap();
                self.buf.write_str_with_length(name).unwrap();
            }
            self
        }

        pub fn row(mut self, fields: &[Option<Vec<u8>>]) -> Self {
            self.buf.write_u8(MessageType::RowData as u8).unwrap();
            for field in fields {
                match field {
                    Some(raw) => self.buf.write_bytes_with_length(raw).unwrap(),
                    None => self.buf.write_null().unwrap(),
                }
            }
            self
        }

        pub fn parameters(mut self, pairs: &[(&str, &str)]) -> Self {
            self.buf.write_u8(MessageType::Parameter as u8).unwrap();
            self.buf.write_ub2(pairs.len() as u16).unwrap();
            for (key, value) in pairs {
                self.buf.write_key_value(key, value, 0).unwrap();
            }
            self
        }

        pub fn lob_data(mut self, data: &[u8]) -> Self {
            self.buf.write_u8(MessageType::LobData as u8).unwrap();
            self.buf.write_bytes_with_length(data).unwrap();
            self
        }

        pub fn status(mut self, call_status: u32) -> Self {
            self.buf.write_u8(MessageType::Status as u8).unwrap();
            self.buf.write_ub4(call_status).unwrap();
            self.buf.write_ub2(0).unwrap();
            self
        }

        pub fn end_of_response(mut self) -> Self {
            self.buf.write_u8(MessageType::EndOfResponse as u8).unwrap();
            self
        }

        pub fn build(self) -> Vec<u8> {
            self.buf.as_slice().to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ResponseBuilder;
    use super::*;

    #[test]
    fn test_parse_success_block() {
        let body = ResponseBuilder::new().error_block(0, "", 3).build();
        let response = ResponseParser::new().parse(&body).unwrap();
        let info = response.error.as_ref().unwrap();
        assert!(!info.is_error());
        assert_eq!(response.rows_affected(), 3);
    }

    #[test]
    fn test_parse_server_error() {
        let body = ResponseBuilder::new()
            .error_block(942, "table or view does not exist", 0)
            .build();
        let response = ResponseParser::new().parse(&body).unwrap();
        let err = response.into_result().unwrap_err();
        assert_eq!(err.oracle_code(), Some(942));
    }

    #[test]
    fn test_parse_describe_and_rows() {
        let number = crate::types::encode_number("42").unwrap();
        let body = ResponseBuilder::new()
            .describe(&[(OracleType::Number, "ID"), (OracleType::Varchar, "NAME")])
            .row(&[Some(number), Some(b"alice".to_vec())])
            .row(&[None, Some(b"bob".to_vec())])
            .error_block(1403, "no data found", 2)
            .build();

        let response = ResponseParser::new().parse(&body).unwrap();
        let columns = response.columns.as_ref().unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "ID");
        assert_eq!(response.rows.len(), 2);
        assert_eq!(response.rows[0].get(0).unwrap().as_i64(), Some(42));
        assert!(response.rows[1].get(0).unwrap().is_null());
        assert!(response.error.unwrap().is_end_of_fetch());
    }

    #[test]
    fn test_parse_parameters() {
        let body = ResponseBuilder::new()
            .parameters(&[("AUTH_SESSION_ID", "17"), ("AUTH_SERIAL_NUM", "3")])
            .error_block(0, "", 0)
            .build();
        let response = ResponseParser::new().parse(&body).unwrap();
        assert_eq!(response.parameters["AUTH_SESSION_ID"], "17");
        assert_eq!(response.parameters["AUTH_SERIAL_NUM"], "3");
    }

    #[test]
    fn test_parse_out_binds() {
        let number = crate::types::encode_number("7").unwrap();
        let body = ResponseBuilder::new()
            .row(&[Some(number), Some(b"out".to_vec())])
            .error_block(0, "", 1)
            .build();
        let mut parser = ResponseParser::new()
            .with_out_binds(vec![OracleType::Number, OracleType::Varchar]);
        let response = parser.parse(&body).unwrap();
        assert_eq!(response.out_binds.len(), 2);
        assert_eq!(response.out_binds[0].as_i64(), Some(7));
        assert_eq!(response.out_binds[1].as_str(), Some("out"));
    }

    #[test]
    fn test_row_without_describe_rejected() {
        let body = ResponseBuilder::new().row(&[Some(b"x".to_vec())]).build();
        assert!(matches!(
            ResponseParser::new().parse(&body),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_end_of_response_stops_parsing() {
        let mut body = ResponseBuilder::new()
            .status(0)
            .end_of_response()
            .build();
        // trailing garbage after the marker must not be touched
        body.push(0xFF);
        let response = ResponseParser::new().parse(&body).unwrap();
        assert!(response.end_of_response);
        assert_eq!(response.call_status, Some(0));
    }

    #[test]
    fn test_seeded_columns_allow_rows_without_describe() {
        let number = crate::types::encode_number("5").unwrap();
        let body = ResponseBuilder::new()
            .row(&[Some(number)])
            .error_block(1403, "", 1)
            .build();
        let columns = vec![ColumnInfo {
            name: "N".into(),
            oracle_type: OracleType::Number,
            max_size: 22,
            precision: 0,
            scale: 0,
            nullable: true,
        }];
        let mut parser = ResponseParser::new().with_columns(columns);
        let response = parser.parse(&body).unwrap();
        assert_eq!(response.rows[0].get(0).unwrap().as_i64(), Some(5));
    }
}
