//! Protocol messages
//!
//! Builders for the request messages each driver operation sends, and
//! parsers for the responses. Requests become the body of one or more DATA
//! packets; responses are parsed from the accumulated DATA payloads of a
//! call.

mod auth;
mod connect;
mod execute;
mod lob;
mod negotiate;
mod response;
mod simple;
mod tpc;

pub use auth::{classify_auth_error, AuthPhase, AuthRequest, SessionData};
pub use connect::{AcceptMessage, ConnectMessage, RedirectMessage, RefuseMessage};
pub use execute::{BatchExecuteRequest, ExecuteOptions, ExecuteRequest, FetchRequest};
pub use lob::{lob_op, LobOpRequest};
pub use negotiate::{DataTypesRequest, ProtocolRequest, ProtocolResponse};
pub use response::{ErrorInfo, ResponseParser, ServerResponse};
pub use simple::{FunctionRequest, PiggybackCloseCursors};
pub use tpc::{TpcChangeStateRequest, TpcSwitchRequest};

#[cfg(test)]
pub(crate) use response::testing;

use crate::buffer::WriteBuffer;
use crate::constants::{FunctionCode, MessageType};
use crate::error::Result;

/// Write the three-byte function message header shared by every TTC call
pub(crate) fn write_function_header(
    buf: &mut WriteBuffer,
    function: FunctionCode,
    sequence: u8,
) -> Result<()> {
    buf.write_u8(MessageType::Function as u8)?;
    buf.write_u8(function as u8)?;
    buf.write_u8(sequence)
}
