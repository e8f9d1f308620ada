//! Parameterless function calls and piggybacks
//!
//! Commit, rollback, ping and logoff are bare function messages; the only
//! thing that varies is the function code. Cursor-close piggybacks ride in
//! front of the next real call instead of costing their own round trip.

use crate::buffer::WriteBuffer;
use crate::constants::{FunctionCode, MessageType};
use crate::error::Result;
use crate::messages::write_function_header;

/// A function call with no payload
#[derive(Debug, Clone, Copy)]
pub struct FunctionRequest(pub FunctionCode);

impl FunctionRequest {
    /// Write the message body
    pub fn write(&self, buf: &mut WriteBuffer, sequence: u8) -> Result<()> {
        write_function_header(buf, self.0, sequence)
    }
}

/// Piggyback closing server cursors evicted from the statement cache
#[derive(Debug)]
pub struct PiggybackCloseCursors<'a> {
    /// Cursor ids to close
    pub cursor_ids: &'a [u16],
}

impl PiggybackCloseCursors<'_> {
    /// Write the piggyback message in front of a function call
    pub fn write(&self, buf: &mut WriteBuffer, sequence: u8) -> Result<()> {
        buf.write_u8(MessageType::Piggyback as u8)?;
        buf.write_u8(FunctionCode::CloseCursors as u8)?;
        buf.write_u8(sequence)?;
        buf.write_ub4(self.cursor_ids.len() as u32)?;
        for cursor_id in self.cursor_ids {
            buf.write_ub2(*cursor_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_request_layout() {
        for function in [
            FunctionCode::Commit,
            FunctionCode::Rollback,
            FunctionCode::Ping,
            FunctionCode::Logoff,
        ] {
            let mut buf = WriteBuffer::new();
            FunctionRequest(function).write(&mut buf, 7).unwrap();
            assert_eq!(
                buf.as_slice(),
                &[MessageType::Function as u8, function as u8, 7]
            );
        }
    }

    #[test]
    fn test_close_cursors_piggyback() {
        let mut buf = WriteBuffer::new();
        PiggybackCloseCursors { cursor_ids: &[3, 9] }
            .write(&mut buf, 1)
            .unwrap();
        assert_eq!(buf.as_slice()[0], MessageType::Piggyback as u8);
        assert_eq!(buf.as_slice()[1], FunctionCode::CloseCursors as u8);
    }
}
