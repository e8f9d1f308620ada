//! LOB operations
//!
//! Row data only ever carries LOB locators; content moves through dedicated
//! LOB calls that read or write a chunk at a time against the locator.
//! Offsets are 1-based on the wire, matching the server's addressing.

use crate::buffer::WriteBuffer;
use crate::constants::FunctionCode;
use crate::error::{Error, Result};
use crate::messages::write_function_header;
use crate::types::LobLocator;

/// LOB operation codes
#[allow(missing_docs)]
pub mod lob_op {
    pub const GET_LENGTH: u32 = 0x0001;
    pub const READ: u32 = 0x0002;
    pub const TRIM: u32 = 0x0020;
    pub const WRITE: u32 = 0x0040;
}

/// One LOB call against a locator
#[derive(Debug)]
pub struct LobOpRequest<'a> {
    /// The locator being operated on
    pub locator: &'a LobLocator,
    /// Operation code
    pub operation: u32,
    /// 1-based offset for reads and writes
    pub offset: u64,
    /// Amount to read, or new length for trim
    pub amount: u64,
    /// Data to write
    pub data: Option<&'a [u8]>,
}

impl<'a> LobOpRequest<'a> {
    /// Query the LOB's length
    pub fn get_length(locator: &'a LobLocator) -> Self {
        Self {
            locator,
            operation: lob_op::GET_LENGTH,
            offset: 0,
            amount: 0,
            data: None,
        }
    }

    /// Read `amount` units starting at 1-based `offset`
    pub fn read(locator: &'a LobLocator, offset: u64, amount: u64) -> Result<Self> {
        if offset == 0 {
            return Err(Error::InvalidParameter("LOB offsets are 1-based".into()));
        }
        Ok(Self {
            locator,
            operation: lob_op::READ,
            offset,
            amount,
            data: None,
        })
    }

    /// Write `data` starting at 1-based `offset`
    pub fn write(locator: &'a LobLocator, offset: u64, data: &'a [u8]) -> Result<Self> {
        if offset == 0 {
            return Err(Error::InvalidParameter("LOB offsets are 1-based".into()));
        }
        Ok(Self {
            locator,
            operation: lob_op::WRITE,
            offset,
            amount: data.len() as u64,
            data: Some(data),
        })
    }

    /// Truncate the LOB to `new_length`
    pub fn trim(locator: &'a LobLocator, new_length: u64) -> Self {
        Self {
            locator,
            operation: lob_op::TRIM,
            offset: 0,
            amount: new_length,
            data: None,
        }
    }

    /// Write the message body
    pub fn write_message(&self, buf: &mut WriteBuffer, sequence: u8) -> Result<()> {
        write_function_header(buf, FunctionCode::LobOp, sequence)?;
        buf.write_ub4(self.operation)?;
        buf.write_bytes_with_length(self.locator.as_bytes())?;
        buf.write_ub8(self.offset)?;
        buf.write_ub8(self.amount)?;
        match self.data {
            Some(data) => buf.write_bytes_with_length(data),
            None => buf.write_null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MessageType;

    fn locator() -> LobLocator {
        LobLocator::from_bytes(vec![0u8; 40]).unwrap()
    }

    #[test]
    fn test_layout() {
        let locator = locator();
        let req = LobOpRequest::read(&locator, 1, 8192).unwrap();
        let mut buf = WriteBuffer::new();
        req.write_message(&mut buf, 3).unwrap();
        assert_eq!(
            &buf.as_slice()[..3],
            &[MessageType::Function as u8, FunctionCode::LobOp as u8, 3]
        );
    }

    #[test]
    fn test_zero_offset_rejected() {
        let locator = locator();
        assert!(LobOpRequest::read(&locator, 0, 10).is_err());
        assert!(LobOpRequest::write(&locator, 0, b"x").is_err());
    }

    #[test]
    fn test_write_carries_data_and_amount() {
        let locator = locator();
        let req = LobOpRequest::write(&locator, 5, b"hello").unwrap();
        assert_eq!(req.amount, 5);
        assert_eq!(req.data, Some(&b"hello"[..]));
    }
}
