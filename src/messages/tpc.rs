//! Two-phase-commit protocol calls
//!
//! Two function codes drive distributed transactions: the transaction
//! switch (begin / end, associating or dissociating the session with a
//! branch) and the state change (prepare / commit / rollback / forget).
//! Both carry the Xid triple: format id, global transaction id and branch
//! qualifier.

use crate::buffer::WriteBuffer;
use crate::constants::{tpc_function, FunctionCode};
use crate::error::Result;
use crate::messages::write_function_header;
use crate::tpc::Xid;

fn write_xid(buf: &mut WriteBuffer, xid: &Xid) -> Result<()> {
    buf.write_ub4(xid.format_id)?;
    buf.write_ub4(xid.global_transaction_id().len() as u32)?;
    buf.write_ub4(xid.branch_qualifier().len() as u32)?;
    let mut combined = xid.global_transaction_id().to_vec();
    combined.extend_from_slice(xid.branch_qualifier());
    buf.write_bytes_with_length(&combined)
}

/// Transaction switch: associate (begin/resume) or dissociate (end/suspend)
#[derive(Debug)]
pub struct TpcSwitchRequest<'a> {
    /// The transaction branch
    pub xid: &'a Xid,
    /// Switch operation (start or detach)
    pub operation: u32,
    /// Begin/resume or suspend flags
    pub flags: u32,
    /// Transaction timeout in seconds (start only)
    pub timeout: u32,
}

impl TpcSwitchRequest<'_> {
    /// Write the message body
    pub fn write(&self, buf: &mut WriteBuffer, sequence: u8) -> Result<()> {
        write_function_header(buf, FunctionCode::TpcTxnSwitch, sequence)?;
        buf.write_ub4(self.operation)?;
        buf.write_ub4(self.flags)?;
        buf.write_ub4(self.timeout)?;
        write_xid(buf, self.xid)
    }

    /// Start (or resume) association with the branch
    pub fn start(xid: &Xid, flags: u32, timeout: u32) -> TpcSwitchRequest<'_> {
        TpcSwitchRequest {
            xid,
            operation: tpc_function::START,
            flags,
            timeout,
        }
    }

    /// Detach (end/suspend) from the branch
    pub fn detach(xid: &Xid, flags: u32) -> TpcSwitchRequest<'_> {
        TpcSwitchRequest {
            xid,
            operation: tpc_function::DETACH,
            flags,
            timeout: 0,
        }
    }
}

/// State change: prepare, commit, rollback or forget a branch
#[derive(Debug)]
pub struct TpcChangeStateRequest<'a> {
    /// The transaction branch
    pub xid: &'a Xid,
    /// Change-state operation
    pub operation: u32,
    /// Whether this is a one-phase commit (no prior prepare)
    pub one_phase: bool,
}

impl TpcChangeStateRequest<'_> {
    /// Write the message body
    pub fn write(&self, buf: &mut WriteBuffer, sequence: u8) -> Result<()> {
        write_function_header(buf, FunctionCode::TpcTxnChangeState, sequence)?;
        buf.write_ub4(self.operation)?;
        buf.write_ub4(self.one_phase as u32)?;
        write_xid(buf, self.xid)
    }

    /// Prepare the branch; the response's state word says whether a commit
    /// is required
    pub fn prepare(xid: &Xid) -> TpcChangeStateRequest<'_> {
        TpcChangeStateRequest {
            xid,
            operation: tpc_function::PREPARE,
            one_phase: false,
        }
    }

    /// Commit the branch
    pub fn commit(xid: &Xid, one_phase: bool) -> TpcChangeStateRequest<'_> {
        TpcChangeStateRequest {
            xid,
            operation: tpc_function::COMMIT,
            one_phase,
        }
    }

    /// Roll the branch back
    pub fn rollback(xid: &Xid) -> TpcChangeStateRequest<'_> {
        TpcChangeStateRequest {
            xid,
            operation: tpc_function::ABORT,
            one_phase: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{tpc_begin_flags, MessageType};

    #[test]
    fn test_switch_start_layout() {
        let xid = Xid::new(3900, "txn3900", "branch").unwrap();
        let mut buf = WriteBuffer::new();
        TpcSwitchRequest::start(&xid, tpc_begin_flags::NEW, 30)
            .write(&mut buf, 1)
            .unwrap();
        assert_eq!(buf.as_slice()[0], MessageType::Function as u8);
        assert_eq!(buf.as_slice()[1], FunctionCode::TpcTxnSwitch as u8);
        let text = String::from_utf8_lossy(buf.as_slice()).into_owned();
        assert!(text.contains("txn3900branch"));
    }

    #[test]
    fn test_change_state_operations() {
        let xid = Xid::new(1, "g", "b").unwrap();
        for (req, op) in [
            (TpcChangeStateRequest::prepare(&xid), tpc_function::PREPARE),
            (TpcChangeStateRequest::commit(&xid, false), tpc_function::COMMIT),
            (TpcChangeStateRequest::rollback(&xid), tpc_function::ABORT),
        ] {
            assert_eq!(req.operation, op);
            let mut buf = WriteBuffer::new();
            req.write(&mut buf, 2).unwrap();
            assert_eq!(buf.as_slice()[1], FunctionCode::TpcTxnChangeState as u8);
        }
    }

    #[test]
    fn test_one_phase_flag() {
        let xid = Xid::new(1, "g", "b").unwrap();
        assert!(TpcChangeStateRequest::commit(&xid, true).one_phase);
        assert!(!TpcChangeStateRequest::commit(&xid, false).one_phase);
    }
}
