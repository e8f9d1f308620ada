//! Global transaction identifiers and two-phase-commit state
//!
//! An [`Xid`] names one branch of a distributed transaction; it is built by
//! the caller (usually a transaction manager) and used only as a key into
//! the TPC protocol calls. The driver tracks per-Xid state so a single
//! session can suspend one global transaction and resume another.

use crate::error::{Error, Result};

/// Maximum length of the global transaction id component
pub const MAX_GTRID_LENGTH: usize = 64;
/// Maximum length of the branch qualifier component
pub const MAX_BQUAL_LENGTH: usize = 64;

/// A global transaction branch identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    /// Format identifier chosen by the transaction manager
    pub format_id: u32,
    /// Global transaction id, at most 64 bytes
    global_transaction_id: Vec<u8>,
    /// Branch qualifier, at most 64 bytes
    branch_qualifier: Vec<u8>,
}

impl Xid {
    /// Build an Xid, validating component lengths
    pub fn new(
        format_id: u32,
        global_transaction_id: impl Into<Vec<u8>>,
        branch_qualifier: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let global_transaction_id = global_transaction_id.into();
        let branch_qualifier = branch_qualifier.into();
        if global_transaction_id.is_empty() || global_transaction_id.len() > MAX_GTRID_LENGTH {
            return Err(Error::InvalidParameter(format!(
                "global transaction id must be 1..={} bytes",
                MAX_GTRID_LENGTH
            )));
        }
        if branch_qualifier.len() > MAX_BQUAL_LENGTH {
            return Err(Error::InvalidParameter(format!(
                "branch qualifier must be at most {} bytes",
                MAX_BQUAL_LENGTH
            )));
        }
        Ok(Self {
            format_id,
            global_transaction_id,
            branch_qualifier,
        })
    }

    /// The global transaction id component
    pub fn global_transaction_id(&self) -> &[u8] {
        &self.global_transaction_id
    }

    /// The branch qualifier component
    pub fn branch_qualifier(&self) -> &[u8] {
        &self.branch_qualifier
    }
}

/// Per-Xid progress of a two-phase commit on one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpcState {
    /// `tpc_begin` has associated the session with the transaction
    Begun,
    /// `tpc_end` has detached the session; the transaction may be resumed
    Ended,
    /// `tpc_prepare` succeeded; only commit or rollback remain
    Prepared,
    /// Terminal: committed
    Committed,
    /// Terminal: rolled back
    RolledBack,
}

impl TpcState {
    /// Whether `tpc_prepare` is legal from this state
    pub fn can_prepare(&self) -> bool {
        matches!(self, TpcState::Begun | TpcState::Ended)
    }

    /// Whether a one-phase `tpc_commit` (no prepare) is legal
    pub fn can_commit_one_phase(&self) -> bool {
        matches!(self, TpcState::Begun | TpcState::Ended)
    }

    /// Whether a two-phase commit or rollback is legal
    pub fn is_prepared(&self) -> bool {
        matches!(self, TpcState::Prepared)
    }

    /// Whether the transaction has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, TpcState::Committed | TpcState::RolledBack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xid_construction() {
        let xid = Xid::new(3900, "txn3900", "branchId").unwrap();
        assert_eq!(xid.format_id, 3900);
        assert_eq!(xid.global_transaction_id(), b"txn3900");
        assert_eq!(xid.branch_qualifier(), b"branchId");
    }

    #[test]
    fn test_xid_length_validation() {
        assert!(Xid::new(1, "", "b").is_err());
        assert!(Xid::new(1, vec![0u8; 65], "b").is_err());
        assert!(Xid::new(1, "g", vec![0u8; 65]).is_err());
        assert!(Xid::new(1, vec![0u8; 64], vec![0u8; 64]).is_ok());
        assert!(Xid::new(1, "g", "").is_ok());
    }

    #[test]
    fn test_xid_equality_as_key() {
        let a = Xid::new(1, "g", "b1").unwrap();
        let b = Xid::new(1, "g", "b2").unwrap();
        let a2 = Xid::new(1, "g", "b1").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a2);
    }

    #[test]
    fn test_state_transitions() {
        assert!(TpcState::Begun.can_prepare());
        assert!(TpcState::Ended.can_prepare());
        assert!(!TpcState::Prepared.can_prepare());
        assert!(TpcState::Begun.can_commit_one_phase());
        assert!(!TpcState::Prepared.can_commit_one_phase());
        assert!(TpcState::Prepared.is_prepared());
        assert!(TpcState::Committed.is_terminal());
        assert!(TpcState::RolledBack.is_terminal());
    }
}
