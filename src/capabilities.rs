//! Negotiated session capabilities
//!
//! Two capability vectors are exchanged during logon: compile-time
//! capabilities (what the client build understands) and runtime capabilities
//! (what this session will actually use). The server may lower either; the
//! merged result governs wire encodings for the rest of the session.

use crate::constants::{charset, version};

/// Compile-time capability vector length
const CCAP_LEN: usize = 45;
/// Runtime capability vector length
const RCAP_LEN: usize = 11;

/// Indices into the compile-time capability vector
#[allow(missing_docs)]
mod ccap_index {
    pub const SQL_VERSION: usize = 0;
    pub const LOGON_TYPES: usize = 4;
    pub const FIELD_VERSION: usize = 7;
    pub const SERVER_DEFINE_CONV: usize = 8;
    pub const TTC1: usize = 15;
    pub const OCI1: usize = 16;
    pub const TDS_VERSION: usize = 17;
    pub const RPC_VERSION: usize = 18;
    pub const RPC_SIG: usize = 19;
    pub const DBF_VERSION: usize = 21;
    pub const LOB: usize = 23;
    pub const UB2_DTY: usize = 27;
    pub const TTC3: usize = 37;
    pub const TTC4: usize = 40;
    pub const TTC5: usize = 44;
}

/// Compile-time capability values
#[allow(missing_docs)]
mod ccap_value {
    pub const SQL_VERSION_MAX: u8 = 6;
    pub const FIELD_VERSION_MAX: u8 = 24;
    pub const O5LOGON: u8 = 8;
    pub const O5LOGON_NP: u8 = 2;
    pub const O7LOGON: u8 = 32;
    pub const O8LOGON_LONG_IDENTIFIER: u8 = 64;
    pub const O9LOGON_LONG_PASSWORD: u8 = 0x80;
    pub const END_OF_CALL_STATUS: u8 = 0x01;
    pub const FAST_BVEC: u8 = 0x20;
    pub const TDS_VERSION_MAX: u8 = 3;
    pub const RPC_VERSION_MAX: u8 = 7;
    pub const RPC_SIG_VALUE: u8 = 3;
    pub const DBF_VERSION_MAX: u8 = 1;
    pub const LOB_UB8_SIZE: u8 = 0x01;
    pub const LOB_ENCS: u8 = 0x02;
    pub const IMPLICIT_RESULTS: u8 = 0x10;
    pub const END_OF_REQUEST: u8 = 0x20;
}

/// Indices into the runtime capability vector
#[allow(missing_docs)]
mod rcap_index {
    pub const COMPAT: usize = 0;
    pub const TTC: usize = 6;
}

/// Runtime capability values
#[allow(missing_docs)]
mod rcap_value {
    pub const COMPAT_81: u8 = 2;
    pub const TTC_ZERO_COPY: u8 = 0x01;
    pub const TTC_32K: u8 = 0x04;
}

/// Session capabilities, filled in during negotiation
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Negotiated protocol version
    pub protocol_version: u16,
    /// Database charset id
    pub charset_id: u16,
    /// National charset id
    pub ncharset_id: u16,
    /// Compile-time capability vector sent to the server
    pub compile_caps: [u8; CCAP_LEN],
    /// Runtime capability vector sent to the server
    pub runtime_caps: [u8; RCAP_LEN],
    /// Server supports 32K VARCHAR binds
    pub supports_32k_binds: bool,
    /// Server emits explicit end-of-response markers
    pub supports_end_of_response: bool,
}

impl Capabilities {
    /// Build the capability vectors we announce
    pub fn new() -> Self {
        let mut compile_caps = [0u8; CCAP_LEN];
        compile_caps[ccap_index::SQL_VERSION] = ccap_value::SQL_VERSION_MAX;
        compile_caps[ccap_index::LOGON_TYPES] = ccap_value::O5LOGON
            | ccap_value::O5LOGON_NP
            | ccap_value::O7LOGON
            | ccap_value::O8LOGON_LONG_IDENTIFIER
            | ccap_value::O9LOGON_LONG_PASSWORD;
        compile_caps[ccap_index::FIELD_VERSION] = ccap_value::FIELD_VERSION_MAX;
        compile_caps[ccap_index::SERVER_DEFINE_CONV] = 1;
        compile_caps[ccap_index::TTC1] = ccap_value::FAST_BVEC | ccap_value::END_OF_CALL_STATUS;
        compile_caps[ccap_index::OCI1] = 0;
        compile_caps[ccap_index::TDS_VERSION] = ccap_value::TDS_VERSION_MAX;
        compile_caps[ccap_index::RPC_VERSION] = ccap_value::RPC_VERSION_MAX;
        compile_caps[ccap_index::RPC_SIG] = ccap_value::RPC_SIG_VALUE;
        compile_caps[ccap_index::DBF_VERSION] = ccap_value::DBF_VERSION_MAX;
        compile_caps[ccap_index::LOB] = ccap_value::LOB_UB8_SIZE | ccap_value::LOB_ENCS;
        compile_caps[ccap_index::UB2_DTY] = 1;
        compile_caps[ccap_index::TTC3] = ccap_value::IMPLICIT_RESULTS;
        compile_caps[ccap_index::TTC4] = ccap_value::END_OF_REQUEST;
        compile_caps[ccap_index::TTC5] = 0;

        let mut runtime_caps = [0u8; RCAP_LEN];
        runtime_caps[rcap_index::COMPAT] = rcap_value::COMPAT_81;
        runtime_caps[rcap_index::TTC] = rcap_value::TTC_ZERO_COPY | rcap_value::TTC_32K;

        Self {
            protocol_version: version::DESIRED,
            charset_id: charset::UTF8,
            ncharset_id: charset::UTF16,
            compile_caps,
            runtime_caps,
            supports_32k_binds: true,
            supports_end_of_response: false,
        }
    }

    /// Fold in the version accepted by the server
    pub fn adjust_for_protocol_version(&mut self, server_version: u16) {
        self.protocol_version = server_version;
        self.supports_end_of_response = server_version >= version::MIN_END_OF_RESPONSE;
        if !self.supports_end_of_response {
            self.compile_caps[ccap_index::TTC4] = 0;
        }
    }

    /// Whether packets carry the 4-byte length field
    pub fn uses_large_sdu(&self) -> bool {
        self.protocol_version >= version::MIN_LARGE_SDU
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_caps() {
        let caps = Capabilities::new();
        assert_eq!(caps.protocol_version, version::DESIRED);
        assert_eq!(caps.charset_id, charset::UTF8);
        assert!(!caps.supports_end_of_response);
    }

    #[test]
    fn test_adjust_for_modern_server() {
        let mut caps = Capabilities::new();
        caps.adjust_for_protocol_version(319);
        assert!(caps.supports_end_of_response);
        assert!(caps.uses_large_sdu());
    }

    #[test]
    fn test_adjust_for_old_server() {
        let mut caps = Capabilities::new();
        caps.adjust_for_protocol_version(314);
        assert!(!caps.supports_end_of_response);
        assert!(!caps.uses_large_sdu());
    }
}
