//! Wire protocol constants
//!
//! Packet types, message types, function codes and the capability tables used
//! during session negotiation. Values follow the network protocol as observed
//! by thin-mode Oracle drivers.

// =============================================================================
// Packet Types
// =============================================================================

/// Packet types (found in packet header byte 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Initial connection request from client
    Connect = 1,
    /// Server accepts connection
    Accept = 2,
    /// Server acknowledges (rarely used)
    Ack = 3,
    /// Server refuses connection
    Refuse = 4,
    /// Server redirects to different address
    Redirect = 5,
    /// Data packet (contains protocol messages)
    Data = 6,
    /// Null packet
    Null = 7,
    /// Abort connection
    Abort = 9,
    /// Request packet resend
    Resend = 11,
    /// Marker packet (break/reset/interrupt)
    Marker = 12,
    /// Attention packet
    Attention = 13,
    /// Control packet (inband notifications)
    Control = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Accept),
            3 => Ok(PacketType::Ack),
            4 => Ok(PacketType::Refuse),
            5 => Ok(PacketType::Redirect),
            6 => Ok(PacketType::Data),
            7 => Ok(PacketType::Null),
            9 => Ok(PacketType::Abort),
            11 => Ok(PacketType::Resend),
            12 => Ok(PacketType::Marker),
            13 => Ok(PacketType::Attention),
            14 => Ok(PacketType::Control),
            _ => Err(crate::error::Error::InvalidPacketType(value)),
        }
    }
}

/// TNS packet header size in bytes
pub const PACKET_HEADER_SIZE: usize = 8;

/// Packet flags (found in packet header byte 6)
#[allow(missing_docs)]
pub mod packet_flags {
    pub const REDIRECT: u8 = 0x04;
    pub const TLS_RENEG: u8 = 0x08;
}

/// Data flags (first 2 bytes of DATA packet payload)
#[allow(missing_docs)]
pub mod data_flags {
    pub const END_OF_REQUEST: u16 = 0x0800;
    pub const END_OF_RESPONSE: u16 = 0x2000;
    pub const EOF: u16 = 0x0040;
}

// =============================================================================
// Marker Types
// =============================================================================

/// Marker types for MARKER packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MarkerType {
    /// Break marker - interrupts current operation
    Break = 1,
    /// Reset marker - resynchronizes the packet stream after a break
    Reset = 2,
    /// Interrupt marker
    Interrupt = 3,
}

// =============================================================================
// Message Types (within DATA packets)
// =============================================================================

/// Message types found in DATA packet payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Protocol negotiation
    Protocol = 1,
    /// Data type negotiation
    DataTypes = 2,
    /// Execute function (TTC function call)
    Function = 3,
    /// Error / call status response
    Error = 4,
    /// Row header
    RowHeader = 6,
    /// Row data
    RowData = 7,
    /// OPI parameter response
    Parameter = 8,
    /// Call status
    Status = 9,
    /// I/O vector (bind direction echo)
    IoVector = 11,
    /// LOB data
    LobData = 14,
    /// Warning message
    Warning = 15,
    /// Column describe information
    DescribeInfo = 16,
    /// Piggyback function
    Piggyback = 17,
    /// Flush out binds
    FlushOutBinds = 19,
    /// Bit vector (columns carried in a compressed fetch)
    BitVector = 21,
    /// Server-side piggyback
    ServerSidePiggyback = 23,
    /// End of response marker
    EndOfResponse = 29,
}

impl TryFrom<u8> for MessageType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            1 => Ok(MessageType::Protocol),
            2 => Ok(MessageType::DataTypes),
            3 => Ok(MessageType::Function),
            4 => Ok(MessageType::Error),
            6 => Ok(MessageType::RowHeader),
            7 => Ok(MessageType::RowData),
            8 => Ok(MessageType::Parameter),
            9 => Ok(MessageType::Status),
            11 => Ok(MessageType::IoVector),
            14 => Ok(MessageType::LobData),
            15 => Ok(MessageType::Warning),
            16 => Ok(MessageType::DescribeInfo),
            17 => Ok(MessageType::Piggyback),
            19 => Ok(MessageType::FlushOutBinds),
            21 => Ok(MessageType::BitVector),
            23 => Ok(MessageType::ServerSidePiggyback),
            29 => Ok(MessageType::EndOfResponse),
            _ => Err(crate::error::Error::InvalidMessageType(value)),
        }
    }
}

// =============================================================================
// TTC Function Codes
// =============================================================================

/// TTC (Two-Task Common) function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    /// Reexecute previous statement
    Reexecute = 4,
    /// Fetch rows
    Fetch = 5,
    /// Logoff from database
    Logoff = 9,
    /// Commit transaction
    Commit = 14,
    /// Rollback transaction
    Rollback = 15,
    /// Reexecute and fetch
    ReexecuteAndFetch = 78,
    /// Execute statement
    Execute = 94,
    /// LOB operation
    LobOp = 96,
    /// TPC transaction switch (begin / end / detach)
    TpcTxnSwitch = 103,
    /// TPC transaction change state (prepare / commit / rollback / forget)
    TpcTxnChangeState = 104,
    /// Close cursors
    CloseCursors = 105,
    /// Authentication phase one
    AuthPhaseOne = 118,
    /// Authentication phase two
    AuthPhaseTwo = 115,
    /// Ping
    Ping = 147,
}

// =============================================================================
// Protocol Versions
// =============================================================================

/// Protocol version constants
pub mod version {
    /// Desired protocol version to request
    pub const DESIRED: u16 = 319;
    /// Minimum protocol version we support
    pub const MINIMUM: u16 = 300;
    /// Minimum version supporting large SDU (4-byte packet length)
    pub const MIN_LARGE_SDU: u16 = 315;
    /// Minimum version supporting end-of-response markers
    pub const MIN_END_OF_RESPONSE: u16 = 319;
}

// =============================================================================
// Connection Constants
// =============================================================================

/// Connection-related constants
pub mod connection {
    /// Default SDU (Session Data Unit) size
    pub const DEFAULT_SDU: u32 = 8192;
    /// Default TDU (Transport Data Unit) size
    pub const DEFAULT_TDU: u16 = 65535;
    /// Protocol characteristics flags
    pub const PROTOCOL_CHARACTERISTICS: u16 = 0x4f98;
    /// Maximum connect data that fits in the first packet
    pub const MAX_CONNECT_DATA: u16 = 230;
    /// Slack allowed above the negotiated SDU before a declared packet
    /// length is treated as a protocol violation
    pub const MAX_PACKET_SLACK: usize = 65536;
}

/// Service options flags sent in the connect packet
#[allow(missing_docs)]
pub mod service_options {
    pub const DONT_CARE: u16 = 0x0001;
    pub const CAN_RECV_ATTENTION: u16 = 0x0400;
}

// =============================================================================
// Authentication
// =============================================================================

/// Authentication mode flags
#[allow(missing_docs)]
pub mod auth_mode {
    pub const LOGON: u32 = 0x00000001;
    pub const CHANGE_PASSWORD: u32 = 0x00000002;
    pub const SYSDBA: u32 = 0x00000020;
    pub const SYSOPER: u32 = 0x00000040;
    pub const WITH_PASSWORD: u32 = 0x00000100;
}

/// Authentication verifier type constants
#[allow(missing_docs)]
pub mod verifier_type {
    pub const V11G_1: u32 = 0xb152;
    pub const V11G_2: u32 = 0x1b25;
    pub const V12C: u32 = 0x4815;
}

// =============================================================================
// Character Sets
// =============================================================================

/// Character set ID constants
#[allow(missing_docs)]
pub mod charset {
    pub const UTF8: u16 = 873;
    pub const UTF16: u16 = 2000;
}

/// Character set form (CSFRM) constants
pub mod csfrm {
    /// Implicit charset (database charset)
    pub const IMPLICIT: u8 = 1;
    /// NCHAR charset
    pub const NCHAR: u8 = 2;
}

// =============================================================================
// TNS Length Indicators
// =============================================================================

/// TNS length indicator constants
pub mod length {
    /// Maximum length that fits in a single inline byte
    pub const MAX_SHORT: u8 = 252;
    /// Escape character for special values
    pub const ESCAPE_CHAR: u8 = 253;
    /// Indicates a long (chunked) representation follows
    pub const LONG_INDICATOR: u8 = 254;
    /// Indicates NULL value
    pub const NULL_INDICATOR: u8 = 255;
}

/// Column values longer than this are sent in the chunked "long" form
pub const INLINE_LENGTH_LIMIT: usize = 252;

// =============================================================================
// Execute Options
// =============================================================================

/// Execute option flags
#[allow(missing_docs)]
pub mod exec_option {
    pub const PARSE: u32 = 0x01;
    pub const BIND: u32 = 0x08;
    pub const DEFINE: u32 = 0x10;
    pub const EXECUTE: u32 = 0x20;
    pub const FETCH: u32 = 0x40;
    pub const COMMIT: u32 = 0x100;
    pub const PLSQL_BIND: u32 = 0x400;
    pub const NOT_PLSQL: u32 = 0x8000;
    pub const DESCRIBE: u32 = 0x20000;
}

// =============================================================================
// TPC (two-phase commit) operations
// =============================================================================

/// TPC transaction switch / change-state operation codes
#[allow(missing_docs)]
pub mod tpc_function {
    pub const START: u32 = 0x01;
    pub const DETACH: u32 = 0x02;
    pub const COMMIT: u32 = 0x01;
    pub const ABORT: u32 = 0x02;
    pub const PREPARE: u32 = 0x03;
    pub const FORGET: u32 = 0x04;
}

/// TPC transaction state values reported by the server
#[allow(missing_docs)]
pub mod tpc_state {
    pub const REQUIRES_COMMIT: u32 = 1;
    pub const COMMITTED: u32 = 2;
    pub const ABORTED: u32 = 3;
    pub const READ_ONLY: u32 = 4;
    pub const FORGOTTEN: u32 = 5;
}

/// Flags for beginning / resuming a global transaction
#[allow(missing_docs)]
pub mod tpc_begin_flags {
    pub const NEW: u32 = 0x00000001;
    pub const RESUME: u32 = 0x00000004;
    pub const PROMOTE: u32 = 0x00000008;
}

/// Flags for ending participation in a global transaction
#[allow(missing_docs)]
pub mod tpc_end_flags {
    pub const NORMAL: u32 = 0x00000000;
    pub const SUSPEND: u32 = 0x00100000;
}

// =============================================================================
// Bind Directions
// =============================================================================

/// Bind parameter direction (IN, OUT, IN OUT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BindDirection {
    /// Output only parameter (server writes, client reads)
    Output = 16,
    /// Input only parameter (client writes, server reads) - default
    #[default]
    Input = 32,
    /// Input/Output parameter (bidirectional)
    InputOutput = 48,
}

impl BindDirection {
    /// Check if this direction includes input (IN or IN OUT)
    pub fn is_input(&self) -> bool {
        matches!(self, BindDirection::Input | BindDirection::InputOutput)
    }

    /// Check if this direction includes output (OUT or IN OUT)
    pub fn is_output(&self) -> bool {
        matches!(self, BindDirection::Output | BindDirection::InputOutput)
    }
}

// =============================================================================
// Oracle Data Types
// =============================================================================

/// Oracle internal data type numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OracleType {
    /// VARCHAR2 string type
    Varchar = 1,
    /// NUMBER type
    Number = 2,
    /// BINARY_INTEGER (PL/SQL)
    BinaryInteger = 3,
    /// LONG string type
    Long = 8,
    /// ROWID
    Rowid = 11,
    /// DATE type
    Date = 12,
    /// RAW binary type
    Raw = 23,
    /// LONG RAW binary type
    LongRaw = 24,
    /// CHAR fixed-length string
    Char = 96,
    /// BINARY_FLOAT
    BinaryFloat = 100,
    /// BINARY_DOUBLE
    BinaryDouble = 101,
    /// REF CURSOR
    Cursor = 102,
    /// CLOB
    Clob = 112,
    /// BLOB
    Blob = 113,
    /// TIMESTAMP
    Timestamp = 180,
    /// TIMESTAMP WITH TIME ZONE
    TimestampTz = 181,
    /// INTERVAL YEAR TO MONTH
    IntervalYm = 182,
    /// INTERVAL DAY TO SECOND
    IntervalDs = 183,
    /// TIMESTAMP WITH LOCAL TIME ZONE
    TimestampLtz = 231,
    /// BOOLEAN
    Boolean = 252,
}

impl OracleType {
    /// Check if this type is a LOB type transmitted by locator
    pub fn is_lob(&self) -> bool {
        matches!(self, OracleType::Clob | OracleType::Blob)
    }

    /// Types whose runtime length can exceed the inline threshold and
    /// therefore may be promoted to the chunked long form
    pub fn can_promote_to_long(&self) -> bool {
        matches!(
            self,
            OracleType::Varchar | OracleType::Char | OracleType::Raw
        )
    }
}

impl TryFrom<u8> for OracleType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OracleType::Varchar),
            2 => Ok(OracleType::Number),
            3 => Ok(OracleType::BinaryInteger),
            8 => Ok(OracleType::Long),
            11 => Ok(OracleType::Rowid),
            12 => Ok(OracleType::Date),
            23 => Ok(OracleType::Raw),
            24 => Ok(OracleType::LongRaw),
            96 => Ok(OracleType::Char),
            100 => Ok(OracleType::BinaryFloat),
            101 => Ok(OracleType::BinaryDouble),
            102 => Ok(OracleType::Cursor),
            112 => Ok(OracleType::Clob),
            113 => Ok(OracleType::Blob),
            180 => Ok(OracleType::Timestamp),
            181 => Ok(OracleType::TimestampTz),
            182 => Ok(OracleType::IntervalYm),
            183 => Ok(OracleType::IntervalDs),
            231 => Ok(OracleType::TimestampLtz),
            252 => Ok(OracleType::Boolean),
            _ => Err(crate::error::Error::InvalidOracleType(value)),
        }
    }
}

// =============================================================================
// Error Codes
// =============================================================================

/// Oracle error code constants
#[allow(missing_docs)]
pub mod error_code {
    pub const SESSION_KILLED: u32 = 28;
    pub const SESSION_MARKED_FOR_KILL: u32 = 31;
    pub const USER_REQUESTED_CANCEL: u32 = 1013;
    pub const INVALID_PASSWORD: u32 = 1017;
    pub const NOT_LOGGED_ON: u32 = 1012;
    pub const NO_DATA_FOUND: u32 = 1403;
    pub const EXCEEDED_IDLE_TIME: u32 = 2396;
    pub const EOF_ON_CHANNEL: u32 = 3113;
    pub const NOT_CONNECTED: u32 = 3114;
    pub const CONNECTION_LOST: u32 = 3135;
    pub const ACCOUNT_LOCKED: u32 = 28000;
    pub const PASSWORD_EXPIRED: u32 = 28001;
    pub const INVALID_SERVICE_NAME: u32 = 12514;
    pub const SESSION_SHUTDOWN: u32 = 12572;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_conversion() {
        assert_eq!(PacketType::try_from(1).unwrap(), PacketType::Connect);
        assert_eq!(PacketType::try_from(2).unwrap(), PacketType::Accept);
        assert_eq!(PacketType::try_from(6).unwrap(), PacketType::Data);
        assert_eq!(PacketType::try_from(12).unwrap(), PacketType::Marker);
        assert!(PacketType::try_from(255).is_err());
    }

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::try_from(1).unwrap(), MessageType::Protocol);
        assert_eq!(MessageType::try_from(3).unwrap(), MessageType::Function);
        assert_eq!(MessageType::try_from(29).unwrap(), MessageType::EndOfResponse);
        assert!(MessageType::try_from(255).is_err());
    }

    #[test]
    fn test_oracle_type_conversion() {
        assert_eq!(OracleType::try_from(2).unwrap(), OracleType::Number);
        assert_eq!(OracleType::try_from(252).unwrap(), OracleType::Boolean);
        assert!(OracleType::try_from(253).is_err());
    }

    #[test]
    fn test_bind_direction() {
        assert!(BindDirection::Input.is_input());
        assert!(!BindDirection::Input.is_output());
        assert!(BindDirection::InputOutput.is_input());
        assert!(BindDirection::InputOutput.is_output());
        assert!(BindDirection::Output.is_output());
    }

    #[test]
    fn test_promotable_types() {
        assert!(OracleType::Varchar.can_promote_to_long());
        assert!(OracleType::Raw.can_promote_to_long());
        assert!(!OracleType::Number.can_promote_to_long());
        assert!(!OracleType::Date.can_promote_to_long());
    }
}
