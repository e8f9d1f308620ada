//! Error types for the driver
//!
//! Errors are grouped by the layer that raises them: transport, buffer,
//! authentication, server, pool and local validation. The pool only ever
//! inspects the health predicates; it never swallows the original error.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the driver
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    // =========================================================================
    // Transport / protocol errors — fatal to the session
    // =========================================================================
    /// Invalid packet type received
    #[error("invalid packet type: {0}")]
    InvalidPacketType(u8),

    /// Invalid message type received
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    /// Packet too short to contain valid header
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    /// Packet stream no longer follows the negotiated framing rules
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Server protocol version below the minimum we speak
    #[error("server protocol version {0} not supported (minimum: {1})")]
    ProtocolVersionNotSupported(u16, u16),

    /// Connection closed unexpectedly
    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    /// Connection refused by server
    #[error("connection refused{}: {}",
        error_code.map(|c| format!(" (error {})", c)).unwrap_or_default(),
        message.as_deref().unwrap_or("unknown reason"))]
    ConnectionRefused {
        error_code: Option<u32>,
        message: Option<String>,
    },

    /// Server redirected the connection to a different listener
    #[error("connection redirected to {to_host}:{to_port}")]
    ConnectionRedirected { to_host: String, to_port: u16 },

    /// Connection timeout
    #[error("connection timeout after {0:?}")]
    ConnectionTimeout(std::time::Duration),

    /// A single round trip exceeded the configured call timeout
    #[error("call timeout of {0:?} exceeded")]
    CallTimeout(std::time::Duration),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // =========================================================================
    // Buffer errors
    // =========================================================================
    /// Buffer underflow - not enough data to read
    #[error("buffer underflow: need {needed} bytes but only {available} available")]
    BufferUnderflow { needed: usize, available: usize },

    /// Buffer overflow - not enough space to write
    #[error("buffer overflow: need {needed} bytes but only {available} available")]
    BufferOverflow { needed: usize, available: usize },

    /// Invalid length indicator
    #[error("invalid length indicator: {0}")]
    InvalidLengthIndicator(u8),

    // =========================================================================
    // Authentication errors — fatal to the connect attempt, never retried
    // =========================================================================
    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Unsupported verifier type
    #[error("unsupported verifier type: {0:#x}")]
    UnsupportedVerifierType(u32),

    // =========================================================================
    // Server errors — session remains valid unless classified dead
    // =========================================================================
    /// Oracle database error; `offset` is the parse error position when the
    /// server reports one
    #[error("ORA-{code:05}: {message}")]
    OracleError {
        code: u32,
        message: String,
        offset: u32,
    },

    /// Invalid service name (ORA-12514)
    #[error("invalid service name: {0}")]
    InvalidServiceName(String),

    // =========================================================================
    // Local validation errors — raised before any network I/O
    // =========================================================================
    /// Operation on a closed or never-opened handle
    #[error("not connected")]
    NotConnected,

    /// Invalid parameter combination
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid connection string
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Wire type cannot be decoded into the requested target type
    #[error("unsupported conversion: {0}")]
    UnsupportedConversion(String),

    /// Outbound value does not fit the fixed-size wire field
    #[error("value too large: {0}")]
    ValueTooLarge(String),

    /// Invalid Oracle type number
    #[error("invalid Oracle type: {0}")]
    InvalidOracleType(u8),

    // =========================================================================
    // Pool errors — unavailability, not a broken session
    // =========================================================================
    /// No free entry and the pool is at `max` with getmode NOWAIT
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// No free entry within the TIMEDWAIT timeout
    #[error("connection pool acquire timed out after {0:?}")]
    PoolTimeout(std::time::Duration),

    /// Pool has been closed
    #[error("connection pool is closed")]
    PoolClosed,

    /// Pool still has busy entries and close was not forced
    #[error("connection pool has {0} busy connections")]
    PoolBusy(u32),

    // =========================================================================
    // Feature / internal
    // =========================================================================
    /// Feature not supported
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new Oracle database error
    pub fn oracle(code: u32, message: impl Into<String>) -> Self {
        Error::OracleError {
            code,
            message: message.into(),
            offset: 0,
        }
    }

    /// The server error code, if this is a server-reported error
    pub fn oracle_code(&self) -> Option<u32> {
        match self {
            Error::OracleError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Errors after which the session must not be reused.
    ///
    /// Transport breakage and dead-session server codes both qualify; the
    /// pool drops such sessions instead of returning them to the idle set.
    pub fn is_fatal_to_session(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::ConnectionClosed
            | Error::ConnectionRefused { .. }
            | Error::ProtocolViolation(_)
            | Error::InvalidPacketType(_)
            | Error::InvalidMessageType(_)
            | Error::PacketTooShort { .. } => true,
            _ => self.is_session_dead(),
        }
    }

    /// Server error codes that mean the session was killed or lost
    /// server-side and will never answer another call.
    pub fn is_session_dead(&self) -> bool {
        matches!(
            self,
            Error::OracleError { code, .. } if matches!(
                *code,
                28 | 31 | 600 | 1012 | 2396 | 3113 | 3114 | 3135 | 12572 | 12583
            )
        )
    }

    /// Check if this is a "no data found" error
    pub fn is_no_data_found(&self) -> bool {
        matches!(self, Error::OracleError { code, .. } if *code == crate::constants::error_code::NO_DATA_FOUND)
    }
}
