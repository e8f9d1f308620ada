#![warn(missing_docs)]

//! # oranet
//!
//! A pure Rust driver for Oracle databases speaking the TNS wire protocol
//! directly. No OCI or other native client libraries required.
//!
//! The crate covers the full thin-driver stack: packet framing over TCP or
//! TLS, the typed wire codec (exact NUMBER decimals, dates, intervals,
//! LOB locators), the O5LOGON authentication handshake, the statement
//! execute/fetch cycle with client-side statement caching, out-of-band
//! cancellation, two-phase commit, and a built-in connection pool.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use oranet::{ConnectParams, Connection, Defaults};
//!
//! #[tokio::main]
//! async fn main() -> oranet::Result<()> {
//!     let params = ConnectParams::new("localhost", 1521, "FREEPDB1", "scott", "tiger");
//!     let conn = Connection::connect(params, Defaults::default()).await?;
//!
//!     let result = conn.query("select id, name from users where id < :1", &[
//!         oranet::BindParam::new("", 100i64),
//!     ]).await?;
//!     for row in &result.rows {
//!         println!("{:?}", row.values());
//!     }
//!
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Pooling
//!
//! ```rust,no_run
//! use oranet::{ConnectParams, ConnectionPool, Defaults, PoolParams};
//!
//! # async fn example() -> oranet::Result<()> {
//! let params = ConnectParams::new("localhost", 1521, "FREEPDB1", "scott", "tiger");
//! let pool = ConnectionPool::create(params, PoolParams::default(), Defaults::default()).await?;
//!
//! let conn = pool.acquire().await?;
//! conn.ping().await?;
//! conn.release().await; // or just drop the guard
//! # Ok(())
//! # }
//! ```
//!
//! ## Transactions
//!
//! DML executed without autocommit opens an implicit transaction; `commit`
//! and `rollback` close it. Pooled sessions are always rolled back before
//! they are handed to the next caller. Distributed transactions use the
//! `tpc_*` family with caller-constructed [`Xid`]s.

pub mod buffer;
pub mod capabilities;
pub mod config;
pub mod connection;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod messages;
pub mod packet;
pub mod parser;
pub mod pool;
pub mod row;
pub mod statement;
pub mod statement_cache;
pub mod tpc;
pub mod transport;
pub mod types;

pub use capabilities::Capabilities;
pub use config::{ConnectParams, Defaults, GetMode, PoolParams, Purity, ServiceMethod};
pub use connection::{
    Connection, ConnectionState, Cursor, ExecuteResult, QueryResult, ServerInfo,
};
pub use constants::{BindDirection, OracleType};
pub use error::{Error, Result};
pub use pool::{
    AcquireOptions, BlockingSessionCallback, ConnectionPool, Pool, PoolStats, PoolableSession,
    PooledConnection, SessionCallback, SessionFactory,
};
pub use row::{ColumnInfo, Row, Value};
pub use statement::{BindParam, Statement, StatementType};
pub use statement_cache::StatementCache;
pub use tpc::{TpcState, Xid};
pub use transport::{TcpTransport, TlsConfig, Transport};
pub use types::{ChunkedBytes, DecimalValue, IntervalDS, IntervalYM, LobLocator, RefCursor};
