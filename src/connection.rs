//! Connection state machine
//!
//! A [`Connection`] owns exactly one authenticated session and its socket.
//! Every API operation drives one request/response cycle through the message
//! layer; the session mutex enforces the protocol's one-call-in-flight rule.
//! [`Connection::cancel`] is the single exception: it writes a break marker
//! through the transport's write half while a call is parked on the read
//! half, and the interrupted call resynchronizes the packet stream before
//! surfacing the cancellation to its caller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::buffer::WriteBuffer;
use crate::capabilities::Capabilities;
use crate::config::{ConnectParams, Defaults};
use crate::constants::{
    data_flags, error_code, tpc_begin_flags, tpc_state, FunctionCode, MarkerType, OracleType,
    PacketType,
};
use crate::error::{Error, Result};
use crate::messages::{
    classify_auth_error, AcceptMessage, AuthRequest, ConnectMessage, DataTypesRequest,
    ExecuteOptions, ExecuteRequest, FetchRequest, FunctionRequest, PiggybackCloseCursors,
    ProtocolRequest, ProtocolResponse, RedirectMessage, RefuseMessage, ResponseParser,
    ServerResponse, TpcChangeStateRequest, TpcSwitchRequest,
};
use crate::packet::{split_into_data_packets, Packet};
use crate::row::{ColumnInfo, Row, Value};
use crate::statement::{BindParam, Statement};
use crate::statement_cache::StatementCache;
use crate::tpc::{TpcState, Xid};
use crate::transport::{TcpTransport, Transport};

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket yet
    Disconnected,
    /// TCP/TLS establishment and negotiation in progress
    Connecting,
    /// Logon handshake in progress
    Authenticating,
    /// Session established, no call in flight, no open transaction
    Ready,
    /// A call is in flight
    Executing,
    /// DML has executed without autocommit; commit or rollback pends
    InTransaction,
    /// Logoff in progress
    Closing,
    /// Session is gone
    Closed,
}

/// Server-side identity of the session
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server banner from protocol negotiation
    pub banner: String,
    /// Negotiated protocol version
    pub protocol_version: u16,
    /// Session id (v$session.sid)
    pub session_id: Option<u32>,
    /// Session serial number
    pub serial_number: Option<u16>,
}

/// An open query cursor with its buffered rows
#[derive(Debug)]
pub struct Cursor {
    cursor_id: u16,
    /// Column metadata for this cursor
    pub columns: Vec<ColumnInfo>,
    buffered: VecDeque<Row>,
    exhausted: bool,
}

impl Cursor {
    /// Server cursor id
    pub fn cursor_id(&self) -> u16 {
        self.cursor_id
    }

    /// Whether every row has been fetched
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.buffered.is_empty()
    }
}

/// Result of one execute call
#[derive(Debug)]
pub struct ExecuteResult {
    /// Rows affected (DML) or buffered so far (queries)
    pub rows_affected: u64,
    /// Cursor for queries
    pub cursor: Option<Cursor>,
    /// OUT bind values in bind order
    pub out_binds: Vec<Value>,
}

/// Result of a query executed to completion
#[derive(Debug)]
pub struct QueryResult {
    /// Column metadata
    pub columns: Vec<ColumnInfo>,
    /// All fetched rows
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Index of a column by name (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

struct SessionState {
    state: ConnectionState,
    caps: Capabilities,
    server: ServerInfo,
    sequence: u8,
    autocommit: bool,
    stmt_cache: StatementCache,
    tag: Option<String>,
    current_xid: Option<Xid>,
    tpc: Vec<(Xid, TpcState)>,
}

impl SessionState {
    fn next_sequence(&mut self) -> u8 {
        self.sequence = self.sequence.wrapping_add(1);
        if self.sequence == 0 {
            self.sequence = 1;
        }
        self.sequence
    }

    fn tpc_state(&self, xid: &Xid) -> Option<TpcState> {
        self.tpc.iter().find(|(x, _)| x == xid).map(|(_, s)| *s)
    }

    fn set_tpc_state(&mut self, xid: &Xid, state: TpcState) {
        match self.tpc.iter_mut().find(|(x, _)| x == xid) {
            Some(entry) => entry.1 = state,
            None => self.tpc.push((xid.clone(), state)),
        }
    }

    fn remove_tpc(&mut self, xid: &Xid) {
        self.tpc.retain(|(x, _)| x != xid);
    }
}

struct ConnectionInner {
    transport: Arc<dyn Transport>,
    session: Mutex<SessionState>,
    healthy: AtomicBool,
    break_pending: AtomicBool,
    params: ConnectParams,
    defaults: Defaults,
}

/// One session against the database
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Connect and authenticate, following redirects
    pub async fn connect(params: ConnectParams, defaults: Defaults) -> Result<Self> {
        let mut host = params.host.clone();
        let mut port = params.port;

        // a redirect names a different listener; bound the chase
        for _ in 0..3 {
            let transport = Arc::new(
                TcpTransport::connect(&host, port, params.tls.as_ref(), params.connect_timeout)
                    .await?,
            );
            match Self::establish(transport, params.clone(), defaults.clone()).await {
                Ok(conn) => return Ok(conn),
                Err(Error::ConnectionRedirected { to_host, to_port }) => {
                    tracing::debug!(host = %to_host, port = to_port, "following redirect");
                    host = to_host;
                    port = to_port;
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::ProtocolViolation("too many redirects".into()))
    }

    /// Establish a session over a connected transport.
    ///
    /// Public so alternative transports (and tests) can drive the handshake
    /// without the TCP dialing in [`Connection::connect`].
    pub async fn establish(
        transport: Arc<dyn Transport>,
        params: ConnectParams,
        defaults: Defaults,
    ) -> Result<Self> {
        let conn = Self {
            inner: Arc::new(ConnectionInner {
                transport,
                session: Mutex::new(SessionState {
                    state: ConnectionState::Disconnected,
                    caps: Capabilities::new(),
                    server: ServerInfo::default(),
                    sequence: 0,
                    autocommit: params.autocommit,
                    stmt_cache: StatementCache::new(defaults.stmtcachesize),
                    tag: None,
                    current_xid: None,
                    tpc: Vec::new(),
                }),
                healthy: AtomicBool::new(true),
                break_pending: AtomicBool::new(false),
                params,
                defaults,
            }),
        };
        conn.handshake().await?;
        Ok(conn)
    }

    async fn handshake(&self) -> Result<()> {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        session.state = ConnectionState::Connecting;

        // connect / accept exchange; a resend packet asks us to repeat the
        // connect packet verbatim
        let (connect_packet, continuation) =
            ConnectMessage::from_params(&inner.params).build()?;
        let accept = {
            let mut resends = 0;
            loop {
                inner.transport.send_packet(connect_packet.clone()).await?;
                if let Some(continuation) = &continuation {
                    inner.transport.send_packet(continuation.clone()).await?;
                }
                let packet = inner.transport.receive_packet().await?;
                match packet.packet_type() {
                    PacketType::Accept => break AcceptMessage::parse(&packet)?,
                    PacketType::Resend if resends < 3 => {
                        resends += 1;
                        continue;
                    }
                    PacketType::Refuse => {
                        let refuse = RefuseMessage::parse(&packet)?;
                        session.state = ConnectionState::Closed;
                        return Err(refuse.into_error(&inner.params));
                    }
                    PacketType::Redirect => {
                        let redirect = RedirectMessage::parse(&packet)?;
                        session.state = ConnectionState::Closed;
                        return Err(Error::ConnectionRedirected {
                            to_host: redirect.host,
                            to_port: redirect.port,
                        });
                    }
                    other => {
                        return Err(Error::ProtocolViolation(format!(
                            "unexpected {:?} packet during negotiation",
                            other
                        )))
                    }
                }
            }
        };

        session.caps.adjust_for_protocol_version(accept.protocol_version);
        session.server.protocol_version = accept.protocol_version;
        inner.transport.set_sdu(accept.sdu);
        inner
            .transport
            .set_large_sdu(session.caps.uses_large_sdu());
        tracing::debug!(
            version = accept.protocol_version,
            sdu = accept.sdu,
            "connection accepted"
        );

        // protocol + data type negotiation
        let mut body = WriteBuffer::new();
        ProtocolRequest::write(&mut body)?;
        self.send_body(&session, body.as_slice()).await?;
        let response = self.read_response_raw().await?;
        let mut rbuf = crate::buffer::ReadBuffer::from_slice(&response);
        let first = rbuf.read_u8()?;
        if first != crate::constants::MessageType::Protocol as u8 {
            return Err(Error::ProtocolViolation(format!(
                "expected protocol negotiation response, got message {}",
                first
            )));
        }
        let protocol = ProtocolResponse::parse(&mut rbuf)?;
        session.server.banner = protocol.server_banner.clone();

        let mut body = WriteBuffer::new();
        DataTypesRequest::write(&mut body, &session.caps)?;
        self.send_body(&session, body.as_slice()).await?;
        let _ = self.read_response_raw().await?;

        // authentication
        session.state = ConnectionState::Authenticating;
        let mut auth = AuthRequest::new(&inner.params);

        let seq = session.next_sequence();
        let mut body = WriteBuffer::new();
        auth.write_challenge_request(&mut body, seq)?;
        self.send_body(&session, body.as_slice()).await?;
        let challenge = self.parse_call_response(&mut session, &[], None).await?;
        if let Some(info) = &challenge.error {
            if info.is_error() {
                session.state = ConnectionState::Closed;
                return Err(classify_auth_error(info.code, info.message.clone()));
            }
        }
        auth.process_challenge(&challenge.parameters)?;

        let seq = session.next_sequence();
        let mut body = WriteBuffer::new();
        auth.write_verifier(&mut body, seq)?;
        self.send_body(&session, body.as_slice()).await?;
        let verdict = self.parse_call_response(&mut session, &[], None).await?;
        if let Some(info) = &verdict.error {
            if info.is_error() {
                session.state = ConnectionState::Closed;
                return Err(classify_auth_error(info.code, info.message.clone()));
            }
        }
        auth.process_logon_response(&verdict.parameters)?;

        let data = auth.session_data();
        session.server.session_id = data.session_id;
        session.server.serial_number = data.serial_number;
        session.state = ConnectionState::Ready;
        tracing::debug!(
            session_id = ?data.session_id,
            serial = ?data.serial_number,
            "session authenticated"
        );
        Ok(())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The connection parameters this session was built from
    pub fn params(&self) -> &ConnectParams {
        &self.inner.params
    }

    /// Current state
    pub async fn state(&self) -> ConnectionState {
        self.inner.session.lock().await.state
    }

    /// Server identity of this session
    pub async fn server_info(&self) -> ServerInfo {
        self.inner.session.lock().await.server.clone()
    }

    /// Whether the session is believed usable without a round trip
    pub fn is_healthy(&self) -> bool {
        self.inner.healthy.load(Ordering::Acquire)
    }

    /// Completed network round trips on this connection
    pub fn round_trips(&self) -> u64 {
        self.inner.transport.round_trips()
    }

    /// Parse calls issued on this session
    pub async fn parse_count(&self) -> u64 {
        self.inner.session.lock().await.stmt_cache.parse_count()
    }

    /// Whether an uncommitted transaction is open
    pub async fn in_transaction(&self) -> bool {
        self.inner.session.lock().await.state == ConnectionState::InTransaction
    }

    /// Application tag, used by pools for session matching
    pub async fn tag(&self) -> Option<String> {
        self.inner.session.lock().await.tag.clone()
    }

    /// Set the application tag
    pub async fn set_tag(&self, tag: Option<String>) {
        self.inner.session.lock().await.tag = tag;
    }

    /// Change the statement cache capacity
    pub async fn set_stmt_cache_size(&self, size: usize) {
        self.inner.session.lock().await.stmt_cache.resize(size);
    }

    // =========================================================================
    // Statement execution
    // =========================================================================

    /// Execute a statement.
    ///
    /// Queries return a [`Cursor`] with the prefetched first rows buffered;
    /// DML returns the affected row count; PL/SQL OUT binds come back in
    /// `out_binds`.
    pub async fn execute(&self, sql: &str, binds: &[BindParam]) -> Result<ExecuteResult> {
        let mut session = self.inner.session.lock().await;
        self.check_callable(&session)?;

        let (mut statement, from_cache) = match session.stmt_cache.get(sql) {
            Some(statement) => (statement, true),
            None => (Statement::prepare(sql)?, false),
        };
        if statement.requires_parse() {
            session.stmt_cache.record_parse();
        }
        let ordered_binds = statement.order_binds(binds)?;

        let out_bind_types: Vec<OracleType> = ordered_binds
            .iter()
            .filter(|b| b.direction.is_output())
            .map(|b| b.oracle_type)
            .collect();

        let previous_state = session.state;
        session.state = ConnectionState::Executing;

        let result = self
            .execute_inner(&mut session, &mut statement, &ordered_binds, &out_bind_types)
            .await;

        match result {
            Ok(response) => {
                let info = response.error.clone().unwrap_or_default();
                statement.set_cursor_id(info.cursor_id);
                statement.set_executed(true);
                if let Some(columns) = &response.columns {
                    statement.columns = columns.clone();
                }

                let is_query = statement.is_query();
                let is_ddl = statement.is_ddl();
                let columns = statement.columns.clone();
                let rows_affected = info.rows_affected;

                // transaction bookkeeping
                session.state = if is_ddl || session.autocommit || is_query {
                    match previous_state {
                        ConnectionState::InTransaction if !session.autocommit && !is_ddl => {
                            ConnectionState::InTransaction
                        }
                        _ => ConnectionState::Ready,
                    }
                } else if statement.is_dml() || statement.is_plsql() {
                    // DML under a global transaction branch belongs to the
                    // branch, not to a local transaction
                    if session.current_xid.is_some() {
                        previous_state
                    } else {
                        ConnectionState::InTransaction
                    }
                } else if matches!(
                    statement.statement_type(),
                    crate::statement::StatementType::Commit
                        | crate::statement::StatementType::Rollback
                ) {
                    ConnectionState::Ready
                } else {
                    previous_state
                };

                let cursor = if is_query {
                    let exhausted = response
                        .error
                        .as_ref()
                        .map(|e| e.is_end_of_fetch())
                        .unwrap_or(false);
                    Some(Cursor {
                        cursor_id: info.cursor_id,
                        columns,
                        buffered: response.rows.into_iter().collect(),
                        exhausted,
                    })
                } else {
                    None
                };

                session.stmt_cache.put(statement);
                Ok(ExecuteResult {
                    rows_affected,
                    cursor,
                    out_binds: response.out_binds,
                })
            }
            Err(e) => {
                if from_cache {
                    session.stmt_cache.release(sql);
                }
                if e.is_fatal_to_session() {
                    self.inner.healthy.store(false, Ordering::Release);
                    session.state = ConnectionState::Closed;
                } else {
                    session.state = previous_state;
                }
                Err(e)
            }
        }
    }

    async fn execute_inner(
        &self,
        session: &mut SessionState,
        statement: &mut Statement,
        binds: &[BindParam],
        out_bind_types: &[OracleType],
    ) -> Result<ServerResponse> {
        let seq = session.next_sequence();
        let mut body = WriteBuffer::new();

        let stale_cursors = session.stmt_cache.take_cursors_to_close();
        if !stale_cursors.is_empty() {
            PiggybackCloseCursors {
                cursor_ids: &stale_cursors,
            }
            .write(&mut body, seq)?;
        }

        let options = ExecuteOptions {
            prefetch_rows: self.inner.defaults.prefetchrows,
            autocommit: session.autocommit,
            describe_only: false,
        };
        ExecuteRequest::new(statement, binds, options).write(&mut body, seq)?;

        self.send_body(session, body.as_slice()).await?;
        self.parse_call_response(session, out_bind_types, Some(statement))
            .await
            .and_then(ServerResponse::into_result)
    }

    /// Execute the same DML once per bind row in a single round trip.
    ///
    /// Returns the total number of affected rows.
    pub async fn execute_many(&self, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
        let mut session = self.inner.session.lock().await;
        self.check_callable(&session)?;

        let (mut statement, from_cache) = match session.stmt_cache.get(sql) {
            Some(statement) => (statement, true),
            None => (Statement::prepare(sql)?, false),
        };
        if statement.is_query() {
            session.stmt_cache.release(sql);
            return Err(Error::InvalidParameter(
                "array execute does not apply to queries".into(),
            ));
        }
        if statement.requires_parse() {
            session.stmt_cache.record_parse();
        }

        let previous_state = session.state;
        session.state = ConnectionState::Executing;

        let result = async {
            let seq = session.next_sequence();
            let mut body = WriteBuffer::new();
            let options = ExecuteOptions {
                prefetch_rows: 0,
                autocommit: session.autocommit,
                describe_only: false,
            };
            crate::messages::BatchExecuteRequest {
                statement: &statement,
                rows,
                options,
            }
            .write(&mut body, seq)?;
            self.send_body(&session, body.as_slice()).await?;
            self.parse_call_response(&mut session, &[], None)
                .await
                .and_then(ServerResponse::into_result)
        }
        .await;

        match result {
            Ok(response) => {
                let info = response.error.unwrap_or_default();
                statement.set_cursor_id(info.cursor_id);
                statement.set_executed(true);
                session.state = if session.autocommit || statement.is_ddl() {
                    ConnectionState::Ready
                } else if session.current_xid.is_some() {
                    previous_state
                } else {
                    ConnectionState::InTransaction
                };
                session.stmt_cache.put(statement);
                Ok(info.rows_affected)
            }
            Err(e) => {
                if from_cache {
                    session.stmt_cache.release(sql);
                }
                if e.is_fatal_to_session() {
                    self.inner.healthy.store(false, Ordering::Release);
                    session.state = ConnectionState::Closed;
                } else {
                    session.state = previous_state;
                }
                Err(e)
            }
        }
    }

    /// Execute a query and fetch every row
    pub async fn query(&self, sql: &str, binds: &[BindParam]) -> Result<QueryResult> {
        let result = self.execute(sql, binds).await?;
        let mut cursor = result
            .cursor
            .ok_or_else(|| Error::InvalidParameter("statement is not a query".into()))?;
        let mut rows = Vec::new();
        loop {
            let batch = self
                .fetch(&mut cursor, self.inner.defaults.arraysize)
                .await?;
            if batch.is_empty() {
                break;
            }
            rows.extend(batch);
        }
        Ok(QueryResult {
            columns: cursor.columns,
            rows,
        })
    }

    /// Fetch up to `n` more rows from a cursor. Returns fewer (possibly
    /// zero) rows when the cursor is exhausted.
    pub async fn fetch(&self, cursor: &mut Cursor, n: u32) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        while out.len() < n as usize {
            if let Some(row) = cursor.buffered.pop_front() {
                out.push(row);
                continue;
            }
            if cursor.exhausted {
                break;
            }

            let mut session = self.inner.session.lock().await;
            self.check_callable(&session)?;
            let seq = session.next_sequence();
            let mut body = WriteBuffer::new();
            FetchRequest::new(cursor.cursor_id, n).write(&mut body, seq)?;
            self.send_body(&session, body.as_slice()).await?;

            let mut parser = ResponseParser::new().with_columns(cursor.columns.clone());
            let raw = self.read_call_body(&mut session).await?;
            let response = parser.parse(&raw)?;

            match &response.error {
                Some(info) if info.is_end_of_fetch() => {
                    cursor.exhausted = true;
                }
                Some(info) if info.is_error() => {
                    let e = info.clone().into_error();
                    if e.is_fatal_to_session() {
                        self.inner.healthy.store(false, Ordering::Release);
                        session.state = ConnectionState::Closed;
                    }
                    return Err(e);
                }
                _ => {}
            }
            if response.rows.is_empty() && !cursor.exhausted {
                cursor.exhausted = true;
            }
            cursor.buffered.extend(response.rows);
        }
        Ok(out)
    }

    // =========================================================================
    // Transaction control
    // =========================================================================

    /// Commit the open transaction
    pub async fn commit(&self) -> Result<()> {
        self.simple_call(FunctionCode::Commit).await?;
        let mut session = self.inner.session.lock().await;
        if session.state == ConnectionState::InTransaction {
            session.state = ConnectionState::Ready;
        }
        Ok(())
    }

    /// Roll back the open transaction
    pub async fn rollback(&self) -> Result<()> {
        self.simple_call(FunctionCode::Rollback).await?;
        let mut session = self.inner.session.lock().await;
        if session.state == ConnectionState::InTransaction {
            session.state = ConnectionState::Ready;
        }
        Ok(())
    }

    /// Round-trip liveness check
    pub async fn ping(&self) -> Result<()> {
        self.simple_call(FunctionCode::Ping).await
    }

    async fn simple_call(&self, function: FunctionCode) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        self.check_callable(&session)?;
        let seq = session.next_sequence();
        let mut body = WriteBuffer::new();
        FunctionRequest(function).write(&mut body, seq)?;
        self.send_body(&session, body.as_slice()).await?;
        let response = self.parse_call_response(&mut session, &[], None).await;
        match response.and_then(ServerResponse::into_result) {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.is_fatal_to_session() {
                    self.inner.healthy.store(false, Ordering::Release);
                    session.state = ConnectionState::Closed;
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // LOB operations
    // =========================================================================

    async fn lob_call(&self, request: crate::messages::LobOpRequest<'_>) -> Result<ServerResponse> {
        let mut session = self.inner.session.lock().await;
        self.check_callable(&session)?;
        let seq = session.next_sequence();
        let mut body = WriteBuffer::new();
        request.write_message(&mut body, seq)?;
        self.send_body(&session, body.as_slice()).await?;
        let result = self
            .parse_call_response(&mut session, &[], None)
            .await
            .and_then(ServerResponse::into_result);
        if let Err(e) = &result {
            if e.is_fatal_to_session() {
                self.inner.healthy.store(false, Ordering::Release);
                session.state = ConnectionState::Closed;
            }
        }
        result
    }

    /// The LOB's length in characters (CLOB) or bytes (BLOB)
    pub async fn lob_length(&self, locator: &crate::types::LobLocator) -> Result<u64> {
        let response = self
            .lob_call(crate::messages::LobOpRequest::get_length(locator))
            .await?;
        Ok(response.rows_affected())
    }

    /// Read up to `amount` units of LOB content starting at 1-based `offset`
    pub async fn lob_read(
        &self,
        locator: &crate::types::LobLocator,
        offset: u64,
        amount: u64,
    ) -> Result<Vec<u8>> {
        let response = self
            .lob_call(crate::messages::LobOpRequest::read(locator, offset, amount)?)
            .await?;
        Ok(response.lob_data.unwrap_or_default())
    }

    /// Write `data` into the LOB starting at 1-based `offset`
    pub async fn lob_write(
        &self,
        locator: &crate::types::LobLocator,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        self.lob_call(crate::messages::LobOpRequest::write(locator, offset, data)?)
            .await?;
        Ok(())
    }

    /// Truncate the LOB to `new_length`
    pub async fn lob_trim(
        &self,
        locator: &crate::types::LobLocator,
        new_length: u64,
    ) -> Result<()> {
        self.lob_call(crate::messages::LobOpRequest::trim(locator, new_length))
            .await?;
        Ok(())
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Interrupt the call in flight on this connection.
    ///
    /// Safe to invoke from another task while a call is blocked; the
    /// interrupted call fails with ORA-01013 and the connection is usable
    /// again once its packet stream has resynchronized. A cancel with no
    /// call in flight is a no-op.
    pub async fn cancel(&self) -> Result<()> {
        if self.inner.session.try_lock().is_ok() {
            return Ok(());
        }
        // one break per in-flight call; concurrent cancels collapse
        if self.inner.break_pending.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let marker = Packet::marker(MarkerType::Break, self.inner.transport.uses_large_sdu())?;
        self.inner.transport.send_out_of_band(marker).await
    }

    /// Send the reset marker and drain the stream until the server answers
    /// with its own reset, leaving the connection ready for the next call
    async fn resync(&self) -> Result<()> {
        self.inner.break_pending.store(false, Ordering::Release);
        let reset = Packet::marker(MarkerType::Reset, self.inner.transport.uses_large_sdu())?;
        self.inner.transport.send_out_of_band(reset).await?;
        loop {
            let packet = self.inner.transport.receive_packet().await?;
            if packet.marker_type() == Some(MarkerType::Reset) {
                return Ok(());
            }
        }
    }

    /// After a break, resynchronize and report the interrupted call as
    /// cancelled
    async fn resync_after_break(&self) -> Error {
        match self.resync().await {
            Ok(()) => Error::OracleError {
                code: error_code::USER_REQUESTED_CANCEL,
                message: "user requested cancel of current operation".into(),
                offset: 0,
            },
            Err(e) => {
                self.inner.healthy.store(false, Ordering::Release);
                e
            }
        }
    }

    // =========================================================================
    // Two-phase commit
    // =========================================================================

    /// Associate the session with a global transaction branch
    pub async fn tpc_begin(&self, xid: &Xid, flags: u32, timeout_secs: u32) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        self.check_callable(&session)?;
        if session.state == ConnectionState::InTransaction {
            return Err(Error::InvalidParameter(
                "local transaction in progress; commit or roll back first".into(),
            ));
        }
        if let Some(state) = session.tpc_state(xid) {
            if state.is_prepared() && flags & tpc_begin_flags::RESUME == 0 {
                return Err(Error::InvalidParameter(
                    "transaction is already prepared".into(),
                ));
            }
        }

        let seq = session.next_sequence();
        let mut body = WriteBuffer::new();
        TpcSwitchRequest::start(xid, flags, timeout_secs).write(&mut body, seq)?;
        self.send_body(&session, body.as_slice()).await?;
        self.parse_call_response(&mut session, &[], None)
            .await
            .and_then(ServerResponse::into_result)?;

        session.set_tpc_state(xid, TpcState::Begun);
        session.current_xid = Some(xid.clone());
        Ok(())
    }

    /// Dissociate the session from a branch, suspending it for later resume
    pub async fn tpc_end(&self, xid: Option<&Xid>, flags: u32) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        self.check_callable(&session)?;
        let xid = match xid.or(session.current_xid.as_ref()) {
            Some(xid) => xid.clone(),
            None => {
                return Err(Error::InvalidParameter(
                    "no global transaction is active".into(),
                ))
            }
        };

        let seq = session.next_sequence();
        let mut body = WriteBuffer::new();
        TpcSwitchRequest::detach(&xid, flags).write(&mut body, seq)?;
        self.send_body(&session, body.as_slice()).await?;
        self.parse_call_response(&mut session, &[], None)
            .await
            .and_then(ServerResponse::into_result)?;

        session.set_tpc_state(&xid, TpcState::Ended);
        if session.current_xid.as_ref() == Some(&xid) {
            session.current_xid = None;
        }
        Ok(())
    }

    /// Prepare a branch. Returns `false` when the branch touched nothing
    /// and the transaction manager can skip its commit.
    pub async fn tpc_prepare(&self, xid: Option<&Xid>) -> Result<bool> {
        let mut session = self.inner.session.lock().await;
        self.check_callable(&session)?;
        let xid = match xid.or(session.current_xid.as_ref()) {
            Some(xid) => xid.clone(),
            None => {
                return Err(Error::InvalidParameter(
                    "no global transaction is active".into(),
                ))
            }
        };
        match session.tpc_state(&xid) {
            Some(state) if state.can_prepare() => {}
            Some(_) => {
                return Err(Error::InvalidParameter(
                    "transaction cannot be prepared in its current state".into(),
                ))
            }
            None => {
                return Err(Error::InvalidParameter(
                    "transaction was never begun on this session".into(),
                ))
            }
        }

        let seq = session.next_sequence();
        let mut body = WriteBuffer::new();
        TpcChangeStateRequest::prepare(&xid).write(&mut body, seq)?;
        self.send_body(&session, body.as_slice()).await?;
        let response = self
            .parse_call_response(&mut session, &[], None)
            .await
            .and_then(ServerResponse::into_result)?;

        let state_word = response
            .call_status
            .or(response.error.as_ref().map(|e| e.call_status))
            .unwrap_or(tpc_state::REQUIRES_COMMIT);
        if state_word == tpc_state::READ_ONLY {
            // nothing to commit; the branch is complete
            session.remove_tpc(&xid);
            if session.current_xid.as_ref() == Some(&xid) {
                session.current_xid = None;
            }
            Ok(false)
        } else {
            session.set_tpc_state(&xid, TpcState::Prepared);
            Ok(true)
        }
    }

    /// Commit a branch, one-phase when it was never prepared
    pub async fn tpc_commit(&self, xid: Option<&Xid>) -> Result<()> {
        self.tpc_finish(xid, true).await
    }

    /// Roll a branch back
    pub async fn tpc_rollback(&self, xid: Option<&Xid>) -> Result<()> {
        self.tpc_finish(xid, false).await
    }

    async fn tpc_finish(&self, xid: Option<&Xid>, commit: bool) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        self.check_callable(&session)?;
        let xid = match xid.or(session.current_xid.as_ref()) {
            Some(xid) => xid.clone(),
            None => {
                return Err(Error::InvalidParameter(
                    "no global transaction is active".into(),
                ))
            }
        };
        let state = session.tpc_state(&xid).ok_or_else(|| {
            Error::InvalidParameter("transaction was never begun on this session".into())
        })?;
        if state.is_terminal() {
            return Err(Error::InvalidParameter(
                "transaction has already completed".into(),
            ));
        }
        let one_phase = !state.is_prepared();

        let seq = session.next_sequence();
        let mut body = WriteBuffer::new();
        let request = if commit {
            TpcChangeStateRequest::commit(&xid, one_phase)
        } else {
            TpcChangeStateRequest::rollback(&xid)
        };
        request.write(&mut body, seq)?;
        self.send_body(&session, body.as_slice()).await?;
        self.parse_call_response(&mut session, &[], None)
            .await
            .and_then(ServerResponse::into_result)?;

        session.set_tpc_state(
            &xid,
            if commit {
                TpcState::Committed
            } else {
                TpcState::RolledBack
            },
        );
        if session.current_xid.as_ref() == Some(&xid) {
            session.current_xid = None;
        }
        if session.state == ConnectionState::InTransaction {
            session.state = ConnectionState::Ready;
        }
        Ok(())
    }

    // =========================================================================
    // Close
    // =========================================================================

    /// Log off and close the socket. Calling close twice fails with
    /// [`Error::NotConnected`].
    pub async fn close(&self) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        if session.state == ConnectionState::Closed {
            return Err(Error::NotConnected);
        }
        session.state = ConnectionState::Closing;

        // best effort: the session may already be dead
        if self.is_healthy() {
            let seq = session.next_sequence();
            let mut body = WriteBuffer::new();
            if FunctionRequest(FunctionCode::Logoff)
                .write(&mut body, seq)
                .is_ok()
                && self.send_body(&session, body.as_slice()).await.is_ok()
            {
                let _ = self.read_call_body(&mut session).await;
            }
        }

        let _ = self.inner.transport.close().await;
        session.state = ConnectionState::Closed;
        self.inner.healthy.store(false, Ordering::Release);
        Ok(())
    }

    // =========================================================================
    // I/O plumbing
    // =========================================================================

    fn check_callable(&self, session: &SessionState) -> Result<()> {
        match session.state {
            ConnectionState::Ready | ConnectionState::InTransaction => Ok(()),
            ConnectionState::Closed | ConnectionState::Closing | ConnectionState::Disconnected => {
                Err(Error::NotConnected)
            }
            state => Err(Error::Internal(format!(
                "call attempted in state {:?}",
                state
            ))),
        }
    }

    async fn send_body(&self, _session: &SessionState, body: &[u8]) -> Result<()> {
        let transport = &self.inner.transport;
        let packets = split_into_data_packets(
            body,
            transport.sdu() as usize,
            transport.uses_large_sdu(),
            data_flags::END_OF_REQUEST,
        )?;
        for packet in packets {
            transport.send_packet(packet).await?;
        }
        Ok(())
    }

    /// Accumulate DATA payloads until the end-of-response flag, honoring the
    /// call timeout and break markers
    async fn read_call_body(&self, _session: &mut SessionState) -> Result<Vec<u8>> {
        let fut = self.read_response_raw();
        match self.inner.defaults.call_timeout {
            Some(limit) => match timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    // interrupt the server-side call, then resynchronize so
                    // the session survives the timeout; a grace period bounds
                    // a dead server
                    let break_marker =
                        Packet::marker(MarkerType::Break, self.inner.transport.uses_large_sdu())?;
                    let recovered = self.inner.transport.send_out_of_band(break_marker).await.is_ok()
                        && timeout(std::time::Duration::from_secs(5), self.resync())
                            .await
                            .map(|r| r.is_ok())
                            .unwrap_or(false);
                    if !recovered {
                        self.inner.healthy.store(false, Ordering::Release);
                    }
                    Err(Error::CallTimeout(limit))
                }
            },
            None => fut.await,
        }
    }

    async fn read_response_raw(&self) -> Result<Vec<u8>> {
        let transport = &self.inner.transport;
        let mut body = Vec::new();
        loop {
            let packet = transport.receive_packet().await?;
            match packet.packet_type() {
                PacketType::Data => {
                    let flags = packet.data_flags();
                    body.extend_from_slice(&packet.message_body());
                    if flags & (data_flags::END_OF_RESPONSE | data_flags::EOF) != 0 {
                        return Ok(body);
                    }
                }
                PacketType::Marker => {
                    return Err(self.resync_after_break().await);
                }
                PacketType::Control => continue,
                other => {
                    self.inner.healthy.store(false, Ordering::Release);
                    return Err(Error::ProtocolViolation(format!(
                        "unexpected {:?} packet inside a call response",
                        other
                    )));
                }
            }
        }
    }

    async fn parse_call_response(
        &self,
        session: &mut SessionState,
        out_bind_types: &[OracleType],
        statement: Option<&Statement>,
    ) -> Result<ServerResponse> {
        let raw = self.read_call_body(session).await?;
        let mut parser = ResponseParser::new().with_out_binds(out_bind_types.to_vec());
        if let Some(statement) = statement {
            parser = parser.with_columns(statement.columns.clone());
        }
        parser.parse(&raw)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("healthy", &self.is_healthy())
            .field("round_trips", &self.round_trips())
            .finish()
    }
}
