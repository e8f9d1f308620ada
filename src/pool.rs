//! Connection pooling
//!
//! A [`Pool`] owns a bounded set of sessions and hands them out LIFO: the
//! most recently released session is reacquired first, which keeps
//! server-side caches warm. All pool-wide state lives behind one mutex;
//! waiters for the `Wait`/`TimedWait` get modes park on a single notifier
//! so acquire and release observe counts atomically.
//!
//! The pool is generic over [`PoolableSession`] so its invariants are
//! testable without a live server; [`ConnectionPool`] is the production
//! instantiation over [`Connection`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use crate::config::{ConnectParams, Defaults, GetMode, PoolParams, Purity};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::statement::BindParam;

/// What the pool needs from a session
#[async_trait::async_trait]
pub trait PoolableSession: Send + Sync + Sized + 'static {
    /// Roll back any open transaction
    async fn rollback(&self) -> Result<()>;

    /// Round-trip liveness check
    async fn ping(&self) -> Result<()>;

    /// Tear the session down
    async fn close(&self) -> Result<()>;

    /// Whether the session is believed usable without a round trip
    fn is_healthy(&self) -> bool;

    /// Whether an uncommitted transaction is open
    async fn in_transaction(&self) -> bool;

    /// The session's application tag
    async fn tag(&self) -> Option<String>;

    /// Replace the session's application tag
    async fn set_tag(&self, tag: Option<String>);
}

#[async_trait::async_trait]
impl PoolableSession for Connection {
    async fn rollback(&self) -> Result<()> {
        Connection::rollback(self).await
    }

    async fn ping(&self) -> Result<()> {
        Connection::ping(self).await
    }

    async fn close(&self) -> Result<()> {
        Connection::close(self).await
    }

    fn is_healthy(&self) -> bool {
        Connection::is_healthy(self)
    }

    async fn in_transaction(&self) -> bool {
        Connection::in_transaction(self).await
    }

    async fn tag(&self) -> Option<String> {
        Connection::tag(self).await
    }

    async fn set_tag(&self, tag: Option<String>) {
        Connection::set_tag(self, tag).await
    }
}

/// Creates sessions for the pool
#[async_trait::async_trait]
pub trait SessionFactory<S>: Send + Sync + 'static {
    /// Open one new session
    async fn create(&self) -> Result<S>;
}

/// Production factory dialing the database with fixed parameters
pub struct ConnectFactory {
    params: ConnectParams,
    defaults: Defaults,
}

impl ConnectFactory {
    /// Create a factory from connection parameters
    pub fn new(params: ConnectParams, defaults: Defaults) -> Self {
        Self { params, defaults }
    }
}

#[async_trait::async_trait]
impl SessionFactory<Connection> for ConnectFactory {
    async fn create(&self) -> Result<Connection> {
        Connection::connect(self.params.clone(), self.defaults.clone()).await
    }
}

/// Callback invoked when an acquired session's tag differs from the
/// requested tag, letting the application re-configure the session lazily
#[async_trait::async_trait]
pub trait SessionCallback<S>: Send + Sync {
    /// Bring `session` into the state the requested tag describes
    async fn configure(&self, session: &S, requested_tag: &str) -> Result<()>;
}

/// Adapter wrapping a blocking closure as a [`SessionCallback`]
pub struct BlockingSessionCallback<F>(pub F);

#[async_trait::async_trait]
impl<S, F> SessionCallback<S> for BlockingSessionCallback<F>
where
    S: Send + Sync,
    F: Fn(&S, &str) -> Result<()> + Send + Sync,
{
    async fn configure(&self, session: &S, requested_tag: &str) -> Result<()> {
        (self.0)(session, requested_tag)
    }
}

/// Options for one acquire call
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Only sessions carrying this tag match without a callback round
    pub tag: Option<String>,
    /// Connection class, reserved for server-side brokering
    pub cclass: Option<String>,
    /// Session purity; `New` refuses to reuse any idle session
    pub purity: Purity,
}

struct PoolEntry<S> {
    session: S,
    tag: Option<String>,
    created: Instant,
    last_released: Instant,
}

struct PoolState<S> {
    idle: Vec<PoolEntry<S>>,
    opened: u32,
    busy: u32,
    closed: bool,
    /// Set when the last busy session returns; cleared on acquire. The
    /// shrink rule keys off the whole pool being idle this long.
    all_idle_since: Option<Instant>,
}

struct PoolInner<S> {
    state: Mutex<PoolState<S>>,
    released: Notify,
    params: Mutex<PoolParams>,
    factory: Arc<dyn SessionFactory<S>>,
    callback: Option<Arc<dyn SessionCallback<S>>>,
}

/// Pool statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Live sessions, busy and idle
    pub opened: u32,
    /// Checked-out sessions
    pub busy: u32,
}

/// A bounded, thread-safe session pool
pub struct Pool<S: PoolableSession> {
    inner: Arc<PoolInner<S>>,
}

impl<S: PoolableSession> Clone for Pool<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Pool of real database connections
pub type ConnectionPool = Pool<Connection>;

impl Pool<Connection> {
    /// Create a pool that dials the database with the given parameters
    pub async fn create(
        params: ConnectParams,
        pool_params: PoolParams,
        defaults: Defaults,
    ) -> Result<ConnectionPool> {
        Pool::create_with_factory(
            Arc::new(ConnectFactory::new(params, defaults)),
            pool_params,
            None,
        )
        .await
    }
}

impl<S: PoolableSession> Pool<S> {
    /// Create a pool over a custom session factory
    pub async fn create_with_factory(
        factory: Arc<dyn SessionFactory<S>>,
        pool_params: PoolParams,
        callback: Option<Arc<dyn SessionCallback<S>>>,
    ) -> Result<Pool<S>> {
        let params = pool_params.normalized()?;
        let pool = Pool {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    opened: 0,
                    busy: 0,
                    closed: false,
                    all_idle_since: Some(Instant::now()),
                }),
                released: Notify::new(),
                params: Mutex::new(params.clone()),
                factory,
                callback,
            }),
        };

        // initial fill to min
        for _ in 0..params.min {
            let session = pool.inner.factory.create().await?;
            let mut state = pool.inner.state.lock().await;
            state.opened += 1;
            state.idle.push(PoolEntry {
                session,
                tag: None,
                created: Instant::now(),
                last_released: Instant::now(),
            });
        }
        Ok(pool)
    }

    /// Current statistics
    pub async fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock().await;
        PoolStats {
            opened: state.opened,
            busy: state.busy,
        }
    }

    /// Current pool parameters
    pub async fn params(&self) -> PoolParams {
        self.inner.params.lock().await.clone()
    }

    /// Acquire a session with default options
    pub async fn acquire(&self) -> Result<PooledConnection<S>> {
        self.acquire_with(AcquireOptions::default()).await
    }

    /// Acquire a session, matching tag/purity where possible.
    ///
    /// Preference order: an idle session with the requested tag, then (for
    /// default purity) the most recently released idle session, then growth
    /// by `increment` when below `max`, then the getmode policy.
    pub async fn acquire_with(&self, options: AcquireOptions) -> Result<PooledConnection<S>> {
        enum Plan<S> {
            Got(PoolEntry<S>),
            Grow(u32),
            Wait,
        }

        let params = self.inner.params.lock().await.clone();
        let deadline = match params.getmode {
            GetMode::TimedWait(limit) => Some(Instant::now() + limit),
            _ => None,
        };

        loop {
            self.shrink_if_due(&params).await;

            let plan = {
                let mut state = self.inner.state.lock().await;
                if state.closed {
                    return Err(Error::PoolClosed);
                }

                match Self::take_idle(&mut state, &options) {
                    Some(entry) => {
                        state.busy += 1;
                        state.all_idle_since = None;
                        Plan::Got(entry)
                    }
                    None if state.opened < params.max => {
                        let headroom = params.max - state.opened;
                        let grow_by = params.increment.max(1).min(headroom);
                        // reserve the slots so concurrent acquires cannot
                        // overshoot max
                        state.opened += grow_by;
                        Plan::Grow(grow_by)
                    }
                    None => Plan::Wait,
                }
            };

            match plan {
                Plan::Got(entry) => {
                    match self.prepare_acquired(entry, &options, &params).await {
                        Ok(Some(guard)) => return Ok(guard),
                        Ok(None) => continue, // dead session dropped, retry
                        Err(e) => return Err(e),
                    }
                }
                Plan::Grow(grow_by) => {
                    match self.grow(grow_by).await {
                        Ok(()) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Plan::Wait => match params.getmode {
                    GetMode::NoWait => return Err(Error::PoolExhausted),
                    GetMode::Wait => {
                        // bounded slice: a release between the state check
                        // and this wait must not strand the waiter
                        let _ = timeout(
                            Duration::from_millis(250),
                            self.inner.released.notified(),
                        )
                        .await;
                    }
                    GetMode::TimedWait(limit) => {
                        let deadline = deadline.unwrap_or_else(|| Instant::now() + limit);
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            return Err(Error::PoolTimeout(limit));
                        }
                        let slice = remaining.min(Duration::from_millis(250));
                        let _ = timeout(slice, self.inner.released.notified()).await;
                    }
                },
            }
        }
    }

    /// Pick an idle entry for the request, LIFO within each preference tier
    fn take_idle(state: &mut PoolState<S>, options: &AcquireOptions) -> Option<PoolEntry<S>> {
        if state.idle.is_empty() || options.purity == Purity::New {
            return None;
        }
        if let Some(tag) = &options.tag {
            if let Some(pos) = state
                .idle
                .iter()
                .rposition(|e| e.tag.as_deref() == Some(tag))
            {
                return Some(state.idle.remove(pos));
            }
        }
        state.idle.pop()
    }

    /// Health-check and tag-configure an entry on its way out of the pool.
    /// Returns `None` when the entry proved dead and was dropped.
    async fn prepare_acquired(
        &self,
        entry: PoolEntry<S>,
        options: &AcquireOptions,
        params: &PoolParams,
    ) -> Result<Option<PooledConnection<S>>> {
        if !entry.session.is_healthy() {
            self.discard(entry).await;
            return Ok(None);
        }

        // ping only when the entry has idled long enough to be suspect
        if let Some(interval) = params.ping_interval {
            if entry.last_released.elapsed() >= interval && entry.session.ping().await.is_err() {
                tracing::debug!("dropping pooled session that failed its ping");
                self.discard(entry).await;
                return Ok(None);
            }
        }

        if let (Some(requested), Some(callback)) = (&options.tag, &self.inner.callback) {
            let actual = entry.session.tag().await;
            if actual.as_deref() != Some(requested.as_str()) {
                if let Err(e) = callback.configure(&entry.session, requested).await {
                    // the session itself is fine; put it back before failing
                    let mut state = self.inner.state.lock().await;
                    state.busy = state.busy.saturating_sub(1);
                    state.idle.push(entry);
                    drop(state);
                    self.inner.released.notify_waiters();
                    return Err(e);
                }
                entry.session.set_tag(Some(requested.clone())).await;
            }
        }

        Ok(Some(PooledConnection {
            pool: self.clone(),
            session: Some(entry.session),
            created: entry.created,
        }))
    }

    async fn grow(&self, grow_by: u32) -> Result<()> {
        for i in 0..grow_by {
            match self.inner.factory.create().await {
                Ok(session) => {
                    let mut state = self.inner.state.lock().await;
                    state.idle.push(PoolEntry {
                        session,
                        tag: None,
                        created: Instant::now(),
                        last_released: Instant::now(),
                    });
                    drop(state);
                    self.inner.released.notify_waiters();
                }
                Err(e) => {
                    // release the slots we reserved but could not fill
                    let mut state = self.inner.state.lock().await;
                    state.opened -= grow_by - i;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Return a session to the idle set (rolling back first) or drop it if
    /// it is no longer healthy
    async fn release(&self, session: S, created: Instant) {
        let healthy = session.is_healthy() && {
            // never hand a session with an open transaction to the next
            // caller; an implicit rollback keeps release silent-commit-free
            if session.in_transaction().await {
                session.rollback().await.is_ok()
            } else {
                true
            }
        };

        let mut state = self.inner.state.lock().await;
        state.busy = state.busy.saturating_sub(1);
        if state.closed || !healthy || !session.is_healthy() {
            state.opened = state.opened.saturating_sub(1);
            drop(state);
            let _ = session.close().await;
        } else {
            let tag = session.tag().await;
            state.idle.push(PoolEntry {
                session,
                tag,
                created,
                last_released: Instant::now(),
            });
            if state.busy == 0 {
                state.all_idle_since = Some(Instant::now());
            }
            drop(state);
        }
        self.inner.released.notify_waiters();
    }

    /// Permanently remove and destroy a session that was checked out
    async fn drop_session(&self, session: S) {
        let mut state = self.inner.state.lock().await;
        state.busy = state.busy.saturating_sub(1);
        state.opened = state.opened.saturating_sub(1);
        drop(state);
        let _ = session.close().await;
        self.inner.released.notify_waiters();
    }

    async fn discard(&self, entry: PoolEntry<S>) {
        let mut state = self.inner.state.lock().await;
        state.busy = state.busy.saturating_sub(1);
        state.opened = state.opened.saturating_sub(1);
        drop(state);
        let _ = entry.session.close().await;
    }

    /// Evict idle sessions down to `min` once the whole pool has been idle
    /// past the configured timeout. Checked lazily on acquire/release.
    async fn shrink_if_due(&self, params: &PoolParams) {
        let timeout = match params.timeout {
            Some(timeout) if !params.is_static() => timeout,
            _ => return,
        };

        let mut victims = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            let idle_long_enough = state
                .all_idle_since
                .map(|since| since.elapsed() >= timeout)
                .unwrap_or(false);
            if !idle_long_enough {
                return;
            }
            while state.opened > params.min && !state.idle.is_empty() {
                // oldest entries go first
                victims.push(state.idle.remove(0));
                state.opened -= 1;
            }
        }
        for entry in victims {
            tracing::debug!("shrinking pool: closing idle session");
            let _ = entry.session.close().await;
        }
    }

    /// Change pool parameters for subsequent acquire/release cycles without
    /// touching existing sessions
    pub async fn reconfigure(&self, new_params: PoolParams) -> Result<()> {
        let new_params = new_params.normalized()?;
        *self.inner.params.lock().await = new_params;
        self.inner.released.notify_waiters();
        Ok(())
    }

    /// Close the pool. Refuses while sessions are checked out unless
    /// `force` is set; forced close tears down idle sessions immediately
    /// and destroys busy ones as they are released.
    pub async fn close(&self, force: bool) -> Result<()> {
        let idle = {
            let mut state = self.inner.state.lock().await;
            if state.busy > 0 && !force {
                return Err(Error::PoolBusy(state.busy));
            }
            state.closed = true;
            let idle: Vec<PoolEntry<S>> = state.idle.drain(..).collect();
            state.opened = state.opened.saturating_sub(idle.len() as u32);
            idle
        };
        for entry in idle {
            let _ = entry.session.close().await;
        }
        self.inner.released.notify_waiters();
        Ok(())
    }
}

/// RAII guard for a checked-out session.
///
/// Dropping the guard returns the session to the pool (with an implicit
/// rollback); [`PooledConnection::drop_session`] destroys it instead, used
/// after the session proved dead.
pub struct PooledConnection<S: PoolableSession> {
    pool: Pool<S>,
    session: Option<S>,
    created: Instant,
}

impl<S: PoolableSession> PooledConnection<S> {
    /// Explicitly return the session to the pool
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session, self.created).await;
        }
    }

    /// Permanently remove this session from the pool and destroy it
    pub async fn drop_session(mut self) {
        if let Some(session) = self.session.take() {
            self.pool.drop_session(session).await;
        }
    }
}

impl<S: PoolableSession> std::fmt::Debug for PooledConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("has_session", &self.session.is_some())
            .field("created", &self.created)
            .finish()
    }
}

impl<S: PoolableSession> std::ops::Deref for PooledConnection<S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session.as_ref().expect("session present until release")
    }
}

impl<S: PoolableSession> Drop for PooledConnection<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let pool = self.pool.clone();
            let created = self.created;
            // the guard cannot await in Drop; finish the return on the runtime
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    pool.release(session, created).await;
                });
            }
        }
    }
}

impl Pool<Connection> {
    /// Convenience: acquire, run one query, release
    pub async fn query_once(
        &self,
        sql: &str,
        binds: &[BindParam],
    ) -> Result<crate::connection::QueryResult> {
        let conn = self.acquire().await?;
        let result = conn.query(sql, binds).await;
        conn.release().await;
        result
    }
}
