//! Connection pool implementation

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dbpool_core::{Connection, DbPoolError, Result};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::PoolLimits;
use super::stats::PoolStats;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that an idle connection is still usable before handing it out
    ///
    /// Default implementation only checks that the connection is not closed.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// An idle connection with its lifecycle timestamps
struct IdleConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    idle_since: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<IdleConnection>,
    in_use: usize,
    opening: usize,
    waiting: usize,
    wait_count: u64,
    wait_duration: Duration,
    max_idle_closed: u64,
    max_idle_time_closed: u64,
    max_lifetime_closed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Lifetime,
    IdleTime,
}

enum Popped {
    Empty,
    Expired(Arc<dyn Connection>),
    Ready(IdleConnection),
}

struct PoolShared {
    limits: PoolLimits,
    factory: Arc<dyn ConnectionFactory>,
    /// One permit per checked-out (or opening) connection
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    closed: AtomicBool,
}

impl PoolShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lifetime_exceeded(&self, created_at: Instant, now: Instant) -> bool {
        self.limits
            .max_lifetime()
            .is_some_and(|max| now.saturating_duration_since(created_at) > max)
    }

    fn expiry(&self, idle: &IdleConnection, now: Instant) -> Option<Expiry> {
        if self.lifetime_exceeded(idle.created_at, now) {
            return Some(Expiry::Lifetime);
        }
        self.limits
            .max_idle_time()
            .filter(|max| now.saturating_duration_since(idle.idle_since) > *max)
            .map(|_| Expiry::IdleTime)
    }

    fn count_expired(state: &mut PoolState, expiry: Expiry) {
        match expiry {
            Expiry::Lifetime => state.max_lifetime_closed += 1,
            Expiry::IdleTime => state.max_idle_time_closed += 1,
        }
    }

    /// Wait for a slot under the open-connection ceiling
    async fn wait_for_slot(
        &self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(DbPoolError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {}
        }

        let _wait = WaitGuard::new(self);
        tracing::debug!(?timeout, "pool at capacity, waiting for a connection");

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(DbPoolError::Cancelled),
            acquired = tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned()) => {
                match acquired {
                    Ok(Ok(permit)) => Ok(permit),
                    Ok(Err(_)) => Err(DbPoolError::PoolClosed),
                    Err(_) => {
                        tracing::warn!(?timeout, "timed out waiting for a pooled connection");
                        Err(DbPoolError::PoolExhausted(timeout))
                    }
                }
            }
        }
    }

    fn pop_idle(&self) -> Popped {
        let now = Instant::now();
        let mut state = self.state.lock();
        let Some(idle) = state.idle.pop_back() else {
            return Popped::Empty;
        };
        match self.expiry(&idle, now) {
            Some(expiry) => {
                Self::count_expired(&mut state, expiry);
                tracing::debug!(?expiry, "discarding expired idle connection");
                Popped::Expired(idle.connection)
            }
            None => {
                state.in_use += 1;
                Popped::Ready(idle)
            }
        }
    }

    /// Hand out an idle connection, or open a new one, for a caller holding a slot
    async fn checkout(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(DbPoolError::PoolClosed);
        }

        loop {
            match self.pop_idle() {
                Popped::Empty => break,
                Popped::Expired(connection) => close_in_background(connection),
                Popped::Ready(idle) => {
                    let checked = CheckedOut::new(self.clone(), idle.connection, idle.created_at);
                    if self.factory.validate(checked.connection.as_ref()).await {
                        return Ok(PooledConnection {
                            checked,
                            _permit: permit,
                        });
                    }
                    tracing::debug!("idle connection failed validation");
                    checked.discard();
                }
            }
        }

        let opening = OpeningGuard::new(self);
        let connection = self.factory.create().await.inspect_err(|e| {
            tracing::warn!(error = %e, "failed to open pooled connection");
        })?;
        let created_at = opening.complete();
        tracing::debug!("opened new pooled connection");

        Ok(PooledConnection {
            checked: CheckedOut::new(self.clone(), connection, created_at),
            _permit: permit,
        })
    }

    /// Take back a connection from a caller
    fn release(&self, connection: Arc<dyn Connection>, created_at: Instant, broken: bool) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.in_use = state.in_use.saturating_sub(1);

        let reason = if broken || connection.is_closed() || self.is_closed() {
            Some("discarded")
        } else if self.lifetime_exceeded(created_at, now) {
            state.max_lifetime_closed += 1;
            Some("max lifetime exceeded")
        } else if state.idle.len() >= self.limits.max_idle() {
            state.max_idle_closed += 1;
            Some("idle set full")
        } else {
            None
        };

        match reason {
            None => state.idle.push_back(IdleConnection {
                connection,
                created_at,
                idle_since: now,
            }),
            Some(reason) => {
                drop(state);
                tracing::debug!(reason, "closing connection on release");
                close_in_background(connection);
            }
        }
    }

    fn take_expired(&self) -> Vec<Arc<dyn Connection>> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(state.idle.len());

        while let Some(idle) = state.idle.pop_front() {
            match self.expiry(&idle, now) {
                Some(expiry) => {
                    Self::count_expired(&mut state, expiry);
                    expired.push(idle.connection);
                }
                None => kept.push_back(idle),
            }
        }
        state.idle = kept;
        expired
    }

    fn drain_idle(&self) -> Vec<Arc<dyn Connection>> {
        self.state
            .lock()
            .idle
            .drain(..)
            .map(|idle| idle.connection)
            .collect()
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        for idle in self.state.get_mut().idle.drain(..) {
            close_in_background(idle.connection);
        }
    }
}

async fn close_connection(connection: Arc<dyn Connection>) {
    if let Err(e) = connection.close().await {
        tracing::warn!(error = %e, "failed to close pooled connection");
    }
}

/// Close a connection on the current runtime without blocking the caller
fn close_in_background(connection: Arc<dyn Connection>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(close_connection(connection));
        }
        Err(_) => tracing::debug!("no runtime available, dropping connection without closing it"),
    }
}

/// Counts a caller as waiting until dropped
struct WaitGuard<'a> {
    shared: &'a PoolShared,
    started: Instant,
}

impl<'a> WaitGuard<'a> {
    fn new(shared: &'a PoolShared) -> Self {
        shared.state.lock().waiting += 1;
        Self {
            shared,
            started: Instant::now(),
        }
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.waiting = state.waiting.saturating_sub(1);
        state.wait_count += 1;
        state.wait_duration += self.started.elapsed();
    }
}

/// Counts a connection as opening until it is either established or abandoned
struct OpeningGuard<'a> {
    shared: &'a PoolShared,
    completed: bool,
}

impl<'a> OpeningGuard<'a> {
    fn new(shared: &'a PoolShared) -> Self {
        shared.state.lock().opening += 1;
        Self {
            shared,
            completed: false,
        }
    }

    /// Move the new connection from opening to in use
    fn complete(mut self) -> Instant {
        let mut state = self.shared.state.lock();
        state.opening = state.opening.saturating_sub(1);
        state.in_use += 1;
        self.completed = true;
        Instant::now()
    }
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let mut state = self.shared.state.lock();
            state.opening = state.opening.saturating_sub(1);
        }
    }
}

/// A connection counted as in use; returned to the pool when dropped
struct CheckedOut {
    shared: Arc<PoolShared>,
    connection: Arc<dyn Connection>,
    created_at: Instant,
    broken: AtomicBool,
}

impl CheckedOut {
    fn new(shared: Arc<PoolShared>, connection: Arc<dyn Connection>, created_at: Instant) -> Self {
        Self {
            shared,
            connection,
            created_at,
            broken: AtomicBool::new(false),
        }
    }

    fn discard(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

impl Drop for CheckedOut {
    fn drop(&mut self) {
        self.shared.release(
            self.connection.clone(),
            self.created_at,
            self.broken.load(Ordering::SeqCst),
        );
    }
}

/// A connection borrowed from the pool
///
/// Owns its slot, so it can be moved across tasks. When dropped, the
/// connection goes back to the idle set (or is closed) before the slot is
/// released.
pub struct PooledConnection {
    checked: CheckedOut,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.checked.connection
    }

    /// Close this connection instead of returning it to the pool
    pub fn discard(&self) {
        self.checked.discard();
    }

    /// When the physical connection was opened
    pub fn created_at(&self) -> Instant {
        self.checked.created_at
    }

    pub fn age(&self) -> Duration {
        self.checked.created_at.elapsed()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.checked.connection.as_ref()
    }
}

/// A bounded pool of database connections
///
/// The pool opens connections through its factory on demand, up to
/// `max_open`, and keeps at most `max_idle` of them for reuse. Connections are
/// returned to the pool when the `PooledConnection` wrapper is dropped.
/// Cloning the pool shares it.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a new connection pool with the given limits and factory
    pub fn new<F: ConnectionFactory>(limits: PoolLimits, factory: F) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                semaphore: Arc::new(Semaphore::new(limits.max_open())),
                limits,
                factory: Arc::new(factory),
                state: Mutex::new(PoolState::default()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Get a connection, waiting up to the configured acquire timeout
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.acquire_timeout(self.shared.limits.acquire_timeout())
            .await
    }

    /// Get a connection, giving up after `timeout`
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        self.acquire_with(timeout, &CancellationToken::new()).await
    }

    /// Get a connection, giving up on timeout or when `token` is cancelled
    ///
    /// This will:
    /// 1. Take a slot under `max_open`, waiting up to `timeout`
    /// 2. Reuse the most recently returned idle connection that has not expired
    ///    and still validates
    /// 3. Otherwise open a new connection through the factory
    ///
    /// `timeout` covers the whole acquisition. Running out of time while
    /// waiting for a slot fails with `PoolExhausted`; running out while a new
    /// connection is still opening fails with `Timeout`.
    pub async fn acquire_with(
        &self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<PooledConnection> {
        if token.is_cancelled() {
            return Err(DbPoolError::Cancelled);
        }

        let deadline = Instant::now().checked_add(timeout);
        let permit = self.shared.wait_for_slot(timeout, token).await?;

        // Opening a connection shares the caller's budget with the wait
        let checkout = async {
            let Some(deadline) = deadline else {
                return self.shared.checkout(permit).await;
            };
            tokio::time::timeout_at(deadline, self.shared.checkout(permit))
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!(?timeout, "timed out opening a pooled connection");
                    Err(DbPoolError::Timeout(format!(
                        "no connection could be opened within {:?}",
                        timeout
                    )))
                })
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(DbPoolError::Cancelled),
            conn = checkout => conn,
        }
    }

    /// Add an already opened connection to the idle set
    pub fn seed(&self, connection: Arc<dyn Connection>) {
        let now = Instant::now();
        let mut state = self.shared.state.lock();
        if self.shared.is_closed() || state.idle.len() >= self.shared.limits.max_idle() {
            state.max_idle_closed += 1;
            drop(state);
            close_in_background(connection);
            return;
        }
        state.idle.push_back(IdleConnection {
            connection,
            created_at: now,
            idle_since: now,
        });
    }

    /// Close idle connections past their lifetime or idle time.
    ///
    /// Returns how many were closed.
    pub async fn reap_expired(&self) -> usize {
        let expired = self.shared.take_expired();
        let count = expired.len();
        for connection in expired {
            close_connection(connection).await;
        }
        if count > 0 {
            tracing::debug!(count, "reaped expired idle connections");
        }
        count
    }

    /// Spawn a task that periodically reaps expired idle connections.
    ///
    /// Returns `None` when neither a lifetime nor an idle time is configured or
    /// when no tokio runtime is running. The task stops once the pool is closed
    /// or dropped.
    pub fn spawn_reaper(&self) -> Option<JoinHandle<()>> {
        let period = self.shared.limits.reaper_interval()?;
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let weak = Arc::downgrade(&self.shared);

        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                if shared.is_closed() {
                    break;
                }
                ConnectionPool { shared }.reap_expired().await;
            }
            tracing::debug!("pool reaper stopped");
        }))
    }

    /// Close all idle connections in the pool
    pub async fn close_idle(&self) {
        for connection in self.shared.drain_idle() {
            close_connection(connection).await;
        }
    }

    /// Close the pool: pending and future acquisitions fail with `PoolClosed`,
    /// idle connections are closed now and checked-out ones on return.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.semaphore.close();
        self.close_idle().await;
        tracing::info!("connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            max_open: self.shared.limits.max_open(),
            open: state.idle.len() + state.in_use + state.opening,
            in_use: state.in_use,
            idle: state.idle.len(),
            waiting: state.waiting,
            wait_count: state.wait_count,
            wait_duration: state.wait_duration,
            max_idle_closed: state.max_idle_closed,
            max_idle_time_closed: state.max_idle_time_closed,
            max_lifetime_closed: state.max_lifetime_closed,
        }
    }

    /// Get the pool limits
    pub fn limits(&self) -> &PoolLimits {
        &self.shared.limits
    }
}
