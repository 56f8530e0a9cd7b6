//! Connection pool implementation.
//!
//! Bookkeeping lives behind a `parking_lot` mutex that is never held across
//! an await. Opening a connection first reserves a slot under the lock
//! (`pending`), then performs the handshake outside it, so the pool never
//! overshoots `max` and a failed handshake hands its slot back.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use oradb_client::{
    Connection, ConnectionDescriptor, ConnectionFactory, ConnectorRegistry, Credentials,
    SessionAbort,
};
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;

use crate::alias::PoolRegistry;
use crate::config::{
    GetMode, PoolConfig, Reconfigure, validate_ping_timeout, validate_sizing,
};
use crate::error::PoolError;
use crate::lifecycle::{ConnectionMetadata, ConnectionState, HealthCheckResult, HealthChecker};
use crate::tag::{SessionContext, Tag};

/// A connection pool for Oracle Database sessions.
///
/// The pool keeps between `min` and `max` sessions open, hands them out
/// most-recently-released first, and health checks, tags and recycles them.
///
/// # Features
///
/// - WAIT, NOWAIT, FORCEGET and TIMEDWAIT acquire modes
/// - Growth in `increment` steps, the first inline and the rest in the background
/// - Idle timeout and maximum lifetime enforced by a housekeeping task
/// - Session tags with application or PL/SQL session callbacks
/// - Heterogeneous pools with per-acquire credentials
/// - Online reconfiguration and graceful or forced close
///
/// # Example
///
/// ```rust,ignore
/// use oradb_pool::{Pool, PoolConfig};
/// use oradb_client::{ConnectionDescriptor, Credentials};
///
/// let pool = Pool::builder()
///     .descriptor(ConnectionDescriptor::new("dbhost", "orclpdb1"))
///     .credentials(Credentials::password("scott", "tiger"))
///     .factory(connector)
///     .pool_config(PoolConfig::new().min(2).max(10))
///     .build()
///     .await?;
///
/// let conn = pool.acquire().await?;
/// // Use connection...
/// conn.release()?;
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

/// Lifecycle of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolLifecycle {
    /// Opening the initial connections.
    Creating,
    /// Serving requests.
    Active,
    /// Applying a [`Reconfigure`] request; requests are still served.
    Reconfiguring,
    /// Closing; new requests fail with [`PoolError::PoolClosed`].
    Closing,
    /// Closed for good.
    Closed,
}

struct PoolInner {
    /// Where connections go, with the pool's DRCP overrides applied.
    descriptor: ConnectionDescriptor,

    /// Credentials used when an acquire names none.
    credentials: Credentials,

    factory: Arc<dyn ConnectionFactory>,

    homogeneous: bool,

    /// Whether connections are opened only on demand.
    zero_start: bool,

    state: Mutex<PoolState>,

    /// Signalled whenever a connection or a slot may have become available.
    available: Notify,

    /// Serializes reconfigure and close.
    admin: tokio::sync::Mutex<()>,

    /// Counter for generating connection IDs.
    next_connection_id: AtomicU64,

    /// When the pool was created.
    created_at: Instant,

    /// Pool metrics.
    metrics: Mutex<PoolMetricsInner>,

    /// Housekeeping timer settings.
    timers: watch::Sender<TimerSettings>,

    /// Alias this pool is registered under.
    alias: Mutex<Option<(PoolRegistry, String)>>,
}

struct PoolState {
    lifecycle: PoolLifecycle,
    config: PoolConfig,
    /// Idle connections, least recently released first.
    idle: Vec<PoolEntry>,
    /// Live connections, idle and busy, including over-limit ones.
    opened: u32,
    busy: u32,
    /// Connections being opened.
    pending: u32,
    /// Over-limit connections, live or being opened.
    over_limit: u32,
    /// Busy connections by id.
    checked_out: HashMap<u64, CheckedOut>,
    /// Busy connections a forced close took off the books.
    revoked: HashSet<u64>,
}

/// What the pool keeps about a connection while a caller holds it.
struct CheckedOut {
    over_limit: bool,
    abort: Option<Arc<dyn SessionAbort>>,
}

struct PoolEntry {
    conn: Box<dyn Connection>,
    meta: ConnectionMetadata,
    tag: Tag,
    abort: Option<Arc<dyn SessionAbort>>,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    /// Total connections created.
    connections_created: u64,
    /// Total connections closed.
    connections_closed: u64,
    /// Connections closed by the idle timeout.
    connections_shrunk: u64,
    /// Total successful checkouts.
    checkouts_successful: u64,
    /// Total failed checkouts (timeouts, errors).
    checkouts_failed: u64,
    /// Total health checks performed.
    health_checks_performed: u64,
    /// Total health check failures.
    health_checks_failed: u64,
    /// Session callback invocations.
    callbacks_invoked: u64,
    /// Session callback failures.
    callbacks_failed: u64,
    /// Acquires that had to wait.
    waits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerSettings {
    interval: Option<Duration>,
    closed: bool,
}

/// Options for [`Pool::acquire_with`].
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Requested session tag.
    pub tag: Option<Tag>,
    /// Accept an idle connection with any tag when none matches exactly.
    pub match_any_tag: bool,
    /// Credentials for this connection; heterogeneous pools only.
    pub credentials: Option<Credentials>,
}

impl AcquireOptions {
    /// Create default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a session tag.
    #[must_use]
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Accept any tag when none matches exactly.
    #[must_use]
    pub fn match_any_tag(mut self, enabled: bool) -> Self {
        self.match_any_tag = enabled;
        self
    }

    /// Connect as a different user.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

struct Request<'a> {
    tag: &'a Tag,
    match_any: bool,
    user: Option<&'a str>,
}

enum Selection {
    Idle(PooledConnection),
    Create(Reservation),
    /// Nothing available; wait, up to the given bound if any.
    Wait(Option<Duration>),
}

/// A slot reserved for a connection being opened.
///
/// Dropping an unused reservation gives the slot back.
struct Reservation {
    inner: Arc<PoolInner>,
    over_limit: bool,
    armed: bool,
}

impl Reservation {
    /// Wrap a slot already counted in `pending`.
    fn new(inner: &Arc<PoolInner>, over_limit: bool) -> Self {
        Self {
            inner: Arc::clone(inner),
            over_limit,
            armed: true,
        }
    }

    /// Turn the slot into an open connection. Returns `false` when the pool
    /// no longer accepts connections.
    fn commit(mut self, state: &mut PoolState) -> bool {
        self.armed = false;
        state.pending = state.pending.saturating_sub(1);
        if state.is_shutting_down() {
            if self.over_limit {
                state.over_limit = state.over_limit.saturating_sub(1);
            }
            return false;
        }
        state.opened += 1;
        true
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            state.pending = state.pending.saturating_sub(1);
            if self.over_limit {
                state.over_limit = state.over_limit.saturating_sub(1);
            }
        }
        self.inner.available.notify_waiters();
    }
}

impl PoolState {
    fn new(config: PoolConfig) -> Self {
        Self {
            lifecycle: PoolLifecycle::Creating,
            config,
            idle: Vec::new(),
            opened: 0,
            busy: 0,
            pending: 0,
            over_limit: 0,
            checked_out: HashMap::new(),
            revoked: HashSet::new(),
        }
    }

    fn is_shutting_down(&self) -> bool {
        matches!(
            self.lifecycle,
            PoolLifecycle::Closing | PoolLifecycle::Closed
        )
    }

    fn is_serving(&self) -> bool {
        matches!(
            self.lifecycle,
            PoolLifecycle::Active | PoolLifecycle::Reconfiguring
        )
    }

    /// Open connections counted against `max`.
    fn counted_open(&self) -> u32 {
        self.opened.saturating_sub(self.over_limit)
    }

    /// Open and pending connections counted against `max`.
    fn counted(&self) -> u32 {
        (self.opened + self.pending).saturating_sub(self.over_limit)
    }

    fn headroom(&self) -> u32 {
        self.config.max.saturating_sub(self.counted())
    }

    fn mark_busy(&mut self, entry: &mut PoolEntry) {
        self.busy += 1;
        self.checked_out.insert(
            entry.meta.id,
            CheckedOut {
                over_limit: entry.meta.over_limit,
                abort: entry.abort.clone(),
            },
        );
        entry.meta.state = ConnectionState::Busy;
        entry.meta.checkouts += 1;
    }

    /// Stop counting a connection that is about to be closed.
    fn forget(&mut self, meta: &ConnectionMetadata) {
        self.forget_slot(meta.over_limit);
    }

    fn forget_slot(&mut self, over_limit: bool) {
        self.opened = self.opened.saturating_sub(1);
        if over_limit {
            self.over_limit = self.over_limit.saturating_sub(1);
        }
    }

    /// Take a busy connection off the books. `false` if it was not busy here.
    fn check_in(&mut self, id: u64) -> bool {
        if self.checked_out.remove(&id).is_some() {
            self.busy = self.busy.saturating_sub(1);
            true
        } else {
            false
        }
    }

    /// Stop counting every busy connection, returning their abort handles.
    fn revoke_busy(&mut self) -> Vec<(u64, Option<Arc<dyn SessionAbort>>)> {
        let revoked: Vec<_> = self
            .checked_out
            .drain()
            .map(|(id, slot)| (id, slot.over_limit, slot.abort))
            .collect();
        self.busy = 0;
        revoked
            .into_iter()
            .map(|(id, over_limit, abort)| {
                self.forget_slot(over_limit);
                self.revoked.insert(id);
                (id, abort)
            })
            .collect()
    }

    fn take_expired(&mut self, now: Instant) -> Vec<PoolEntry> {
        let max_lifetime = self.config.max_lifetime;
        if max_lifetime.is_zero() {
            return Vec::new();
        }
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.idle)
            .into_iter()
            .partition(|entry| entry.meta.is_expired(max_lifetime, now));
        self.idle = kept;
        for entry in &expired {
            self.forget(&entry.meta);
        }
        expired
    }

    fn take_idle(&mut self, inner: &Arc<PoolInner>, index: usize) -> Selection {
        let mut entry = self.idle.remove(index);
        self.mark_busy(&mut entry);
        Selection::Idle(PooledConnection::new(entry, inner))
    }

    fn select(
        &mut self,
        inner: &Arc<PoolInner>,
        request: &Request<'_>,
        now: Instant,
        to_close: &mut Vec<PoolEntry>,
    ) -> Result<Selection, PoolError> {
        if self.is_shutting_down() {
            return Err(PoolError::PoolClosed);
        }
        to_close.extend(self.take_expired(now));

        let same_user = |entry: &PoolEntry| entry.meta.user.as_deref() == request.user;

        let preferred = if request.tag.is_empty() {
            self.idle
                .iter()
                .rposition(|e| same_user(e) && e.tag.is_empty())
                .or_else(|| self.idle.iter().rposition(same_user))
        } else {
            self.idle
                .iter()
                .rposition(|e| same_user(e) && e.tag == *request.tag)
                .or_else(|| {
                    request
                        .match_any
                        .then(|| self.idle.iter().rposition(same_user))
                        .flatten()
                })
        };
        if let Some(index) = preferred {
            return Ok(self.take_idle(inner, index));
        }

        if self.headroom() > 0 {
            self.pending += 1;
            return Ok(Selection::Create(Reservation::new(inner, false)));
        }

        // Full: a same-user connection with another tag beats waiting.
        if let Some(index) = self.idle.iter().rposition(same_user) {
            return Ok(self.take_idle(inner, index));
        }

        // Full of other users' idle sessions: replace the oldest.
        if let Some(index) = self.idle.iter().position(|e| !same_user(e)) {
            let entry = self.idle.remove(index);
            self.forget(&entry.meta);
            to_close.push(entry);
            self.pending += 1;
            return Ok(Selection::Create(Reservation::new(inner, false)));
        }

        match self.config.get_mode {
            GetMode::NoWait => Err(PoolError::PoolExhausted {
                max: self.config.max,
            }),
            GetMode::ForceGet if self.over_limit == 0 => {
                self.pending += 1;
                self.over_limit += 1;
                Ok(Selection::Create(Reservation::new(inner, true)))
            }
            GetMode::TimedWait => Ok(Selection::Wait(Some(self.config.wait_timeout))),
            GetMode::Wait | GetMode::ForceGet => Ok(Selection::Wait(None)),
        }
    }

    /// Why a released connection should be closed instead of pooled.
    fn close_reason(&self, entry: &PoolEntry, now: Instant) -> Option<&'static str> {
        if self.lifecycle == PoolLifecycle::Closed {
            Some("pool closed")
        } else if entry.meta.over_limit {
            Some("over limit")
        } else if entry.meta.is_expired(self.config.max_lifetime, now) {
            Some("max lifetime reached")
        } else if !entry.conn.is_open() {
            Some("transport closed")
        } else if self.counted_open() > self.config.max {
            Some("pool above max")
        } else {
            None
        }
    }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Run `future` on the current runtime, if there is one.
fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => tracing::debug!("no runtime available, background pool task skipped"),
    }
}

impl PoolInner {
    fn notify(&self) {
        self.available.notify_waiters();
    }

    fn resolve_credentials(&self, requested: Option<&Credentials>) -> Result<Credentials, PoolError> {
        match requested {
            Some(_) if self.homogeneous => Err(PoolError::HomogeneousCredentials),
            Some(credentials) => Ok(credentials.clone()),
            None => Ok(self.credentials.clone()),
        }
    }

    async fn acquire(self: &Arc<Self>, options: &AcquireOptions) -> Result<PooledConnection, PoolError> {
        let credentials = self.resolve_credentials(options.credentials.as_ref())?;
        let requested = options.tag.clone().unwrap_or_default();
        let request = Request {
            tag: &requested,
            match_any: options.match_any_tag,
            user: credentials.session_user(),
        };
        let started = Instant::now();
        let mut discarded = 0u32;

        loop {
            let (mut conn, fresh) = match self.checkout(&request, started).await? {
                Selection::Idle(conn) => (conn, false),
                Selection::Create(reservation) => {
                    let over_limit = reservation.over_limit;
                    let conn = self.create_busy(reservation, &credentials).await?;
                    if self.homogeneous && !over_limit {
                        self.grow_in_background();
                    }
                    (conn, true)
                }
                Selection::Wait(_) => continue,
            };

            let (checker, max) = {
                let state = self.state.lock();
                (HealthChecker::from_config(&state.config), state.config.max)
            };
            let entry = conn.entry_mut();
            let result = if fresh {
                HealthChecker::check_opened(entry.conn.as_ref())
            } else {
                checker
                    .check(entry.conn.as_mut(), &entry.meta, Instant::now())
                    .await
            };
            self.record_health(&result);
            if !result.is_healthy() {
                tracing::debug!(
                    connection_id = conn.id(),
                    result = ?result,
                    "discarding unhealthy connection"
                );
                self.discard(conn).await;
                discarded += 1;
                if discarded > max {
                    return Err(PoolError::PoolUnhealthy {
                        attempts: discarded,
                    });
                }
                continue;
            }

            self.reconcile(&mut conn, &requested, fresh).await?;
            return Ok(conn);
        }
    }

    /// Pick an idle connection or reserve a slot, waiting as the get mode
    /// dictates.
    async fn checkout(self: &Arc<Self>, request: &Request<'_>, started: Instant) -> Result<Selection, PoolError> {
        let mut waited = false;
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut to_close = Vec::new();
            let selection = self
                .state
                .lock()
                .select(self, request, Instant::now(), &mut to_close);
            if !to_close.is_empty() {
                for entry in to_close {
                    self.spawn_close(entry);
                }
                self.replenish();
            }

            match selection? {
                Selection::Wait(bound) => {
                    if !waited {
                        waited = true;
                        self.metrics.lock().waits += 1;
                        tracing::trace!("pool exhausted, waiting for a connection");
                    }
                    match bound {
                        None => notified.await,
                        Some(wait_timeout) => {
                            if tokio::time::timeout_at(started + wait_timeout, notified)
                                .await
                                .is_err()
                            {
                                return Err(PoolError::Timeout(wait_timeout));
                            }
                        }
                    }
                }
                selection => return Ok(selection),
            }
        }
    }

    /// Run the session callback if the connection's tag needs reconciling.
    ///
    /// On failure the connection goes back to the pool with its old tag.
    async fn reconcile(
        self: &Arc<Self>,
        conn: &mut PooledConnection,
        requested: &Tag,
        fresh: bool,
    ) -> Result<(), PoolError> {
        if !fresh && (requested.is_empty() || conn.tag() == requested) {
            return Ok(());
        }
        let callback = self.state.lock().config.session_callback.clone();
        let Some(callback) = callback else {
            return Ok(());
        };

        let entry = conn.entry_mut();
        let previous = entry.tag.clone();
        let ctx = SessionContext {
            connection: entry.conn.as_mut(),
            requested_tag: requested,
            tag: &mut entry.tag,
            fresh,
        };
        let result = callback.invoke(ctx).await;

        let mut metrics = self.metrics.lock();
        metrics.callbacks_invoked += 1;
        match result {
            Ok(()) => {
                drop(metrics);
                tracing::debug!(
                    connection_id = entry.meta.id,
                    tag = %entry.tag,
                    "session callback completed"
                );
                Ok(())
            }
            Err(e) => {
                metrics.callbacks_failed += 1;
                drop(metrics);
                tracing::warn!(
                    connection_id = entry.meta.id,
                    error = %e,
                    "session callback failed"
                );
                entry.tag = previous;
                Err(e)
            }
        }
    }

    fn record_health(&self, result: &HealthCheckResult) {
        let mut metrics = self.metrics.lock();
        metrics.health_checks_performed += 1;
        if !result.is_healthy() {
            metrics.health_checks_failed += 1;
        }
    }

    async fn handshake(&self, over_limit: bool, credentials: &Credentials) -> Result<PoolEntry, PoolError> {
        let conn = oradb_client::connect(self.factory.as_ref(), &self.descriptor, credentials).await?;
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let mut meta = ConnectionMetadata::new(
            id,
            conn.session_id(),
            credentials.session_user().map(str::to_string),
            Instant::now(),
        );
        meta.over_limit = over_limit;
        self.metrics.lock().connections_created += 1;
        tracing::debug!(
            connection_id = id,
            session_id = meta.session_id,
            over_limit = over_limit,
            "pool connection opened"
        );
        let abort = conn.abort_handle();
        Ok(PoolEntry {
            conn,
            meta,
            tag: Tag::new(),
            abort,
        })
    }

    /// Open a connection for `reservation` and check it out to the caller.
    async fn create_busy(
        self: &Arc<Self>,
        reservation: Reservation,
        credentials: &Credentials,
    ) -> Result<PooledConnection, PoolError> {
        let mut entry = self.handshake(reservation.over_limit, credentials).await?;
        let accepted = {
            let mut state = self.state.lock();
            let accepted = reservation.commit(&mut state);
            if accepted {
                state.mark_busy(&mut entry);
            }
            accepted
        };
        self.notify();
        if !accepted {
            self.close_entry(entry).await;
            return Err(PoolError::PoolClosed);
        }
        Ok(PooledConnection::new(entry, self))
    }

    /// Open a connection for `reservation` and publish it as idle.
    async fn create_idle(self: &Arc<Self>, reservation: Reservation, credentials: &Credentials) -> Result<(), PoolError> {
        let mut entry = self.handshake(reservation.over_limit, credentials).await?;
        let rejected = {
            let mut state = self.state.lock();
            if reservation.commit(&mut state) {
                entry.meta.last_released_at = Instant::now();
                state.idle.push(entry);
                None
            } else {
                Some(entry)
            }
        };
        self.notify();
        match rejected {
            Some(entry) => {
                self.close_entry(entry).await;
                Err(PoolError::PoolClosed)
            }
            None => Ok(()),
        }
    }

    fn spawn_create(self: &Arc<Self>, reservation: Reservation) {
        let inner = Arc::clone(self);
        spawn_detached(async move {
            match inner.create_idle(reservation, &inner.credentials).await {
                Ok(()) => {}
                Err(PoolError::PoolClosed) => {
                    tracing::debug!("pool closed during background connection creation");
                }
                Err(e) => tracing::warn!(error = %e, "background connection creation failed"),
            }
        });
    }

    /// Reserve the rest of a growth step and open it in the background.
    fn grow_in_background(self: &Arc<Self>) {
        let count = {
            let mut state = self.state.lock();
            if !state.is_serving() {
                return;
            }
            let count = (state.config.effective_increment() - 1).min(state.headroom());
            state.pending += count;
            count
        };
        if count > 0 {
            tracing::debug!(count = count, "growing pool in the background");
        }
        for _ in 0..count {
            self.spawn_create(Reservation::new(self, false));
        }
    }

    /// Open connections in the background until `min` is reached again.
    fn replenish(self: &Arc<Self>) {
        if self.zero_start {
            return;
        }
        let deficit = {
            let mut state = self.state.lock();
            if !state.is_serving() {
                return;
            }
            let deficit = state
                .config
                .min
                .saturating_sub(state.counted())
                .min(state.headroom());
            state.pending += deficit;
            deficit
        };
        if deficit > 0 {
            tracing::debug!(deficit = deficit, "replenishing pool to min");
        }
        for _ in 0..deficit {
            self.spawn_create(Reservation::new(self, false));
        }
    }

    /// Open connections inline until `min` is reached.
    async fn fill_to_min(self: &Arc<Self>) -> Result<(), PoolError> {
        if self.zero_start {
            return Ok(());
        }
        loop {
            let reserved = {
                let mut state = self.state.lock();
                let reserve = state.counted() < state.config.min && state.headroom() > 0;
                if reserve {
                    state.pending += 1;
                }
                reserve
            };
            if !reserved {
                return Ok(());
            }
            self.create_idle(Reservation::new(self, false), &self.credentials)
                .await?;
        }
    }

    /// Return a busy connection to the pool, or close it if it cannot be
    /// reused.
    fn checkin(self: &Arc<Self>, mut entry: PoolEntry) -> Result<(), PoolError> {
        let now = Instant::now();
        let outcome = {
            let mut state = self.state.lock();
            if state.check_in(entry.meta.id) {
                entry.meta.last_released_at = now;
                match state.close_reason(&entry, now) {
                    Some(reason) => {
                        state.forget(&entry.meta);
                        entry.meta.state = ConnectionState::Invalid;
                        Ok(Some((entry, reason)))
                    }
                    None => {
                        entry.meta.state = ConnectionState::Free;
                        state.idle.push(entry);
                        Ok(None)
                    }
                }
            } else if state.revoked.remove(&entry.meta.id) {
                entry.meta.state = ConnectionState::Invalid;
                Ok(Some((entry, "pool closed")))
            } else {
                Err(entry)
            }
        };
        self.notify();

        match outcome {
            Ok(None) => Ok(()),
            Ok(Some((entry, reason))) => {
                tracing::debug!(
                    connection_id = entry.meta.id,
                    reason = reason,
                    "closing released connection"
                );
                self.spawn_close(entry);
                self.replenish();
                Ok(())
            }
            Err(entry) => {
                let id = entry.meta.id;
                self.spawn_close(entry);
                Err(PoolError::NotBusy { id })
            }
        }
    }

    /// Close a busy connection and stop counting it.
    async fn discard(self: &Arc<Self>, conn: PooledConnection) {
        let Some(mut entry) = conn.into_entry() else {
            return;
        };
        {
            let mut state = self.state.lock();
            if state.check_in(entry.meta.id) {
                state.forget(&entry.meta);
            } else {
                state.revoked.remove(&entry.meta.id);
            }
        }
        entry.meta.state = ConnectionState::Invalid;
        self.notify();
        self.close_entry(entry).await;
        self.replenish();
    }

    /// Remove a busy connection from the pool's books without closing it.
    fn detach(self: &Arc<Self>, entry: &PoolEntry) {
        {
            let mut state = self.state.lock();
            if state.check_in(entry.meta.id) {
                state.forget(&entry.meta);
            } else {
                state.revoked.remove(&entry.meta.id);
            }
        }
        self.notify();
        self.replenish();
    }

    async fn close_entry(&self, mut entry: PoolEntry) {
        if let Err(e) = entry.conn.close().await {
            tracing::debug!(
                connection_id = entry.meta.id,
                error = %e,
                "error closing connection"
            );
        }
        self.metrics.lock().connections_closed += 1;
        tracing::debug!(connection_id = entry.meta.id, "pool connection closed");
    }

    fn spawn_close(self: &Arc<Self>, entry: PoolEntry) {
        let inner = Arc::clone(self);
        spawn_detached(async move { inner.close_entry(entry).await });
    }

    async fn sweep(self: &Arc<Self>) -> usize {
        let now = Instant::now();
        let (expired, shrunk) = {
            let mut state = self.state.lock();
            if state.is_shutting_down() {
                return 0;
            }
            let expired = state.take_expired(now);
            let timeout = state.config.timeout;
            let mut shrunk = Vec::new();
            while state.counted_open() > state.config.min
                && state
                    .idle
                    .first()
                    .is_some_and(|entry| entry.meta.is_idle_expired(timeout, now))
            {
                let entry = state.idle.remove(0);
                state.forget(&entry.meta);
                shrunk.push(entry);
            }
            (expired, shrunk)
        };

        let closed = expired.len() + shrunk.len();
        if closed > 0 {
            self.metrics.lock().connections_shrunk += shrunk.len() as u64;
            tracing::debug!(
                expired = expired.len(),
                idle_timeout = shrunk.len(),
                "pool sweep closing connections"
            );
            self.notify();
        }
        for entry in expired.into_iter().chain(shrunk) {
            self.close_entry(entry).await;
        }
        self.replenish();
        closed
    }

    fn publish_timers(&self, config: &PoolConfig) {
        self.timers.send_replace(TimerSettings {
            interval: config.sweep_interval(),
            closed: false,
        });
    }

    async fn apply_reconfigure(self: &Arc<Self>, request: &Reconfigure) -> Result<(), PoolError> {
        if request.changes_sizing() {
            let excess = {
                let mut state = self.state.lock();
                let min = request.min.unwrap_or(state.config.min);
                let max = request.max.unwrap_or(state.config.max);
                validate_sizing(min, max)?;
                state.config.min = min;
                state.config.max = max;
                if let Some(increment) = request.increment {
                    state.config.increment = increment.max(1);
                }

                let mut excess = Vec::new();
                while state.counted_open() > max && !state.idle.is_empty() {
                    let entry = state.idle.remove(0);
                    state.forget(&entry.meta);
                    excess.push(entry);
                }
                tracing::info!(
                    min = min,
                    max = max,
                    increment = state.config.increment,
                    "pool resized"
                );
                excess
            };
            self.notify();
            for entry in excess {
                self.close_entry(entry).await;
            }
            if let Err(e) = self.fill_to_min().await {
                tracing::warn!(error = %e, "could not grow pool to new min");
            }
        }

        let mut state = self.state.lock();
        if let Some(timeout) = request.timeout {
            state.config.timeout = timeout;
        }
        if let Some(lifetime) = request.max_lifetime {
            state.config.max_lifetime = lifetime;
        }
        if let Some(interval) = request.ping_interval {
            state.config.ping_interval = interval;
        }
        if let Some(timeout) = request.ping_timeout {
            validate_ping_timeout(timeout)?;
            state.config.ping_timeout = timeout;
        }
        if let Some(mode) = request.get_mode {
            state.config.get_mode = mode;
        }
        if let Some(timeout) = request.wait_timeout {
            state.config.wait_timeout = timeout;
        }
        Ok(())
    }
}

/// Background task running [`Pool::sweep`] on the configured interval.
///
/// Exits when the pool is closed or dropped.
fn spawn_housekeeper(inner: &Arc<PoolInner>, mut settings: watch::Receiver<TimerSettings>) {
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        loop {
            let current = *settings.borrow_and_update();
            if current.closed {
                break;
            }
            match current.interval {
                Some(interval) => {
                    tokio::select! {
                        () = tokio::time::sleep(interval) => {
                            let Some(inner) = weak.upgrade() else {
                                break;
                            };
                            inner.sweep().await;
                        }
                        changed = settings.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                None => {
                    if settings.changed().await.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::trace!("pool housekeeper stopped");
    });
}

impl Pool {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Acquire a connection without a tag.
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        self.acquire_with(AcquireOptions::default()).await
    }

    /// Acquire a connection.
    ///
    /// Picks the most recently released idle connection that satisfies the
    /// request, grows the pool if it is below `max`, and otherwise follows
    /// the get mode. Every connection gets the quick transport check before
    /// it is handed out, and idle ones are also pinged once `ping_interval`
    /// has passed; unhealthy ones are closed and the search continues.
    pub async fn acquire_with(&self, options: AcquireOptions) -> Result<PooledConnection, PoolError> {
        tracing::trace!(tag = ?options.tag, "acquiring connection from pool");
        let result = self.inner.acquire(&options).await;

        let mut metrics = self.inner.metrics.lock();
        match &result {
            Ok(conn) => {
                metrics.checkouts_successful += 1;
                tracing::trace!(connection_id = conn.id(), "connection acquired");
            }
            Err(e) => {
                metrics.checkouts_failed += 1;
                tracing::debug!(error = %e, "acquire failed");
            }
        }
        result
    }

    /// Return a connection to the pool.
    ///
    /// A connection from another pool is rejected with
    /// [`PoolError::NotBusy`] and goes back to its own pool.
    pub fn release(&self, conn: PooledConnection) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&self.inner, &conn.pool) {
            return Err(PoolError::NotBusy { id: conn.id() });
        }
        conn.release()
    }

    /// Return a connection to the pool under a new tag.
    pub fn release_with_tag(&self, conn: PooledConnection, tag: Tag) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&self.inner, &conn.pool) {
            return Err(PoolError::NotBusy { id: conn.id() });
        }
        conn.release_with_tag(tag)
    }

    /// Close a connection instead of returning it to the pool.
    pub async fn drop_connection(&self, conn: PooledConnection) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&self.inner, &conn.pool) {
            return Err(PoolError::NotBusy { id: conn.id() });
        }
        conn.discard().await;
        Ok(())
    }

    /// Change pool attributes while the pool keeps serving.
    ///
    /// `min`, `max` and `increment` are applied first and together; the pool
    /// then closes surplus idle connections or opens connections up to the
    /// new `min`. The remaining attributes are applied one at a time; if one
    /// is rejected, the ones before it stay applied.
    pub async fn reconfigure(&self, request: Reconfigure) -> Result<(), PoolError> {
        let _admin = self.inner.admin.lock().await;
        {
            let mut state = self.inner.state.lock();
            if state.is_shutting_down() {
                return Err(PoolError::PoolClosed);
            }
            state.lifecycle = PoolLifecycle::Reconfiguring;
        }

        let result = self.inner.apply_reconfigure(&request).await;

        let config = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == PoolLifecycle::Reconfiguring {
                state.lifecycle = PoolLifecycle::Active;
            }
            state.config.clone()
        };
        self.inner.publish_timers(&config);
        self.inner.notify();
        self.inner.replenish();
        result
    }

    /// Close the pool.
    ///
    /// A graceful close waits until every busy connection is released. A
    /// forced close returns at once: connections still checked out stop
    /// being counted and their sessions are aborted through
    /// [`Connection::abort_handle`]. Sessions without an abort handle are
    /// closed when their holder releases them. Waiting acquires fail with
    /// [`PoolError::PoolClosed`] either way.
    pub async fn close(&self, force: bool) -> Result<(), PoolError> {
        let _admin = self.inner.admin.lock().await;
        {
            let mut state = self.inner.state.lock();
            if state.is_shutting_down() {
                return Err(PoolError::PoolClosed);
            }
            state.lifecycle = PoolLifecycle::Closing;
        }
        self.inner.notify();
        tracing::info!(force = force, "closing connection pool");

        if !force {
            loop {
                let notified = self.inner.available.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                {
                    let state = self.inner.state.lock();
                    if state.busy == 0 && state.pending == 0 {
                        break;
                    }
                }
                notified.await;
            }
        }

        let (idle, revoked) = {
            let mut state = self.inner.state.lock();
            state.lifecycle = PoolLifecycle::Closed;
            let idle = std::mem::take(&mut state.idle);
            for entry in &idle {
                state.forget(&entry.meta);
            }
            let revoked = if force { state.revoke_busy() } else { Vec::new() };
            (idle, revoked)
        };
        if !revoked.is_empty() {
            tracing::info!(busy = revoked.len(), "aborting checked-out connections");
        }
        for (id, abort) in revoked {
            match abort {
                Some(handle) => handle.abort(),
                None => tracing::debug!(
                    connection_id = id,
                    "connection has no abort handle, closing on release"
                ),
            }
        }
        for entry in idle {
            self.inner.close_entry(entry).await;
        }

        self.inner.timers.send_replace(TimerSettings {
            interval: None,
            closed: true,
        });
        let alias = self.inner.alias.lock().take();
        if let Some((registry, name)) = alias {
            registry.remove(&name);
        }
        self.inner.notify();

        tracing::info!("connection pool closed");
        Ok(())
    }

    /// Run one housekeeping pass: close idle connections past the idle
    /// timeout or the maximum lifetime, then replenish to `min`.
    ///
    /// Returns the number of connections closed.
    pub async fn sweep(&self) -> usize {
        self.inner.sweep().await
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            opened: state.opened,
            busy: state.busy,
            idle: len_u32(state.idle.len()),
            pending: state.pending,
            min: state.config.min,
            max: state.config.max,
            lifecycle: state.lifecycle,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let metrics = self.inner.metrics.lock();
        PoolMetrics {
            connections_created: metrics.connections_created,
            connections_closed: metrics.connections_closed,
            connections_shrunk: metrics.connections_shrunk,
            checkouts_successful: metrics.checkouts_successful,
            checkouts_failed: metrics.checkouts_failed,
            health_checks_performed: metrics.health_checks_performed,
            health_checks_failed: metrics.health_checks_failed,
            callbacks_invoked: metrics.callbacks_invoked,
            callbacks_failed: metrics.callbacks_failed,
            waits: metrics.waits,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Current configuration, including reconfigured values.
    #[must_use]
    pub fn config(&self) -> PoolConfig {
        self.inner.state.lock().config.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> PoolLifecycle {
        self.inner.state.lock().lifecycle
    }

    /// Check if the pool is closing or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().is_shutting_down()
    }

    /// Alias the pool is registered under.
    #[must_use]
    pub fn alias(&self) -> Option<String> {
        self.inner
            .alias
            .lock()
            .as_ref()
            .map(|(_, name)| name.clone())
    }

    pub(crate) fn set_alias(&self, registry: &PoolRegistry, name: &str) {
        *self.inner.alias.lock() = Some((registry.clone(), name.to_string()));
    }

    pub(crate) fn same_pool(&self, other: &Pool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Pool status information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// Open connections, idle and busy.
    pub opened: u32,
    /// Connections checked out.
    pub busy: u32,
    /// Connections ready for reuse.
    pub idle: u32,
    /// Connections being opened.
    pub pending: u32,
    /// Configured minimum.
    pub min: u32,
    /// Configured maximum.
    pub max: u32,
    /// Lifecycle state.
    pub lifecycle: PoolLifecycle,
}

impl PoolStatus {
    /// Calculate pool utilization as a percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (f64::from(self.busy) / f64::from(self.max)) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.opened >= self.max && self.idle == 0
    }
}

/// Pool metrics for monitoring.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created.
    pub connections_created: u64,
    /// Total connections closed.
    pub connections_closed: u64,
    /// Connections closed by the idle timeout.
    pub connections_shrunk: u64,
    /// Total successful checkouts.
    pub checkouts_successful: u64,
    /// Total failed checkouts.
    pub checkouts_failed: u64,
    /// Total health checks performed.
    pub health_checks_performed: u64,
    /// Total health check failures.
    pub health_checks_failed: u64,
    /// Session callback invocations.
    pub callbacks_invoked: u64,
    /// Session callback failures.
    pub callbacks_failed: u64,
    /// Acquires that had to wait.
    pub waits: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate.
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate health check success rate.
    #[must_use]
    pub fn health_check_success_rate(&self) -> f64 {
        if self.health_checks_performed == 0 {
            return 1.0;
        }
        let successful = self.health_checks_performed - self.health_checks_failed;
        successful as f64 / self.health_checks_performed as f64
    }
}

/// Builder for creating a connection pool.
#[derive(Default)]
pub struct PoolBuilder {
    descriptor: Option<ConnectionDescriptor>,
    credentials: Option<Credentials>,
    factory: Option<Arc<dyn ConnectionFactory>>,
    connectors: Option<ConnectorRegistry>,
    config: PoolConfig,
    alias: Option<(PoolRegistry, String)>,
}

impl PoolBuilder {
    /// Create a new pool builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set where connections go.
    #[must_use]
    pub fn descriptor(mut self, descriptor: ConnectionDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// Set the pool credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Open connections with `factory`.
    #[must_use]
    pub fn factory(mut self, factory: impl ConnectionFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Open connections with a shared factory.
    #[must_use]
    pub fn shared_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Pick the factory from `registry` by the descriptor's protocol.
    ///
    /// An explicitly set factory takes precedence.
    #[must_use]
    pub fn connectors(mut self, registry: ConnectorRegistry) -> Self {
        self.connectors = Some(registry);
        self
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min(mut self, count: u32) -> Self {
        self.config.min = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max(mut self, count: u32) -> Self {
        self.config.max = count;
        self
    }

    /// Set the growth increment.
    #[must_use]
    pub fn increment(mut self, count: u32) -> Self {
        self.config.increment = count;
        self
    }

    /// Set the get mode.
    #[must_use]
    pub fn get_mode(mut self, mode: GetMode) -> Self {
        self.config.get_mode = mode;
        self
    }

    /// Register the pool in `registry` under `name` once it is built.
    #[must_use]
    pub fn alias(mut self, registry: &PoolRegistry, name: impl Into<String>) -> Self {
        self.alias = Some((registry.clone(), name.into()));
        self
    }

    /// Build the pool, opening `min` connections unless the pool is
    /// zero-start.
    pub async fn build(self) -> Result<Pool, PoolError> {
        let mut config = self.config;
        config.validate()?;
        config.increment = config.effective_increment();

        let mut descriptor = self
            .descriptor
            .ok_or_else(|| PoolError::configuration("descriptor", "must be set"))?;
        config.apply_to(&mut descriptor);
        descriptor.validate()?;

        let factory = match (self.factory, self.connectors) {
            (Some(factory), _) => factory,
            (None, Some(registry)) => registry.get(&descriptor.protocol)?,
            (None, None) => {
                return Err(PoolError::configuration(
                    "factory",
                    "no connection factory or connector registry set",
                ));
            }
        };

        let credentials = match self.credentials {
            Some(credentials) => credentials,
            None if config.external_auth => Credentials::external(),
            None => {
                return Err(PoolError::configuration(
                    "credentials",
                    "required unless external authentication is enabled",
                ));
            }
        };

        if let Some((registry, name)) = &self.alias {
            if registry.contains(name) {
                return Err(PoolError::AliasExists(name.clone()));
            }
        }

        let zero_start = config.is_zero_start(&descriptor);
        let (timers, settings) = watch::channel(TimerSettings {
            interval: config.sweep_interval(),
            closed: false,
        });
        let (min, max, increment) = (config.min, config.max, config.increment);
        let homogeneous = config.homogeneous;

        let inner = Arc::new(PoolInner {
            descriptor,
            credentials,
            factory,
            homogeneous,
            zero_start,
            state: Mutex::new(PoolState::new(config)),
            available: Notify::new(),
            admin: tokio::sync::Mutex::new(()),
            next_connection_id: AtomicU64::new(1),
            created_at: Instant::now(),
            metrics: Mutex::new(PoolMetricsInner::default()),
            timers,
            alias: Mutex::new(None),
        });

        if let Err(e) = inner.fill_to_min().await {
            tracing::warn!(error = %e, "failed to open initial pool connections");
            let idle = {
                let mut state = inner.state.lock();
                state.lifecycle = PoolLifecycle::Closed;
                let idle = std::mem::take(&mut state.idle);
                state.opened = state.opened.saturating_sub(len_u32(idle.len()));
                idle
            };
            for entry in idle {
                inner.close_entry(entry).await;
            }
            return Err(e);
        }

        inner.state.lock().lifecycle = PoolLifecycle::Active;
        spawn_housekeeper(&inner, settings);

        let pool = Pool { inner };
        if let Some((registry, name)) = self.alias {
            if let Err(e) = registry.register(&name, &pool) {
                pool.close(true).await.ok();
                return Err(e);
            }
        }

        tracing::info!(
            min = min,
            max = max,
            increment = increment,
            zero_start = zero_start,
            "connection pool created"
        );

        Ok(pool)
    }
}

/// A connection checked out from the pool.
///
/// Dereferences to the underlying [`Connection`]. Dropping it returns the
/// connection to the pool, like [`PooledConnection::release`].
pub struct PooledConnection {
    entry: Option<PoolEntry>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    fn new(entry: PoolEntry, pool: &Arc<PoolInner>) -> Self {
        Self {
            entry: Some(entry),
            pool: Arc::clone(pool),
        }
    }

    fn entry(&self) -> &PoolEntry {
        match &self.entry {
            Some(entry) => entry,
            None => unreachable!("pooled connection used after release"),
        }
    }

    fn entry_mut(&mut self) -> &mut PoolEntry {
        match &mut self.entry {
            Some(entry) => entry,
            None => unreachable!("pooled connection used after release"),
        }
    }

    fn into_entry(mut self) -> Option<PoolEntry> {
        self.entry.take()
    }

    /// Pool-assigned connection id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.entry().meta.id
    }

    /// Get the connection metadata.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.entry().meta
    }

    /// The session's current tag.
    #[must_use]
    pub fn tag(&self) -> &Tag {
        &self.entry().tag
    }

    /// Record a new session tag, kept when the connection is released.
    pub fn set_tag(&mut self, tag: Tag) {
        self.entry_mut().tag = tag;
    }

    /// Return the connection to the pool.
    pub fn release(self) -> Result<(), PoolError> {
        let pool = Arc::clone(&self.pool);
        match self.into_entry() {
            Some(entry) => pool.checkin(entry),
            None => Ok(()),
        }
    }

    /// Return the connection to the pool under a new tag.
    pub fn release_with_tag(mut self, tag: Tag) -> Result<(), PoolError> {
        self.set_tag(tag);
        self.release()
    }

    /// Close the connection instead of returning it to the pool.
    pub async fn discard(self) {
        let pool = Arc::clone(&self.pool);
        pool.discard(self).await;
    }

    /// Take the connection out of the pool.
    ///
    /// The pool stops counting it and replaces it if that leaves the pool
    /// below `min`. The caller becomes responsible for closing it.
    #[must_use]
    pub fn detach(self) -> Option<Box<dyn Connection>> {
        let pool = Arc::clone(&self.pool);
        let entry = self.into_entry()?;
        pool.detach(&entry);
        Some(entry.conn)
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        &*self.entry().conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.entry_mut().conn
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entry {
            Some(entry) => f
                .debug_struct("PooledConnection")
                .field("id", &entry.meta.id)
                .field("session_id", &entry.meta.session_id)
                .field("tag", &entry.tag)
                .finish(),
            None => f.write_str("PooledConnection(released)"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            tracing::trace!(connection_id = entry.meta.id, "returning dropped connection to pool");
            if let Err(e) = self.pool.checkin(entry) {
                tracing::debug!(error = %e, "failed to return connection to pool");
            }
        }
    }
}
