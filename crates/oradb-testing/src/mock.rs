//! Scriptable in-memory connector.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use oradb_client::{
    Connection, ConnectionDescriptor, ConnectionFactory, Credentials, Error, Result, ServerVersion,
    SessionAbort, Statement,
};
use oradb_types::{BindValue, Capabilities};
use parking_lot::Mutex;

/// Failure injected into the next `open` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The listener refuses the connection.
    Refuse,
    /// The server rejects the credentials.
    Reject,
}

/// How a session answers pings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PingBehavior {
    /// Answer immediately.
    #[default]
    Ok,
    /// Fail as if the session was terminated by an administrator.
    Fail,
    /// Never answer.
    Hang,
}

/// A statement execution recorded by a mock session.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    /// Session that executed the statement.
    pub session_id: u64,
    /// Statement text.
    pub sql: String,
    /// First bound value of each position.
    pub binds: Vec<BindValue>,
}

/// Test-side handle on one mock session.
#[derive(Debug)]
pub struct SessionControl {
    id: u64,
    user: Option<String>,
    open: AtomicBool,
    /// Set once the client has closed or aborted the session.
    finished: AtomicBool,
    ping: Mutex<PingBehavior>,
}

impl SessionControl {
    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// User the session was opened for.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Whether the transport is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Close the transport; the client notices without a round trip.
    pub fn kill(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Change how the session answers pings.
    pub fn set_ping(&self, behavior: PingBehavior) {
        *self.ping.lock() = behavior;
    }

    fn ping_behavior(&self) -> PingBehavior {
        *self.ping.lock()
    }

    /// Close the transport on the client's behalf, counting it once.
    fn finish(&self, state: &MockState) {
        self.kill();
        if !self.finished.swap(true, Ordering::SeqCst) {
            state.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Out-of-band shutdown for one mock session.
#[derive(Debug)]
struct MockAbort {
    control: Arc<SessionControl>,
    state: Arc<MockState>,
}

impl SessionAbort for MockAbort {
    fn abort(&self) {
        self.control.finish(&self.state);
        tracing::trace!(session_id = self.control.id, "mock session aborted");
    }
}

#[derive(Debug, Default)]
struct MockState {
    next_session: AtomicU64,
    opens: AtomicU64,
    closes: AtomicU64,
    pings: AtomicU64,
    failures: Mutex<VecDeque<MockFailure>>,
    open_delay: Mutex<Duration>,
    default_ping: Mutex<PingBehavior>,
    capabilities: Mutex<Capabilities>,
    sessions: Mutex<HashMap<u64, Arc<SessionControl>>>,
    executed: Mutex<Vec<ExecutedStatement>>,
    failing_sql: Mutex<Vec<String>>,
}

/// In-memory [`ConnectionFactory`] for tests.
///
/// Clones share state, so a test keeps one handle while the pool owns another.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// Create a connector whose sessions open instantly and answer pings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capabilities reported by new sessions.
    #[must_use]
    pub fn with_capabilities(self, capabilities: Capabilities) -> Self {
        *self.state.capabilities.lock() = capabilities;
        self
    }

    /// Make the next `open` fail.
    pub fn fail_next(&self, failure: MockFailure) {
        self.state.failures.lock().push_back(failure);
    }

    /// Make the next `count` opens fail.
    pub fn fail_next_n(&self, failure: MockFailure, count: usize) {
        let mut failures = self.state.failures.lock();
        failures.extend(std::iter::repeat_n(failure, count));
    }

    /// Delay every handshake by `delay`.
    pub fn set_open_delay(&self, delay: Duration) {
        *self.state.open_delay.lock() = delay;
    }

    /// Ping behavior of sessions opened from now on.
    pub fn set_default_ping(&self, behavior: PingBehavior) {
        *self.state.default_ping.lock() = behavior;
    }

    /// Fail every execution whose SQL contains `fragment`.
    pub fn fail_statements_containing(&self, fragment: impl Into<String>) {
        self.state.failing_sql.lock().push(fragment.into());
    }

    /// Handle on a session by id.
    #[must_use]
    pub fn session(&self, id: u64) -> Option<Arc<SessionControl>> {
        self.state.sessions.lock().get(&id).cloned()
    }

    /// Handles on every session opened so far, in id order.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<SessionControl>> {
        let mut sessions: Vec<_> = self.state.sessions.lock().values().cloned().collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    /// Set the ping behavior of every session opened so far.
    pub fn set_ping_all(&self, behavior: PingBehavior) {
        for session in self.state.sessions.lock().values() {
            session.set_ping(behavior);
        }
    }

    /// Successful opens.
    #[must_use]
    pub fn opened(&self) -> u64 {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Sessions closed by the client.
    #[must_use]
    pub fn closed(&self) -> u64 {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet closed by the client.
    #[must_use]
    pub fn live(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }

    /// Pings answered.
    #[must_use]
    pub fn pings(&self) -> u64 {
        self.state.pings.load(Ordering::SeqCst)
    }

    /// Statements executed so far.
    #[must_use]
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state.executed.lock().clone()
    }
}

#[async_trait]
impl ConnectionFactory for MockConnector {
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>> {
        let delay = *self.state.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = self.state.failures.lock().pop_front();
        match failure {
            Some(MockFailure::Refuse) => {
                return Err(Error::connect_failed(format!(
                    "{}: connection refused",
                    descriptor.address()
                )));
            }
            Some(MockFailure::Reject) => {
                return Err(Error::AuthFailed(
                    "ORA-01017: invalid credential or not authorized".into(),
                ));
            }
            None => {}
        }

        let id = self.state.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let control = Arc::new(SessionControl {
            id,
            user: credentials.session_user().map(str::to_string),
            open: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            ping: Mutex::new(*self.state.default_ping.lock()),
        });
        self.state.sessions.lock().insert(id, control.clone());
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(session_id = id, "mock session opened");

        Ok(Box::new(MockConnection {
            control,
            state: self.state.clone(),
            capabilities: *self.state.capabilities.lock(),
            closed: false,
        }))
    }
}

/// A session opened by [`MockConnector`].
#[derive(Debug)]
pub struct MockConnection {
    control: Arc<SessionControl>,
    state: Arc<MockState>,
    capabilities: Capabilities,
    closed: bool,
}

#[async_trait]
impl Connection for MockConnection {
    fn session_id(&self) -> u64 {
        self.control.id
    }

    fn is_open(&self) -> bool {
        !self.closed && self.control.is_open()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn server_version(&self) -> ServerVersion {
        if self.capabilities.supports_bool {
            ServerVersion::new(23, 4, 0, 0, 0)
        } else {
            ServerVersion::new(19, 3, 0, 0, 0)
        }
    }

    async fn ping(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Closed);
        }
        match self.control.ping_behavior() {
            PingBehavior::Ok => {
                self.state.pings.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            PingBehavior::Fail => Err(Error::Server {
                code: 3113,
                message: "end-of-file on communication channel".into(),
            }),
            PingBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn execute(&mut self, statement: &mut Statement) -> Result<u64> {
        if !self.is_open() {
            return Err(Error::Closed);
        }

        let binds: Vec<BindValue> = statement
            .arena()
            .variables()
            .map(|var| var.values().first().cloned().unwrap_or(BindValue::Null))
            .collect();
        self.state.executed.lock().push(ExecutedStatement {
            session_id: self.control.id,
            sql: statement.sql().to_string(),
            binds,
        });

        let fails = self
            .state
            .failing_sql
            .lock()
            .iter()
            .any(|fragment| statement.sql().contains(fragment.as_str()));
        if fails {
            return Err(Error::Server {
                code: 6550,
                message: "PL/SQL: statement ignored".into(),
            });
        }
        Ok(u64::from(statement.arena().num_rows()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.control.finish(&self.state);
        tracing::trace!(session_id = self.control.id, "mock session closed");
        Ok(())
    }

    fn abort_handle(&self) -> Option<Arc<dyn SessionAbort>> {
        Some(Arc::new(MockAbort {
            control: self.control.clone(),
            state: self.state.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::new("mockhost", "svc")
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let connector = MockConnector::new();
        connector.fail_next(MockFailure::Refuse);
        connector.fail_next(MockFailure::Reject);
        let creds = Credentials::password("u", "p");

        let err = connector.open(&descriptor(), &creds).await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { .. }));
        let err = connector.open(&descriptor(), &creds).await.unwrap_err();
        assert!(matches!(err, Error::AuthFailed(_)));

        let conn = connector.open(&descriptor(), &creds).await.unwrap();
        assert_eq!(conn.session_id(), 1);
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.session(1).unwrap().user(), Some("u"));
    }

    #[tokio::test]
    async fn test_kill_and_ping() {
        let connector = MockConnector::new();
        let mut conn = connector
            .open(&descriptor(), &Credentials::external())
            .await
            .unwrap();
        conn.ping().await.unwrap();
        assert_eq!(connector.pings(), 1);

        let session = connector.session(conn.session_id()).unwrap();
        session.set_ping(PingBehavior::Fail);
        assert!(conn.is_open());
        assert!(conn.ping().await.is_err());

        session.kill();
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_close_counts_once() {
        let connector = MockConnector::new();
        let mut conn = connector
            .open(&descriptor(), &Credentials::external())
            .await
            .unwrap();
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(connector.closed(), 1);
        assert_eq!(connector.live(), 0);
    }

    #[tokio::test]
    async fn test_abort_closes_held_session() {
        let connector = MockConnector::new();
        let mut conn = connector
            .open(&descriptor(), &Credentials::external())
            .await
            .unwrap();
        let handle = conn.abort_handle().unwrap();

        handle.abort();
        handle.abort();
        assert!(!conn.is_open());
        assert!(matches!(conn.ping().await, Err(Error::Closed)));
        assert_eq!(connector.closed(), 1);
        assert_eq!(connector.live(), 0);

        conn.close().await.unwrap();
        assert_eq!(connector.closed(), 1);
    }

    #[tokio::test]
    async fn test_execute_records_binds() {
        let connector = MockConnector::new();
        connector.fail_statements_containing("broken_proc");
        let mut conn = connector
            .open(&descriptor(), &Credentials::external())
            .await
            .unwrap();

        let mut stmt = Statement::new("begin ok_proc(:1); end;", conn.capabilities());
        stmt.bind(vec![BindValue::from("a=1")]).unwrap();
        assert_eq!(conn.execute(&mut stmt).await.unwrap(), 1);

        let mut bad = Statement::new("begin broken_proc; end;", conn.capabilities());
        assert!(conn.execute(&mut bad).await.is_err());

        let executed = connector.executed();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0].binds, vec![BindValue::from("a=1")]);
    }
}
