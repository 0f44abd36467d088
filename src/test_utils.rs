//! Scriptable connector and polling helpers for tests.
//!
//! Enabled by the `test-utils` feature; used by this crate's own integration
//! tests and available to downstream test code.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::callable::Callable;
use crate::config::Endpoint;
use crate::connector::Connector;
use crate::error::SqlDispatchError;

/// Connection handed out by [`StubConnector`].
#[derive(Debug, PartialEq, Eq)]
pub struct StubConn {
    /// 1-based sequence number of the connect call that produced it.
    pub id: usize,
}

#[derive(Debug, Default)]
struct StubState {
    connects: AtomicUsize,
    pings: AtomicUsize,
    closes: AtomicUsize,
    shutdowns: AtomicUsize,
    fail_connect: AtomicBool,
    fail_ping: AtomicBool,
}

/// In-memory connector that counts driver calls and can be scripted to fail.
///
/// Clones share state, so a test can keep one clone for inspection after
/// moving the other into a pool.
#[derive(Debug, Clone, Default)]
pub struct StubConnector {
    state: Arc<StubState>,
}

impl StubConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ping(&self, fail: bool) {
        self.state.fail_ping.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }
}

impl Connector for StubConnector {
    type Conn = StubConn;

    fn connect(&self, _endpoint: &Endpoint) -> Result<Self::Conn, SqlDispatchError> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(SqlDispatchError::ConnectionError(
                "stub connect refused".into(),
            ));
        }
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StubConn { id })
    }

    fn ping(&self, _conn: &mut Self::Conn) -> Result<(), SqlDispatchError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_ping.load(Ordering::SeqCst) {
            return Err(SqlDispatchError::ConnectionError("stub ping refused".into()));
        }
        Ok(())
    }

    fn close(&self, conn: Self::Conn) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        drop(conn);
    }

    fn on_shutdown(&self) {
        self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Endpoint the stub connector accepts without caring about its contents.
#[must_use]
pub fn stub_endpoint() -> Endpoint {
    Endpoint::new("localhost", "stub")
}

/// Spin-poll a callable until it is ready or the timeout passes.
///
/// Returns `false` on timeout. Tests poll instead of blocking because the
/// crate deliberately offers no blocking wait.
pub fn wait_ready<R>(callable: &Callable<R>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !callable.is_ready() {
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
    true
}
