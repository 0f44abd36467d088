use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{Endpoint, QueryScope};
use crate::connector::Connector;
use crate::error::SqlDispatchError;

/// Everything a worker thread writes before flipping the readiness flag.
///
/// The connection travels inside the callable for its whole life: checked out
/// of the pool at dispatch, consumed by the worker, put back here, and finally
/// taken out at recovery. Type-erased so the caller-facing handle is generic
/// only over the result type.
struct Slots<R> {
    conn: Option<Box<dyn Any + Send>>,
    result: Option<R>,
    error: Option<SqlDispatchError>,
}

pub(crate) struct CallableInner<R> {
    kind: &'static str,
    pool_id: u64,
    /// False only for callables that never went through checkout (dispatch
    /// after shutdown); recovery must then leave the pool counters alone.
    ledgered: bool,
    ready: AtomicBool,
    slots: Mutex<Slots<R>>,
}

impl<R> CallableInner<R> {
    pub(crate) fn new(
        kind: &'static str,
        pool_id: u64,
        ledgered: bool,
        conn: Option<Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            kind,
            pool_id,
            ledgered,
            ready: AtomicBool::new(false),
            slots: Mutex::new(Slots {
                conn,
                result: None,
                error: None,
            }),
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Slots<R>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_conn(&self) -> Option<Box<dyn Any + Send>> {
        self.lock_slots().conn.take()
    }

    /// Store the final state and flip the readiness flag.
    ///
    /// The flag is stored `Release`-last, after the slot guard is dropped, so
    /// a poller that observes `true` with `Acquire` can never see a torn
    /// result.
    pub(crate) fn finish(
        &self,
        conn: Option<Box<dyn Any + Send>>,
        result: Option<R>,
        error: Option<SqlDispatchError>,
    ) {
        {
            let mut slots = self.lock_slots();
            slots.conn = conn;
            slots.result = result;
            slots.error = error;
        }
        self.ready.store(true, Ordering::Release);
    }

    /// Complete without ever running: the connection (if any) stays in its
    /// slot so recovery can still reclaim it.
    pub(crate) fn finish_with_error(&self, error: SqlDispatchError) {
        self.lock_slots().error = Some(error);
        self.ready.store(true, Ordering::Release);
    }
}

/// Handle to one asynchronous unit of database work.
///
/// Returned synchronously by [`DispatchPool::dispatch`]. The owning loop polls
/// [`is_ready`] on its cooperative tick and, once it observes `true`, hands
/// the callable to [`DispatchPool::recover`] exactly once. There is no
/// blocking wait and no cancellation; dropping an unrecovered handle leaks a
/// connection slot and an outstanding-count slot for the life of the pool.
///
/// [`DispatchPool::dispatch`]: crate::pool::DispatchPool::dispatch
/// [`DispatchPool::recover`]: crate::pool::DispatchPool::recover
/// [`is_ready`]: Callable::is_ready
#[must_use = "a dispatched callable must be polled and recovered exactly once"]
pub struct Callable<R> {
    inner: Arc<CallableInner<R>>,
}

impl<R> Callable<R> {
    pub(crate) fn new(inner: Arc<CallableInner<R>>) -> Self {
        Self { inner }
    }

    /// Whether the worker has finished with this callable.
    ///
    /// Monotonic: once `true`, stays `true`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Label of the operation this callable runs, as given to dispatch.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.inner.kind
    }

    pub(crate) fn pool_id(&self) -> u64 {
        self.inner.pool_id
    }

    pub(crate) fn ledgered(&self) -> bool {
        self.inner.ledgered
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Option<Box<dyn Any + Send>>,
        Option<R>,
        Option<SqlDispatchError>,
    ) {
        let mut slots = self.inner.lock_slots();
        (slots.conn.take(), slots.result.take(), slots.error.take())
    }
}

impl<R> fmt::Debug for Callable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("kind", &self.inner.kind)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Why [`DispatchPool::recover`] could not produce a result.
///
/// `NotReady` and `WrongPool` hand the callable back unchanged — the pool's
/// counters are untouched and the caller can keep polling. `Failed` means the
/// callable really was recovered: its connection was evicted and the error it
/// carried is surfaced here.
///
/// [`DispatchPool::recover`]: crate::pool::DispatchPool::recover
#[derive(Debug)]
pub enum RecoverError<R> {
    /// Recovery was attempted before the readiness flag was observed.
    NotReady(Callable<R>),
    /// The callable was dispatched by a different pool.
    WrongPool(Callable<R>),
    /// The callable finished with an error.
    Failed(SqlDispatchError),
}

impl<R> RecoverError<R> {
    /// Get the handed-back callable, if this error kind carries one.
    #[must_use]
    pub fn into_callable(self) -> Option<Callable<R>> {
        match self {
            Self::NotReady(callable) | Self::WrongPool(callable) => Some(callable),
            Self::Failed(_) => None,
        }
    }
}

impl<R> fmt::Display for RecoverError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady(callable) => write!(
                f,
                "callable '{}' recovered before it was ready",
                callable.kind()
            ),
            Self::WrongPool(callable) => write!(
                f,
                "callable '{}' was dispatched by a different pool",
                callable.kind()
            ),
            Self::Failed(err) => write!(f, "{err}"),
        }
    }
}

impl<R: fmt::Debug> std::error::Error for RecoverError<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(err) => Some(err),
            Self::NotReady(_) | Self::WrongPool(_) => None,
        }
    }
}

/// Drive one callable through its lifecycle on the current (worker) thread.
pub(crate) fn run<C, R, F>(
    inner: &CallableInner<R>,
    connector: &C,
    endpoint: &Endpoint,
    scope: QueryScope,
    query: F,
) where
    C: Connector,
    R: Send + 'static,
    F: FnOnce(&mut C::Conn, &QueryScope) -> Result<R, SqlDispatchError>,
{
    let mut conn: Option<C::Conn> = inner
        .take_conn()
        .and_then(|boxed| boxed.downcast::<C::Conn>().ok())
        .map(|live| *live);
    let mut error = None;

    // Initializing: fresh connect on a pool miss, liveness check on reuse.
    match conn {
        None => match connector.connect(endpoint) {
            Ok(fresh) => conn = Some(fresh),
            Err(err) => error = Some(err),
        },
        Some(ref mut live) => {
            if let Err(err) = connector.ping(live) {
                error = Some(err);
            }
        }
    }

    // Executing: exactly one call into the query function.
    let mut result = None;
    if error.is_none()
        && let Some(live) = conn.as_mut()
    {
        match query(live, &scope) {
            Ok(value) => result = Some(value),
            Err(err) => error = Some(err),
        }
    }

    // Closing: per-thread driver state.
    connector.thread_cleanup();

    inner.finish(
        conn.map(|live| Box::new(live) as Box<dyn Any + Send>),
        result,
        error,
    );
}
