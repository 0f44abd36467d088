mod ledger;

pub use ledger::{PoolStats, PoolStatus};

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::callable::{self, Callable, CallableInner, RecoverError};
use crate::config::{Endpoint, PoolOptions, QueryScope};
use crate::connector::Connector;
use crate::error::SqlDispatchError;
use crate::worker::{Job, WorkerSet};

use ledger::Ledger;

// Tags every callable with the pool that dispatched it, so recovery can
// detect a handle from somewhere else.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Connection pool plus dispatcher: the public entry point of this crate.
///
/// Construct one explicitly per process (or per tenant) and pass it by
/// reference to every call site. Dispatching hands an operation to a worker
/// thread and returns a [`Callable`] handle synchronously; the calling loop
/// polls the handle and recovers it exactly once, which returns or evicts the
/// connection the operation used.
///
/// # Examples
/// ```rust,no_run
/// use sql_dispatch::prelude::*;
///
/// # fn demo() -> Result<(), SqlDispatchError> {
/// let options = PoolOptions::builder(Endpoint::new("", "stats.db"))
///     .tenant_id(1)
///     .finish();
/// let pool = DispatchPool::new(options, SqliteConnector::new())?;
///
/// let callable = pool.dispatch("admin_count", |conn, scope| {
///     let count = conn.query_row(
///         "SELECT COUNT(*) FROM admins WHERE botid = ?1",
///         [scope.tenant_id],
///         |row| row.get::<_, u32>(0),
///     )?;
///     Ok(count)
/// });
///
/// // Poll from the main loop's tick instead of blocking.
/// while !callable.is_ready() {
///     std::thread::sleep(std::time::Duration::from_millis(10));
/// }
/// match pool.recover(callable) {
///     Ok(count) => println!("{count} admins"),
///     Err(err) => eprintln!("admin count failed: {err}"),
/// }
/// # Ok(()) }
/// ```
pub struct DispatchPool<C: Connector> {
    connector: Arc<C>,
    endpoint: Arc<Endpoint>,
    scope: QueryScope,
    ledger: Ledger<C::Conn>,
    workers: WorkerSet,
    pool_id: u64,
    shut_down: AtomicBool,
}

impl<C: Connector> DispatchPool<C> {
    /// Build a pool and eagerly establish its first connection.
    ///
    /// The eager connect doubles as a smoke test: a bad endpoint surfaces
    /// here instead of on the first dispatched operation.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` for unusable options, or the
    /// connector's error if the first connection cannot be established.
    pub fn new(options: PoolOptions, connector: C) -> Result<Self, SqlDispatchError> {
        options.validate()?;
        let connector = Arc::new(connector);

        tracing::info!(database = %options.endpoint.database, "connecting to database server");
        let first = connector.connect(&options.endpoint)?;

        let ledger = Ledger::new(options.idle_capacity);
        ledger.seed(first);

        let workers = WorkerSet::new(
            options.max_workers,
            options.spawn_retries,
            options.spawn_backoff(),
        );
        let scope = options.scope();

        Ok(Self {
            connector,
            endpoint: Arc::new(options.endpoint),
            scope,
            ledger,
            workers,
            pool_id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Dispatch one database operation and return its handle immediately.
    ///
    /// Never blocks on network I/O: the cost is bounded by the pool lock and
    /// at most one worker-thread spawn (with one retried backoff). The query
    /// function runs on a worker thread with a connection taken from the idle
    /// queue, or a fresh one the callable establishes itself on a pool miss.
    ///
    /// The returned callable is always eventually ready — even when no worker
    /// thread could be spawned, in which case it carries
    /// `SqlDispatchError::ResourceError` and the operation never ran. The
    /// caller must recover every handle exactly once; a dropped handle leaks
    /// its connection slot for the life of the pool.
    pub fn dispatch<R, F>(&self, kind: &'static str, query: F) -> Callable<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut C::Conn, &QueryScope) -> Result<R, SqlDispatchError> + Send + 'static,
    {
        if self.shut_down.load(Ordering::Acquire) {
            let inner = Arc::new(CallableInner::new(kind, self.pool_id, false, None));
            inner.finish_with_error(SqlDispatchError::ProtocolMisuse(format!(
                "'{kind}' dispatched after shutdown"
            )));
            return Callable::new(inner);
        }

        let conn = self.ledger.checkout();
        let boxed_conn = conn.map(|live| Box::new(live) as Box<dyn Any + Send>);
        let inner = Arc::new(CallableInner::new(kind, self.pool_id, true, boxed_conn));

        let job_inner = Arc::clone(&inner);
        let connector = Arc::clone(&self.connector);
        let endpoint = Arc::clone(&self.endpoint);
        let scope = self.scope;
        let job: Job = Box::new(move || {
            callable::run(
                job_inner.as_ref(),
                connector.as_ref(),
                endpoint.as_ref(),
                scope,
                query,
            );
        });

        if let Err(err) = self.workers.submit(job) {
            // Degraded path: the operation never runs, but the callable still
            // becomes ready carrying the resource error, and its connection
            // (still in the slot) is reclaimed at recovery.
            tracing::warn!("completing '{kind}' without running it: {err}");
            inner.finish_with_error(err);
        }

        Callable::new(inner)
    }

    /// Recover a finished callable: surface its outcome and return or evict
    /// the connection it used.
    ///
    /// Must be called exactly once per dispatched handle, after polling
    /// [`Callable::is_ready`] to `true`. Calling it early, or with a handle
    /// from another pool, is detected and logged; the handle comes back
    /// unchanged inside the error and the pool counters are untouched.
    ///
    /// # Errors
    /// [`RecoverError::NotReady`] / [`RecoverError::WrongPool`] for protocol
    /// misuse, [`RecoverError::Failed`] when the callable finished with an
    /// error (its connection has been evicted).
    pub fn recover<R>(&self, callable: Callable<R>) -> Result<R, RecoverError<R>>
    where
        R: Send + 'static,
    {
        if callable.pool_id() != self.pool_id {
            tracing::warn!(
                "tried to recover callable '{}' dispatched by another pool",
                callable.kind()
            );
            return Err(RecoverError::WrongPool(callable));
        }
        if !callable.is_ready() {
            tracing::warn!(
                "tried to recover callable '{}' before it was ready",
                callable.kind()
            );
            return Err(RecoverError::NotReady(callable));
        }

        let kind = callable.kind();
        let ledgered = callable.ledgered();
        let (conn_boxed, result, error) = callable.into_parts();

        if let Some(err) = &error {
            tracing::warn!("error --- {err}");
        }

        if ledgered {
            let conn = conn_boxed
                .and_then(|boxed| boxed.downcast::<C::Conn>().ok())
                .map(|live| *live);
            // After shutdown the idle queue must stay empty, so a late
            // recovery always evicts.
            let evict = error.is_some() || self.shut_down.load(Ordering::Acquire);
            if let Some(evicted) = self.ledger.check_in(conn, evict) {
                self.connector.close(evicted);
            }
        }

        match (result, error) {
            (_, Some(err)) => Err(RecoverError::Failed(err)),
            (Some(value), None) => Ok(value),
            (None, None) => Err(RecoverError::Failed(SqlDispatchError::QueryError(format!(
                "callable '{kind}' completed without a result"
            )))),
        }
    }

    /// Diagnostic snapshot of the pool counters.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.ledger.snapshot()
    }

    /// Close every idle connection and stop accepting work. Idempotent.
    ///
    /// Connections checked out to still-running callables are not reclaimed;
    /// outstanding callables are reported as a leak, not resolved. Workers
    /// drain whatever was already queued, then exit.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let status = self.ledger.snapshot();
        tracing::info!(
            "closing {}/{} idle database connections",
            status.idle,
            status.total
        );
        for conn in self.ledger.drain_idle() {
            self.connector.close(conn);
        }
        if status.outstanding > 0 {
            tracing::warn!(
                "{} outstanding callables were never recovered",
                status.outstanding
            );
        }

        self.workers.shutdown();
        self.connector.on_shutdown();
    }
}

impl<C: Connector> Drop for DispatchPool<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
