use crate::config::Endpoint;
use crate::error::SqlDispatchError;

/// The seam between the dispatch machinery and a concrete database driver.
///
/// A pool owns one connector and calls it from worker threads. The associated
/// `Conn` is an opaque live session: the pool moves it between the idle queue
/// and exactly one callable at a time, and the application never touches it
/// outside the query function it passed to dispatch.
pub trait Connector: Send + Sync + 'static {
    type Conn: Send + 'static;

    /// Establish a fresh session against `endpoint`.
    ///
    /// Runs on a worker thread; may block on network I/O.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConnectionError` (or a driver-specific
    /// variant) if the session cannot be established.
    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Conn, SqlDispatchError>;

    /// Liveness check for a session about to be reused from the idle queue.
    ///
    /// # Errors
    /// Returns an error if the session is no longer usable; the callable then
    /// records it and the connection is evicted at recovery.
    fn ping(&self, conn: &mut Self::Conn) -> Result<(), SqlDispatchError>;

    /// Permanently close a session. The default just drops it.
    fn close(&self, conn: Self::Conn) {
        drop(conn);
    }

    /// Release per-thread driver state after a callable finishes on a worker.
    fn thread_cleanup(&self) {}

    /// Release process-wide driver state when the pool shuts down.
    fn on_shutdown(&self) {}
}
