use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;

/// Errors produced while dispatching, executing, or recovering a callable.
///
/// An error captured on a callable never aborts the process; it surfaces to
/// the caller once the callable is recovered, and the callable's connection is
/// evicted rather than returned to the idle queue.
#[derive(Debug, Error)]
pub enum SqlDispatchError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Initial connect or liveness check failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The query function reported a driver-level failure.
    #[error("Query error: {0}")]
    QueryError(String),

    /// No worker thread could be spawned after the retry.
    #[error("Resource error: {0}")]
    ResourceError(String),

    /// The dispatch/recover protocol was violated by the caller.
    #[error("Protocol misuse: {0}")]
    ProtocolMisuse(String),
}
