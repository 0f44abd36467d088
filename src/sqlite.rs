pub use rusqlite;

use rusqlite::Connection as SqliteConnectionType;

use crate::config::Endpoint;
use crate::connector::Connector;
use crate::error::SqlDispatchError;

/// Reference connector backed by `rusqlite`.
///
/// Reads [`Endpoint::database`] as the database path (`:memory:` and
/// `file:` URIs included) and ignores the network fields. Useful for local
/// deployments and for exercising the dispatch machinery against a real
/// driver without a server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl SqliteConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SqliteConnector {
    type Conn = SqliteConnectionType;

    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Conn, SqlDispatchError> {
        let conn = SqliteConnectionType::open(&endpoint.database).map_err(|e| {
            SqlDispatchError::ConnectionError(format!(
                "failed to open SQLite database {}: {e}",
                endpoint.database
            ))
        })?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| {
                SqlDispatchError::ConnectionError(format!("failed to initialize SQLite: {e}"))
            })?;

        Ok(conn)
    }

    fn ping(&self, conn: &mut Self::Conn) -> Result<(), SqlDispatchError> {
        conn.execute_batch("SELECT 1;").map_err(|e| {
            SqlDispatchError::ConnectionError(format!("SQLite liveness check failed: {e}"))
        })
    }

    fn close(&self, conn: Self::Conn) {
        if let Err((_conn, err)) = conn.close() {
            tracing::warn!("error closing SQLite connection: {err}");
        }
    }
}
