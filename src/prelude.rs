//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types to make it easier to
//! get started with the library.

pub use crate::callable::{Callable, RecoverError};
pub use crate::config::{Endpoint, PoolOptions, PoolOptionsBuilder, QueryScope};
pub use crate::connector::Connector;
pub use crate::error::SqlDispatchError;
pub use crate::pool::{DispatchPool, PoolStats, PoolStatus};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteConnector;
