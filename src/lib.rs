pub mod callable;
pub mod config;
pub mod connector;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod worker;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use callable::{Callable, RecoverError};
pub use config::{Endpoint, PoolOptions, PoolOptionsBuilder, QueryScope};
pub use connector::Connector;
pub use error::SqlDispatchError;
pub use pool::{DispatchPool, PoolStats, PoolStatus};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnector;
