use std::time::Duration;

use serde::Deserialize;

use crate::error::SqlDispatchError;

/// Default cap on the idle connection queue.
pub const DEFAULT_IDLE_CAPACITY: usize = 30;

/// Default cap on concurrently live worker threads.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Default pause before retrying a failed worker-thread spawn, in milliseconds.
pub const DEFAULT_SPAWN_BACKOFF_MS: u64 = 50;

/// Default number of retries after a failed worker-thread spawn.
pub const DEFAULT_SPAWN_RETRIES: u32 = 1;

/// Identity of the database a pool talks to.
///
/// Stored by the pool and handed to [`Connector::connect`] whenever a callable
/// has to establish a fresh session. File-backed drivers read `database` as
/// the path and ignore the network fields.
///
/// [`Connector::connect`]: crate::connector::Connector::connect
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub server: String,
    /// 0 lets the driver pick its default port.
    #[serde(default)]
    pub port: u16,
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Endpoint {
    #[must_use]
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port: 0,
            database: database.into(),
            user: String::new(),
            password: String::new(),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }
}

/// Tag scoping every query a pool runs to one tenant/bot id.
///
/// Passed by reference to each query function so multi-tenant tables can be
/// filtered without the application threading the id through by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QueryScope {
    pub tenant_id: u32,
}

/// Options for configuring a [`DispatchPool`].
///
/// [`DispatchPool`]: crate::pool::DispatchPool
#[derive(Debug, Clone, Deserialize)]
pub struct PoolOptions {
    pub endpoint: Endpoint,
    #[serde(default)]
    pub tenant_id: u32,
    #[serde(default = "default_idle_capacity")]
    pub idle_capacity: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_spawn_backoff_ms")]
    pub spawn_backoff_ms: u64,
    #[serde(default = "default_spawn_retries")]
    pub spawn_retries: u32,
}

fn default_idle_capacity() -> usize {
    DEFAULT_IDLE_CAPACITY
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_spawn_backoff_ms() -> u64 {
    DEFAULT_SPAWN_BACKOFF_MS
}

fn default_spawn_retries() -> u32 {
    DEFAULT_SPAWN_RETRIES
}

impl PoolOptions {
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            tenant_id: 0,
            idle_capacity: DEFAULT_IDLE_CAPACITY,
            max_workers: DEFAULT_MAX_WORKERS,
            spawn_backoff_ms: DEFAULT_SPAWN_BACKOFF_MS,
            spawn_retries: DEFAULT_SPAWN_RETRIES,
        }
    }

    #[must_use]
    pub fn spawn_backoff(&self) -> Duration {
        Duration::from_millis(self.spawn_backoff_ms)
    }

    #[must_use]
    pub fn scope(&self) -> QueryScope {
        QueryScope {
            tenant_id: self.tenant_id,
        }
    }

    /// Reject option combinations the pool cannot run with.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` if `max_workers` is zero.
    pub fn validate(&self) -> Result<(), SqlDispatchError> {
        if self.max_workers == 0 {
            return Err(SqlDispatchError::ConfigError(
                "max_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`PoolOptions`].
#[derive(Debug, Clone)]
pub struct PoolOptionsBuilder {
    opts: PoolOptions,
}

impl PoolOptionsBuilder {
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            opts: PoolOptions::new(endpoint),
        }
    }

    #[must_use]
    pub fn tenant_id(mut self, tenant_id: u32) -> Self {
        self.opts.tenant_id = tenant_id;
        self
    }

    #[must_use]
    pub fn idle_capacity(mut self, idle_capacity: usize) -> Self {
        self.opts.idle_capacity = idle_capacity;
        self
    }

    #[must_use]
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.opts.max_workers = max_workers;
        self
    }

    #[must_use]
    pub fn spawn_backoff(mut self, backoff: Duration) -> Self {
        self.opts.spawn_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn spawn_retries(mut self, retries: u32) -> Self {
        self.opts.spawn_retries = retries;
        self
    }

    #[must_use]
    pub fn finish(self) -> PoolOptions {
        self.opts
    }
}

impl PoolOptions {
    #[must_use]
    pub fn builder(endpoint: Endpoint) -> PoolOptionsBuilder {
        PoolOptionsBuilder::new(endpoint)
    }
}
