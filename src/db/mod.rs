//! Database abstraction layer for sqlbench.
//!
//! The harness never talks to a connection directly. It asks a
//! [`DatabaseClient`] for a scoped [`Session`]: by the time `open_session`
//! returns, the session state has been discarded and the timeouts applied,
//! and dropping the session hands the connection back on every exit path.

mod mock;
mod postgres;
mod types;

pub use mock::{MockDatabaseClient, MockOutcome, SessionEvent};
pub use postgres::PostgresClient;
pub use types::{ColumnInfo, DbFailure, QueryResult, Row, Value};

use crate::config::{BenchmarkConfig, ConnectionConfig, ConnectionMode};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Per-session settings applied right after the session state is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// `statement_timeout`; the server cancels statements running longer.
    pub statement_timeout: Duration,

    /// `lock_timeout`; the server aborts statements waiting longer on a lock.
    pub lock_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            statement_timeout: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self {
            statement_timeout: Duration::from_millis(config.statement_timeout_ms),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        }
    }
}

/// Creates a database client for the given connection and harness configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(
    config: &ConnectionConfig,
    mode: ConnectionMode,
    pool_size: u32,
) -> Result<Box<dyn DatabaseClient>> {
    let client = match mode {
        ConnectionMode::Pooled => PostgresClient::connect_pooled(config, pool_size).await?,
        ConnectionMode::Shared => PostgresClient::connect_shared(config).await?,
    };
    Ok(Box::new(client))
}

/// Trait defining the interface for database clients.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Acquires a connection, resets its session state and applies `settings`.
    ///
    /// Errors here are infrastructure failures, not query outcomes.
    async fn open_session<'a>(
        &'a self,
        settings: &SessionSettings,
    ) -> Result<Box<dyn Session + 'a>>;

    /// Closes the underlying connection(s).
    async fn close(&self) -> Result<()>;
}

/// A connection that has been reset and configured for one execution.
///
/// Dropping the session releases the connection.
#[async_trait]
pub trait Session: Send {
    /// Executes `sql` and fetches every row, returning only the row count.
    async fn execute(&mut self, sql: &str) -> std::result::Result<u64, DbFailure>;

    /// Executes `sql` and converts the returned rows.
    async fn fetch(&mut self, sql: &str) -> std::result::Result<QueryResult, DbFailure>;

    /// Rolls back any open transaction. Failures are ignored.
    async fn rollback(&mut self);
}
