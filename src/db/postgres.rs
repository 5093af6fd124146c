//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.
//!
//! Every statement goes through the simple query protocol (`raw_sql`) and the
//! prepared statement cache is disabled: `DISCARD ALL` deallocates prepared
//! statements, which would leave sqlx holding stale handles.

use crate::config::ConnectionConfig;
use crate::db::{
    ColumnInfo, DatabaseClient, DbFailure, QueryResult, Row, Session, SessionSettings, Value,
};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{
    PgColumn, PgConnectOptions, PgConnection, PgDatabaseError, PgPool, PgPoolOptions, PgRow,
};
use sqlx::{
    Column as SqlxColumn, ConnectOptions, Connection, Executor, Postgres, Row as SqlxRow,
    TypeInfo,
};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// How long a pooled acquire may wait before failing.
const ACQUIRE_TIMEOUT_SECS: u64 = 10;

enum Backend {
    Pooled(PgPool),
    Shared(Mutex<Option<PgConnection>>),
}

/// PostgreSQL database client.
pub struct PostgresClient {
    backend: Backend,
}

impl std::fmt::Debug for PostgresClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.backend {
            Backend::Pooled(_) => "pooled",
            Backend::Shared(_) => "shared",
        };
        f.debug_struct("PostgresClient").field("mode", &mode).finish()
    }
}

impl PostgresClient {
    /// Connects a bounded pool; every session acquires its own pooled connection.
    pub async fn connect_pooled(config: &ConnectionConfig, pool_size: u32) -> Result<Self> {
        let options = connect_options(config)?;
        let pool = connect_with_retry(config, || {
            PgPoolOptions::new()
                .max_connections(pool_size)
                .min_connections(1)
                .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
                .connect_with(options.clone())
        })
        .await?;
        Ok(Self::from_pool(pool))
    }

    /// Connects a single connection reused by every session.
    pub async fn connect_shared(config: &ConnectionConfig) -> Result<Self> {
        let options = connect_options(config)?;
        let conn = connect_with_retry(config, || PgConnection::connect_with(&options)).await?;
        Ok(Self {
            backend: Backend::Shared(Mutex::new(Some(conn))),
        })
    }

    /// Creates a new PostgresClient from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            backend: Backend::Pooled(pool),
        }
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn open_session<'a>(
        &'a self,
        settings: &SessionSettings,
    ) -> Result<Box<dyn Session + 'a>> {
        let handle = match &self.backend {
            Backend::Pooled(pool) => Handle::Pooled(pool.acquire().await.map_err(|e| {
                BenchError::connection(format!("Failed to acquire a pooled connection: {e}"))
            })?),
            Backend::Shared(conn) => {
                let guard = conn.lock().await;
                if guard.is_none() {
                    return Err(BenchError::connection("Shared connection is closed"));
                }
                Handle::Shared(guard)
            }
        };

        let mut session = PgSession { handle };
        session.reset(settings).await?;
        Ok(Box::new(session))
    }

    async fn close(&self) -> Result<()> {
        match &self.backend {
            Backend::Pooled(pool) => pool.close().await,
            Backend::Shared(conn) => {
                if let Some(conn) = conn.lock().await.take() {
                    conn.close()
                        .await
                        .map_err(|e| BenchError::connection(format!("Failed to close: {e}")))?;
                }
            }
        }
        Ok(())
    }
}

enum Handle<'a> {
    Pooled(PoolConnection<Postgres>),
    Shared(MutexGuard<'a, Option<PgConnection>>),
}

impl Handle<'_> {
    fn conn(&mut self) -> std::result::Result<&mut PgConnection, DbFailure> {
        match self {
            Handle::Pooled(conn) => Ok(&mut **conn),
            Handle::Shared(guard) => guard
                .as_mut()
                .ok_or_else(|| DbFailure::client("shared connection is closed")),
        }
    }
}

/// A reset and configured connection. Dropping it returns the pooled
/// connection or unlocks the shared one.
struct PgSession<'a> {
    handle: Handle<'a>,
}

impl PgSession<'_> {
    /// Clears prior session state, then applies the timeouts.
    ///
    /// `DISCARD ALL` runs first because it also resets every `SET`.
    async fn reset(&mut self, settings: &SessionSettings) -> Result<()> {
        let statements = [
            "DISCARD ALL".to_string(),
            format!(
                "SET statement_timeout = {}",
                settings.statement_timeout.as_millis()
            ),
            format!("SET lock_timeout = {}", settings.lock_timeout.as_millis()),
        ];

        let conn = self
            .handle
            .conn()
            .map_err(|e| BenchError::connection(e.to_string()))?;
        for statement in &statements {
            (&mut *conn)
                .execute(sqlx::raw_sql(statement))
                .await
                .map_err(|e| {
                    BenchError::connection(format!("Session reset failed on '{statement}': {e}"))
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession<'_> {
    async fn execute(&mut self, sql: &str) -> std::result::Result<u64, DbFailure> {
        let conn = self.handle.conn()?;
        let rows = (&mut *conn)
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(failure_from_sqlx)?;
        Ok(rows.len() as u64)
    }

    async fn fetch(&mut self, sql: &str) -> std::result::Result<QueryResult, DbFailure> {
        let conn = self.handle.conn()?;
        let result = (&mut *conn)
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(failure_from_sqlx)?;

        let columns = match result.first() {
            Some(row) => column_info(row.columns()),
            // No row to read the description from; a SELECT matching nothing
            // still has columns, a DDL or SET statement has none.
            None => match (&mut *conn).describe(sql).await {
                Ok(describe) => column_info(describe.columns()),
                Err(e) => {
                    debug!("Describe of empty result failed: {e}");
                    Vec::new()
                }
            },
        };
        let rows: Vec<Row> = result.iter().map(convert_row).collect();

        Ok(QueryResult::with_data(columns, rows))
    }

    async fn rollback(&mut self) {
        let Ok(conn) = self.handle.conn() else {
            return;
        };
        if let Err(e) = (&mut *conn).execute(sqlx::raw_sql("ROLLBACK")).await {
            debug!("Rollback after failed run failed: {e}");
        }
    }
}

/// Builds sqlx connect options from our connection config.
fn connect_options(config: &ConnectionConfig) -> Result<PgConnectOptions> {
    let database = config
        .database
        .as_deref()
        .ok_or_else(|| BenchError::config("Database name is required"))?;

    let mut options = PgConnectOptions::new()
        .host(config.host.as_deref().unwrap_or("localhost"))
        .port(config.port)
        .database(database)
        .application_name("sqlbench")
        .statement_cache_capacity(0);

    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }

    // Slow-statement warnings would fire on every long benchmark run.
    Ok(options.disable_statement_logging())
}

/// Runs `attempt` until it succeeds, retrying transient failures with exponential backoff.
async fn connect_with_retry<T, F, Fut>(config: &ConnectionConfig, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut attempt_no = 1;

    loop {
        debug!("Connection attempt {} of {}", attempt_no, MAX_RETRY_ATTEMPTS);

        match attempt().await {
            Ok(conn) => {
                debug!("Successfully connected to database");
                return Ok(conn);
            }
            Err(e) => {
                if attempt_no >= MAX_RETRY_ATTEMPTS || !is_transient_error(&e) {
                    return Err(map_connection_error(e, config));
                }
                warn!(
                    "Connection attempt {} failed (transient error), retrying in {:?}",
                    attempt_no, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt_no += 1;
            }
        }
    }
}

fn column_info(columns: &[PgColumn]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // The simple protocol returns text for everything else
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Extracts SQLSTATE and a readable message from a sqlx error.
fn failure_from_sqlx(error: sqlx::Error) -> DbFailure {
    let Some(db_error) = error.as_database_error() else {
        return DbFailure::client(error.to_string());
    };

    let mut message = db_error.message().to_string();
    if let Some(pg_error) = db_error.try_downcast_ref::<PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            message.push_str("\n  DETAIL: ");
            message.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            message.push_str("\n  HINT: ");
            message.push_str(hint);
        }
    }

    match db_error.code() {
        Some(code) => DbFailure::with_code(code.into_owned(), message),
        None => DbFailure::client(message),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("the database system is starting up")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> BenchError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        BenchError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        BenchError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        BenchError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        BenchError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        BenchError::connection(error.to_string())
    }
}
