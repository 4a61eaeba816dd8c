use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    pool::PoolConnection,
    postgres::{PgPool, PgPoolOptions},
    Error as SqlxError, Postgres,
};
use thiserror::Error;

// Vector scans are slower than point lookups, so the statement budget is generous
// while pool acquisition still fails fast.
pub const DEFAULT_TIMEOUTS: DatabaseTimeouts = DatabaseTimeouts {
    statement_timeout: Duration::from_secs(5),
    acquire_timeout: Duration::from_secs(2),
    idle_timeout: Duration::from_secs(300),
    max_lifetime: Duration::from_secs(1800),
};

#[derive(Error, Debug)]
pub enum CustomDatabaseError {
    #[error("Pg error: {0}")]
    Other(#[from] sqlx::Error),

    #[error("Client timeout error")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

/// Anything that can hand out Postgres connections.
///
/// Services hold an `Arc<dyn Client + Send + Sync>` rather than a concrete pool
/// so that the pool can be swapped or wrapped in tests.
#[async_trait]
pub trait Client {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError>;

    fn get_pool_stats(&self) -> Option<PoolStats>;
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub num_idle: usize,
}

#[derive(Debug, Clone)]
pub struct DatabaseTimeouts {
    pub statement_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

pub async fn get_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    get_pool_with_timeouts(url, max_connections, DEFAULT_TIMEOUTS).await
}

pub async fn get_pool_with_timeouts(
    url: &str,
    max_connections: u32,
    timeouts: DatabaseTimeouts,
) -> Result<PgPool, sqlx::Error> {
    let statement_ms = timeouts.statement_timeout.as_millis();
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeouts.acquire_timeout)
        .test_before_acquire(true)
        .idle_timeout(timeouts.idle_timeout)
        .max_lifetime(timeouts.max_lifetime)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                // SET does not accept bind parameters
                sqlx::query(&format!("SET statement_timeout = '{statement_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(url)
        .await
}

#[async_trait]
impl Client for PgPool {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError> {
        let conn = self.acquire().await?;
        Ok(conn)
    }

    fn get_pool_stats(&self) -> Option<PoolStats> {
        Some(PoolStats {
            size: self.size(),
            num_idle: self.num_idle(),
        })
    }
}

/// True when the error means the query was cut short by a timeout, either on
/// the client (pool acquisition, socket) or reported by Postgres.
pub fn is_timeout_error(error: &SqlxError) -> bool {
    match error {
        SqlxError::PoolTimedOut => true,
        SqlxError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => true,
        SqlxError::Protocol(msg) => msg.to_lowercase().contains("timeout"),
        SqlxError::Database(db_error) => match db_error.code() {
            // 57014 query_canceled (statement_timeout), 55P03 lock_not_available
            Some(code) => code.as_ref() == "57014" || code.as_ref() == "55P03",
            None => {
                let msg = db_error.message().to_lowercase();
                msg.contains("timeout") || msg.contains("canceling statement")
            }
        },
        _ => false,
    }
}

/// True when the database could not be reached at all, as opposed to a query
/// that reached Postgres and failed there.
pub fn is_connection_error(error: &SqlxError) -> bool {
    match error {
        SqlxError::Io(_) | SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Tls(_) => {
            true
        }
        SqlxError::Database(db_error) => db_error
            .code()
            .is_some_and(|code| code.starts_with("08") || code.starts_with("53")),
        _ => false,
    }
}

/// True when Postgres rejected the query because a function or relation is
/// missing, typically an unapplied migration.
pub fn is_undefined_object_error(error: &SqlxError) -> bool {
    match error {
        // 42883 undefined_function, 42P01 undefined_table
        SqlxError::Database(db_error) => db_error
            .code()
            .is_some_and(|code| code.as_ref() == "42883" || code.as_ref() == "42P01"),
        _ => false,
    }
}
