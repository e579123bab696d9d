//! # Database Persistence Layer
//!
//! Postgres persistence for the registry tables via SQLx.
//!
//! The database is **optional**. With `DATABASE_URL` set, every committed
//! [`Ledger`](crate::registry::Ledger) transaction is journaled to Postgres
//! and the tables are hydrated from it at startup. Without it the registry
//! runs in memory only, which is what the test suites use.
//!
//! - [`journal`]: writes one transaction's change set in one SQL transaction.
//! - [`hydrate`]: loads every table back into a [`Tables`](crate::registry::Tables).
//! - [`audit`]: appends verification log rows outside any ledger transaction.

pub mod audit;
pub mod hydrate;
pub mod journal;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

/// Persistence failure.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("failed to encode column: {0}")]
    Encode(#[from] serde_json::Error),

    /// A stored row does not decode into a valid record.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Connect and run migrations.
///
/// Returns `None` when no URL is configured (in-memory only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, DbError> {
    let Some(url) = database_url else {
        tracing::warn!(
            "DATABASE_URL not set, running in-memory only mode. \
             State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(Some(pool))
}
