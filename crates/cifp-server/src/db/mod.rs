//! Cycle metadata persistence
//!
//! The pipeline only sees the [`CycleStore`] trait; [`PgCycleStore`] is the
//! PostgreSQL implementation used by the binary.

use async_trait::async_trait;
use cifp_common::Cycle;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;

pub mod cycles;

pub use cycles::PgCycleStore;

/// Cycle store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Record already exists (unique constraint violation)
    #[error("Cycle '{0}' already exists")]
    Duplicate(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Small metadata store keyed by release name.
#[async_trait]
pub trait CycleStore: Send + Sync {
    /// Record a fully processed cycle.
    async fn add(&self, cycle: &Cycle) -> StoreResult<()>;

    /// Point lookup by name.
    async fn get(&self, name: &str) -> StoreResult<Option<Cycle>>;

    /// Most recent cycles, newest first, bounded to
    /// [`cifp_common::types::CYCLE_LISTING_LIMIT`].
    async fn list(&self) -> StoreResult<Vec<Cycle>>;
}

pub async fn create_pool(config: &DatabaseConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> StoreResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(StoreError::from)
}
