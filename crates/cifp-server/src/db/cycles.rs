//! PostgreSQL cycle store

use async_trait::async_trait;
use chrono::NaiveDate;
use cifp_common::{types::CYCLE_LISTING_LIMIT, Cycle};
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};

use super::{CycleStore, StoreError, StoreResult};

#[derive(Debug, FromRow)]
struct CycleRow {
    name: String,
    cycle_date: NaiveDate,
    original_location: String,
    processed_location: String,
}

impl From<CycleRow> for Cycle {
    fn from(row: CycleRow) -> Self {
        Cycle::new(row.name, row.cycle_date, row.original_location, row.processed_location)
    }
}

#[derive(Clone)]
pub struct PgCycleStore {
    pool: PgPool,
}

impl PgCycleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CycleStore for PgCycleStore {
    #[instrument(skip(self, cycle), fields(name = %cycle.name))]
    async fn add(&self, cycle: &Cycle) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cycles (name, cycle_date, original_location, processed_location)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&cycle.name)
        .bind(cycle.date)
        .bind(&cycle.original_location)
        .bind(&cycle.processed_location)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Duplicate(cycle.name.clone())
            },
            other => StoreError::Sqlx(other),
        })?;

        debug!("Cycle recorded");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, name: &str) -> StoreResult<Option<Cycle>> {
        let row = sqlx::query_as::<_, CycleRow>(
            r#"
            SELECT name, cycle_date, original_location, processed_location
            FROM cycles
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Cycle::from))
    }

    #[instrument(skip(self))]
    async fn list(&self) -> StoreResult<Vec<Cycle>> {
        let rows = sqlx::query_as::<_, CycleRow>(
            r#"
            SELECT name, cycle_date, original_location, processed_location
            FROM cycles
            ORDER BY cycle_date DESC, created_at DESC
            LIMIT $1
            "#,
        )
        .bind(CYCLE_LISTING_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Cycle::from).collect())
    }
}
