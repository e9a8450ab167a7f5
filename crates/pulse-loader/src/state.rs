//! Load state tracker
//!
//! Per-partition record of load outcomes, persisted in `etl.load_state`.
//! This is the loader's memory: the last-loaded fingerprint drives
//! incremental selection, and a `failed`/`partial` status requalifies a
//! partition on the next run. Entries are upserted on every attempt and
//! never deleted. Pure persistence, no business logic.

use chrono::{DateTime, NaiveDate, Utc};
use pulse_common::types::{LoadStatus, PartitionKey};
use pulse_common::Result;
use sqlx::{PgPool, Row};

/// One row of `etl.load_state`
#[derive(Debug, Clone, PartialEq)]
pub struct LoadStateEntry {
    pub date: NaiveDate,
    pub channel: String,
    /// Fingerprint that was attempted (not necessarily applied)
    pub fingerprint: String,
    pub status: LoadStatus,
    /// Error detail for `partial`/`failed` attempts
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
    pub loaded_count: i64,
}

impl LoadStateEntry {
    pub fn key(&self) -> PartitionKey {
        PartitionKey::new(self.date, self.channel.clone())
    }
}

/// Persistence for load state entries
#[derive(Debug, Clone)]
pub struct LoadStateStore {
    pool: PgPool,
}

impl LoadStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `etl` schema and `load_state` table if absent
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS etl")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS etl.load_state (
                partition_date DATE NOT NULL,
                channel VARCHAR(255) NOT NULL,
                fingerprint TEXT NOT NULL,
                status VARCHAR(16) NOT NULL,
                error TEXT,
                attempted_at TIMESTAMPTZ NOT NULL,
                loaded_count BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (partition_date, channel)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the load state for one partition
    pub async fn get(&self, key: &PartitionKey) -> Result<Option<LoadStateEntry>> {
        let row = sqlx::query(
            r#"
            SELECT partition_date, channel, fingerprint, status, error,
                   attempted_at, loaded_count
            FROM etl.load_state
            WHERE partition_date = $1 AND channel = $2
            "#,
        )
        .bind(key.date)
        .bind(&key.channel)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::entry_from_row).transpose()
    }

    /// List all load state entries
    pub async fn list(&self) -> Result<Vec<LoadStateEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT partition_date, channel, fingerprint, status, error,
                   attempted_at, loaded_count
            FROM etl.load_state
            ORDER BY partition_date, channel
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::entry_from_row).collect()
    }

    /// Insert or overwrite the load state for a partition
    pub async fn upsert(&self, entry: &LoadStateEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO etl.load_state (
                partition_date, channel, fingerprint, status, error,
                attempted_at, loaded_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (partition_date, channel) DO UPDATE SET
                fingerprint = EXCLUDED.fingerprint,
                status = EXCLUDED.status,
                error = EXCLUDED.error,
                attempted_at = EXCLUDED.attempted_at,
                loaded_count = EXCLUDED.loaded_count
            "#,
        )
        .bind(entry.date)
        .bind(&entry.channel)
        .bind(&entry.fingerprint)
        .bind(entry.status.as_str())
        .bind(&entry.error)
        .bind(entry.attempted_at)
        .bind(entry.loaded_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn entry_from_row(row: sqlx::postgres::PgRow) -> Result<LoadStateEntry> {
        let status: String = row.try_get("status")?;
        Ok(LoadStateEntry {
            date: row.try_get("partition_date")?,
            channel: row.try_get("channel")?,
            fingerprint: row.try_get("fingerprint")?,
            status: status.parse()?,
            error: row.try_get("error")?,
            attempted_at: row.try_get("attempted_at")?,
            loaded_count: row.try_get("loaded_count")?,
        })
    }
}
