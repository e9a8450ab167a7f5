//! Loader configuration
//!
//! All knobs come from the environment with documented defaults; the config
//! is constructed once at startup and passed into the components that need
//! it. No ambient singletons.

use pulse_common::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/pulse";

/// Default data lake root directory.
pub const DEFAULT_LAKE_ROOT: &str = "./data";

/// Default number of partitions processed in parallel per run.
pub const DEFAULT_LOAD_WORKERS: usize = 4;

/// Default number of rows per upsert statement within a partition
/// transaction.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default maximum database connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Postgres warehouse URL
    pub database_url: String,

    /// Data lake root directory
    pub lake_root: PathBuf,

    /// Partitions processed in parallel within one run
    pub workers: usize,

    /// Rows per upsert statement (the partition commit is still one
    /// transaction regardless of this)
    pub batch_size: usize,

    /// Pool size for the warehouse connection pool
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            lake_root: PathBuf::from(DEFAULT_LAKE_ROOT),
            workers: DEFAULT_LOAD_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from environment variables
    ///
    /// - `DATABASE_URL`: warehouse connection string
    /// - `PULSE_LAKE_ROOT`: data lake root directory
    /// - `PULSE_LOAD_WORKERS`: parallel partitions per run
    /// - `PULSE_BATCH_SIZE`: rows per upsert statement
    /// - `PULSE_MAX_CONNECTIONS`: warehouse pool size
    /// - `PULSE_CONNECT_TIMEOUT`: pool acquire timeout in seconds
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Ok(root) = std::env::var("PULSE_LAKE_ROOT") {
            config.lake_root = PathBuf::from(root);
        }

        if let Ok(val) = std::env::var("PULSE_LOAD_WORKERS") {
            if let Ok(workers) = val.parse() {
                config.workers = workers;
            }
        }

        if let Ok(val) = std::env::var("PULSE_BATCH_SIZE") {
            if let Ok(batch_size) = val.parse() {
                config.batch_size = batch_size;
            }
        }

        if let Ok(val) = std::env::var("PULSE_MAX_CONNECTIONS") {
            if let Ok(max) = val.parse() {
                config.max_connections = max;
            }
        }

        if let Ok(val) = std::env::var("PULSE_CONNECT_TIMEOUT") {
            if let Ok(secs) = val.parse() {
                config.connect_timeout_secs = secs;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(pulse_common::PulseError::config(
                "PULSE_LOAD_WORKERS must be at least 1",
            ));
        }
        if self.batch_size == 0 {
            return Err(pulse_common::PulseError::config(
                "PULSE_BATCH_SIZE must be at least 1",
            ));
        }
        Ok(())
    }

    /// Build the warehouse connection pool. An unreachable warehouse at
    /// startup is a fatal configuration error, not a per-partition failure.
    pub async fn connect(&self) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.connect_timeout_secs))
            .connect(&self.database_url)
            .await?;
        Ok(pool)
    }
}
