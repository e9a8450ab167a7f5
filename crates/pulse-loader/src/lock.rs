//! Single-run exclusion
//!
//! Two loader runs interleaving against one warehouse could apply stale
//! data over fresh despite the ingestion-timestamp rule, so only one run may
//! be active per warehouse. The guard is a Postgres advisory lock held on a
//! dedicated pooled connection for the duration of the run; a second run
//! fails fast with [`PulseError::AlreadyRunning`] instead of blocking.

use pulse_common::{PulseError, Result};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{debug, warn};

/// Advisory lock key for loader runs ("pulse" in hex)
const RUN_LOCK_KEY: i64 = 0x70756c7365;

/// Holds the advisory lock while a run is active
pub struct RunLock {
    conn: PoolConnection<Postgres>,
}

impl RunLock {
    /// Try to acquire the run lock; fails immediately if another run holds it
    pub async fn acquire(pool: &PgPool) -> Result<Self> {
        let mut conn = pool.acquire().await?;

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(RUN_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await?;

        if !locked {
            return Err(PulseError::AlreadyRunning);
        }

        debug!("Acquired loader run lock");
        Ok(Self { conn })
    }

    /// Release the lock. The session lock would also drop with the
    /// connection, but explicit release returns the pooled connection clean.
    pub async fn release(mut self) {
        let released: std::result::Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
                .bind(RUN_LOCK_KEY)
                .fetch_one(&mut *self.conn)
                .await;

        match released {
            Ok(true) => debug!("Released loader run lock"),
            Ok(false) => warn!("Loader run lock was not held at release"),
            Err(e) => warn!(error = %e, "Failed to release loader run lock"),
        }
    }
}
