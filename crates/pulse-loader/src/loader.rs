//! Incremental loader run
//!
//! `Loader::run` is the single entry point: scan the manifest, select
//! partitions, process each selected partition (read, parse, validate,
//! upsert, record load state) and report the aggregate. Partitions are
//! independent units and are processed by a bounded set of parallel workers;
//! a failed partition never halts the run.

use chrono::Utc;
use futures::future::join_all;
use pulse_common::types::{validate, LoadStatus, PartitionKey, RawPost};
use pulse_common::{PulseError, Result};
use pulse_lake::{LakeLayout, ManifestEntry, ManifestIndex};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::LoaderConfig;
use crate::lock::RunLock;
use crate::select::select_partitions;
use crate::state::{LoadStateEntry, LoadStateStore};
use crate::warehouse::Warehouse;

/// What a run should process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMode {
    /// New, changed, and previously unsuccessful partitions (default)
    Incremental,
    /// Every partition in the manifest, for rebuild/recovery
    Full,
    /// An explicit set of partition keys, for manual replay
    Partitions(Vec<PartitionKey>),
}

/// Result of processing one partition
#[derive(Debug, Clone)]
pub struct PartitionOutcome {
    pub key: PartitionKey,
    pub status: LoadStatus,
    /// Records applied to the warehouse
    pub applied: u64,
    /// Records rejected by validation
    pub rejected: u64,
    /// Detail for `partial`/`failed` outcomes
    pub error: Option<String>,
}

/// Aggregate result of one loader run
#[derive(Debug, Clone, Default)]
pub struct LoadRunResult {
    /// Partitions present in the manifest
    pub scanned: usize,
    /// Partitions selected for processing
    pub selected: usize,
    pub loaded: usize,
    pub partial: usize,
    pub failed: usize,
    pub records_applied: u64,
    pub records_rejected: u64,
    /// Per-partition breakdown
    pub partitions: Vec<PartitionOutcome>,
}

impl LoadRunResult {
    /// Whether any partition ended `failed`
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn record(&mut self, outcome: PartitionOutcome) {
        match outcome.status {
            LoadStatus::Loaded => self.loaded += 1,
            LoadStatus::Partial => self.partial += 1,
            LoadStatus::Failed | LoadStatus::Pending => self.failed += 1,
        }
        self.records_applied += outcome.applied;
        self.records_rejected += outcome.rejected;
        self.partitions.push(outcome);
    }
}

impl std::fmt::Display for LoadRunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "partitions: {} scanned, {} selected, {} loaded, {} partial, {} failed",
            self.scanned, self.selected, self.loaded, self.partial, self.failed
        )?;
        write!(
            f,
            "records: {} applied, {} rejected by validation",
            self.records_applied, self.records_rejected
        )?;
        for outcome in &self.partitions {
            if let Some(ref detail) = outcome.error {
                write!(f, "\n  {} [{}]: {}", outcome.key, outcome.status, detail)?;
            }
        }
        Ok(())
    }
}

/// The incremental loader
#[derive(Clone)]
pub struct Loader {
    pool: PgPool,
    layout: LakeLayout,
    warehouse: Warehouse,
    state: LoadStateStore,
    workers: usize,
    batch_size: usize,
    cancel: Arc<AtomicBool>,
}

impl Loader {
    pub fn new(pool: PgPool, config: &LoaderConfig) -> Self {
        Self {
            warehouse: Warehouse::new(pool.clone()),
            state: LoadStateStore::new(pool.clone()),
            layout: LakeLayout::new(&config.lake_root),
            pool,
            workers: config.workers.max(1),
            batch_size: config.batch_size,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create warehouse and load-state schemas if absent
    pub async fn ensure_schema(&self) -> Result<()> {
        self.warehouse.ensure_schema().await?;
        self.state.ensure_schema().await?;
        Ok(())
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    /// Handle for requesting cancellation. Setting it prevents partitions
    /// that have not started yet from starting; in-flight partitions run to
    /// completion or failure.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Execute one loader run. Holds the advisory run lock for the whole
    /// duration; a concurrent run fails fast with `AlreadyRunning`.
    pub async fn run(&self, mode: LoadMode) -> Result<LoadRunResult> {
        let lock = RunLock::acquire(&self.pool).await?;
        let result = self.run_locked(mode).await;
        lock.release().await;
        result
    }

    async fn run_locked(&self, mode: LoadMode) -> Result<LoadRunResult> {
        let manifest = ManifestIndex::load(self.layout.manifest_path())?;

        let states: HashMap<PartitionKey, LoadStateEntry> = self
            .state
            .list()
            .await?
            .into_iter()
            .map(|s| (s.key(), s))
            .collect();

        let selection = select_partitions(&manifest, &states, &mode);

        let mut result = LoadRunResult {
            scanned: manifest.len(),
            selected: selection.selected.len() + selection.missing.len(),
            ..Default::default()
        };

        info!(
            mode = ?mode,
            scanned = result.scanned,
            selected = result.selected,
            workers = self.workers,
            "Starting loader run"
        );

        for key in selection.missing {
            warn!(partition = %key, "Requested partition not present in manifest");
            result.record(PartitionOutcome {
                key,
                status: LoadStatus::Failed,
                applied: 0,
                rejected: 0,
                error: Some("partition not present in manifest".to_string()),
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(selection.selected.len());

        for entry in selection.selected {
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();
            let layout = self.layout.clone();
            let warehouse = self.warehouse.clone();
            let state = self.state.clone();
            let batch_size = self.batch_size;

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                if cancel.load(Ordering::SeqCst) {
                    debug!(partition = %entry.key(), "Skipping partition, run cancelled");
                    return None;
                }
                Some(process_partition(&layout, &warehouse, &state, batch_size, entry).await)
            }));
        }

        for joined in join_all(handles).await {
            match joined {
                Ok(Some(outcome)) => result.record(outcome),
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Partition worker panicked");
                    result.failed += 1;
                }
            }
        }

        info!(
            loaded = result.loaded,
            partial = result.partial,
            failed = result.failed,
            records_applied = result.records_applied,
            records_rejected = result.records_rejected,
            "Loader run finished"
        );

        Ok(result)
    }
}

/// Process one partition end to end: read, parse, validate, upsert in one
/// transaction, then persist the load state for this attempt.
async fn process_partition(
    layout: &LakeLayout,
    warehouse: &Warehouse,
    state: &LoadStateStore,
    batch_size: usize,
    entry: ManifestEntry,
) -> PartitionOutcome {
    let key = entry.key();

    let outcome = match read_partition(layout, &key) {
        Err(e) => PartitionOutcome {
            key: key.clone(),
            status: LoadStatus::Failed,
            applied: 0,
            rejected: 0,
            error: Some(format!("partition read failed: {}", e)),
        },
        Ok(raw_posts) => {
            let now = Utc::now();
            let mut posts = Vec::with_capacity(raw_posts.len());
            let mut rejected = 0u64;

            for raw in &raw_posts {
                match validate(raw, now) {
                    Ok(post) => posts.push(post),
                    Err(e) => {
                        rejected += 1;
                        debug!(partition = %key, error = %e, "Record rejected by validation");
                    }
                }
            }

            match warehouse.apply_partition(&posts, batch_size).await {
                Ok(applied) => {
                    let status = if rejected > 0 {
                        LoadStatus::Partial
                    } else {
                        LoadStatus::Loaded
                    };
                    PartitionOutcome {
                        key: key.clone(),
                        status,
                        applied,
                        rejected,
                        error: (rejected > 0)
                            .then(|| format!("{} records rejected by validation", rejected)),
                    }
                }
                Err(e) => PartitionOutcome {
                    key: key.clone(),
                    status: LoadStatus::Failed,
                    applied: 0,
                    rejected,
                    error: Some(format!("warehouse write failed: {}", e)),
                },
            }
        }
    };

    let state_entry = LoadStateEntry {
        date: entry.date,
        channel: entry.channel.clone(),
        fingerprint: entry.fingerprint.clone(),
        status: outcome.status,
        error: outcome.error.clone(),
        attempted_at: Utc::now(),
        loaded_count: outcome.applied as i64,
    };

    // A lost state write is recoverable: the partition simply requalifies
    // on the next incremental run, and replays are idempotent.
    if let Err(e) = state.upsert(&state_entry).await {
        warn!(partition = %key, error = %e, "Failed to persist load state");
    }

    match outcome.status {
        LoadStatus::Failed => {
            error!(partition = %key, error = ?outcome.error, "Partition failed")
        }
        _ => info!(
            partition = %key,
            status = %outcome.status,
            applied = outcome.applied,
            rejected = outcome.rejected,
            "Partition processed"
        ),
    }

    outcome
}

/// Read and parse one partition file. Any read or parse failure fails the
/// whole partition; nothing is applied from an unparseable file.
fn read_partition(layout: &LakeLayout, key: &PartitionKey) -> Result<Vec<RawPost>> {
    let path = layout.partition_file(key);
    if !path.is_file() {
        return Err(PulseError::PartitionNotFound(key.to_string()));
    }

    let content = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn outcome(status: LoadStatus, applied: u64, rejected: u64) -> PartitionOutcome {
        PartitionOutcome {
            key: "2024-01-01/chanA".parse().unwrap(),
            status,
            applied,
            rejected,
            error: None,
        }
    }

    #[test]
    fn test_result_records_outcomes() {
        let mut result = LoadRunResult {
            scanned: 3,
            selected: 3,
            ..Default::default()
        };
        result.record(outcome(LoadStatus::Loaded, 10, 0));
        result.record(outcome(LoadStatus::Partial, 8, 2));
        result.record(outcome(LoadStatus::Failed, 0, 0));

        assert_eq!(result.loaded, 1);
        assert_eq!(result.partial, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.records_applied, 18);
        assert_eq!(result.records_rejected, 2);
        assert!(result.has_failures());
    }

    #[test]
    fn test_result_display_summary() {
        let mut result = LoadRunResult {
            scanned: 2,
            selected: 1,
            ..Default::default()
        };
        result.record(outcome(LoadStatus::Loaded, 3, 0));

        let text = result.to_string();
        assert!(text.contains("2 scanned"));
        assert!(text.contains("1 loaded"));
        assert!(text.contains("3 applied"));
    }

    #[test]
    fn test_read_partition_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = LakeLayout::new(tmp.path());
        let key: PartitionKey = "2024-01-01/chanA".parse().unwrap();

        assert!(matches!(
            read_partition(&layout, &key).unwrap_err(),
            PulseError::PartitionNotFound(_)
        ));
    }

    #[test]
    fn test_read_partition_corrupt_file() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = LakeLayout::new(tmp.path());
        let key: PartitionKey = "2024-01-01/chanA".parse().unwrap();

        layout.ensure_partition_dir(key.date).unwrap();
        std::fs::write(layout.partition_file(&key), "{definitely not an array").unwrap();

        assert!(read_partition(&layout, &key).is_err());
    }

    #[test]
    fn test_read_partition_parses_records() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = LakeLayout::new(tmp.path());
        let key: PartitionKey = "2024-01-01/chanA".parse().unwrap();

        layout.ensure_partition_dir(key.date).unwrap();
        std::fs::write(
            layout.partition_file(&key),
            r#"[{"message_id": 1, "channel": "chanA", "posted_at": "2024-01-01T09:00:00Z"}]"#,
        )
        .unwrap();

        let posts = read_partition(&layout, &key).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].message_id, Some(1));
    }
}
