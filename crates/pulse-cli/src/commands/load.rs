//! `pulse load` - run the incremental loader

use anyhow::Result;
use pulse_common::types::PartitionKey;
use pulse_loader::{LoadMode, Loader, LoaderConfig};
use tracing::warn;

/// Run one loader pass and print the summary.
///
/// Returns the run result so the caller can derive the exit code; a run with
/// failed partitions is not an `Err`, that is reserved for errors that abort
/// the run itself (config, lock, manifest).
pub async fn run(full: bool, partitions: Vec<PartitionKey>) -> Result<bool> {
    let config = LoaderConfig::from_env()?;
    let pool = config.connect().await?;

    let mode = if !partitions.is_empty() {
        if full {
            warn!("--full ignored, explicit partitions given");
        }
        LoadMode::Partitions(partitions)
    } else if full {
        LoadMode::Full
    } else {
        LoadMode::Incremental
    };

    let loader = Loader::new(pool, &config);
    loader.ensure_schema().await?;

    let result = loader.run(mode).await?;
    println!("{}", result);

    Ok(result.has_failures())
}
