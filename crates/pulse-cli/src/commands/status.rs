//! `pulse status` - lake manifest and warehouse summaries

use anyhow::Result;
use pulse_lake::{LakeLayout, ManifestIndex};
use pulse_loader::{LoadStateStore, LoaderConfig, Warehouse};

pub async fn run() -> Result<()> {
    let config = LoaderConfig::from_env()?;

    let layout = LakeLayout::new(&config.lake_root);
    let manifest = ManifestIndex::load(layout.manifest_path())?;

    println!("Lake: {}", config.lake_root.display());
    println!(
        "  {} partitions across {} dates, {} records",
        manifest.len(),
        manifest.dates().len(),
        manifest.total_records()
    );
    for entry in manifest.list_partitions(None) {
        println!(
            "  {}  {:>8} records  written {}",
            entry.key(),
            entry.record_count,
            entry.written_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    let pool = config.connect().await?;
    let stats = Warehouse::new(pool.clone()).stats().await?;

    println!("Warehouse:");
    println!("  {} posts in {} channels", stats.total_posts, stats.distinct_channels);
    println!("  {} posts with media", stats.posts_with_media);
    if let (Some(earliest), Some(latest)) = (stats.earliest_post, stats.latest_post) {
        println!(
            "  posted between {} and {}",
            earliest.format("%Y-%m-%d %H:%M:%S"),
            latest.format("%Y-%m-%d %H:%M:%S")
        );
    }

    let states = LoadStateStore::new(pool).list().await?;
    if !states.is_empty() {
        println!("Load state:");
        for state in states {
            match state.error {
                Some(ref detail) => println!(
                    "  {}  {}  {} rows  ({})",
                    state.key(),
                    state.status,
                    state.loaded_count,
                    detail
                ),
                None => println!(
                    "  {}  {}  {} rows",
                    state.key(),
                    state.status,
                    state.loaded_count
                ),
            }
        }
    }

    Ok(())
}
