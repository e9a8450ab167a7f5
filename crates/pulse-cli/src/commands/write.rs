//! `pulse write` - write a producer batch into the lake

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use pulse_common::types::RawPost;
use pulse_lake::{LakeLayout, PartitionWriter};
use pulse_loader::LoaderConfig;

/// Read a JSON array of raw posts from `input` and write it to the
/// `(date, channel)` partition.
pub async fn run(channel: String, input: String, date: Option<NaiveDate>) -> Result<()> {
    let config = LoaderConfig::from_env()?;
    let date = date.unwrap_or_else(|| Utc::now().date_naive());

    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read batch file: {}", input))?;
    let records: Vec<RawPost> = serde_json::from_str(&content)
        .with_context(|| format!("Batch file is not a JSON array of posts: {}", input))?;

    let writer = PartitionWriter::new(LakeLayout::new(&config.lake_root))?;
    let result = writer.write_raw(&channel, records, date)?;

    if result.written == 0 {
        println!(
            "Nothing written to partition {}: all {} records skipped",
            result.key,
            result.skipped.len()
        );
    } else {
        println!(
            "Wrote partition {}: {} records ({} skipped, {} with missing media)",
            result.key,
            result.written,
            result.skipped.len(),
            result.media_missing
        );
    }
    for skip in &result.skipped {
        println!("  skipped record #{}: {}", skip.index, skip.reason);
    }

    Ok(())
}
