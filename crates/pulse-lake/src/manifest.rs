//! Manifest index
//!
//! One JSON document describing every partition in the lake: its key, record
//! count, content fingerprint and write timestamp. The index is rewritten
//! wholesale on every update, but always through a temp file + rename, so a
//! reader never observes a half-written manifest and an entry present in the
//! index always refers to a fully written partition file.

use chrono::{DateTime, NaiveDate, Utc};
use pulse_common::types::PartitionKey;
use pulse_common::{PulseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One row of the manifest index, describing a single partition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    /// Ingestion date of the partition
    pub date: NaiveDate,

    /// Source channel
    pub channel: String,

    /// Number of records in the partition file
    pub record_count: u64,

    /// SHA-256 over the serialized record set
    pub fingerprint: String,

    /// When the partition file was written
    pub written_at: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn key(&self) -> PartitionKey {
        PartitionKey::new(self.date, self.channel.clone())
    }
}

/// The manifest index document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestIndex {
    /// Manifest format version
    pub manifest_version: u32,

    /// Timestamp of the last rewrite
    pub updated_at: DateTime<Utc>,

    /// Entries keyed by "YYYY-MM-DD/channel"; BTreeMap keeps listing order
    /// stable across rewrites
    #[serde(default)]
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl ManifestIndex {
    /// Create a new empty manifest
    pub fn new() -> Self {
        Self {
            manifest_version: 1,
            updated_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the manifest from a file; an absent file yields an empty manifest
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)?;
        let manifest: ManifestIndex = serde_json::from_str(&content)
            .map_err(|e| PulseError::manifest(format!("Failed to parse manifest: {}", e)))?;
        Ok(manifest)
    }

    /// Save the manifest atomically (write to temp, then rename)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let parent = path.parent().ok_or_else(|| {
            PulseError::manifest(format!("Manifest path has no parent: {}", path.display()))
        })?;
        std::fs::create_dir_all(parent)?;

        let content = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Insert or overwrite the entry for a partition
    pub fn upsert(&mut self, entry: ManifestEntry) {
        self.entries.insert(entry.key().to_string(), entry);
        self.updated_at = Utc::now();
    }

    /// Get the entry for a partition key
    pub fn get(&self, key: &PartitionKey) -> Option<&ManifestEntry> {
        self.entries.get(&key.to_string())
    }

    /// List all partitions, optionally restricted to dates >= `since`
    pub fn list_partitions(&self, since: Option<NaiveDate>) -> Vec<&ManifestEntry> {
        self.entries
            .values()
            .filter(|e| since.is_none_or(|d| e.date >= d))
            .collect()
    }

    /// Sorted list of ingestion dates present in the lake
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.entries.values().map(|e| e.date).collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }

    /// Total records across all partitions
    pub fn total_records(&self) -> u64 {
        self.entries.values().map(|e| e.record_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for ManifestIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn entry(date: &str, channel: &str, fingerprint: &str) -> ManifestEntry {
        ManifestEntry {
            date: date.parse().unwrap(),
            channel: channel.to_string(),
            record_count: 3,
            fingerprint: fingerprint.to_string(),
            written_at: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let mut manifest = ManifestIndex::new();
        manifest.upsert(entry("2024-01-01", "chanA", "aa"));

        let key = "2024-01-01/chanA".parse().unwrap();
        assert_eq!(manifest.get(&key).unwrap().fingerprint, "aa");
        assert_eq!(manifest.len(), 1);

        // Overwriting the same key replaces the entry
        manifest.upsert(entry("2024-01-01", "chanA", "bb"));
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get(&key).unwrap().fingerprint, "bb");
    }

    #[test]
    fn test_list_partitions_since_is_inclusive() {
        let mut manifest = ManifestIndex::new();
        manifest.upsert(entry("2024-01-01", "chanA", "aa"));
        manifest.upsert(entry("2024-01-02", "chanA", "bb"));
        manifest.upsert(entry("2024-01-03", "chanB", "cc"));

        let all = manifest.list_partitions(None);
        assert_eq!(all.len(), 3);

        let since = manifest.list_partitions(Some("2024-01-02".parse().unwrap()));
        assert_eq!(since.len(), 2);
        assert!(since.iter().all(|e| e.date >= "2024-01-02".parse().unwrap()));
    }

    #[test]
    fn test_dates_sorted_and_deduped() {
        let mut manifest = ManifestIndex::new();
        manifest.upsert(entry("2024-01-02", "chanA", "aa"));
        manifest.upsert(entry("2024-01-01", "chanA", "bb"));
        manifest.upsert(entry("2024-01-01", "chanB", "cc"));

        let dates: Vec<String> = manifest
            .dates()
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-02"]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("manifest.json");

        let mut manifest = ManifestIndex::new();
        manifest.upsert(entry("2024-01-01", "chanA", "aa"));
        manifest.save(&path).unwrap();

        let loaded = ManifestIndex::load(&path).unwrap();
        assert_eq!(loaded.entries, manifest.entries);

        // No leftover temp file after a successful save
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_missing_file_yields_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = ManifestIndex::load(tmp.path().join("missing.json")).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_load_corrupt_manifest_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("manifest.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(ManifestIndex::load(&path).is_err());
    }
}
