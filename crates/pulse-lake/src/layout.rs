//! Lake directory layout
//!
//! [`LakeLayout`] computes every path in the lake deterministically from the
//! root. Path computation never touches the filesystem; directory creation
//! happens only in the explicit `ensure_*` methods.

use chrono::NaiveDate;
use pulse_common::types::PartitionKey;
use pulse_common::{PulseError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Deterministic path generator for the data lake
#[derive(Debug, Clone)]
pub struct LakeLayout {
    root: PathBuf,
}

impl LakeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Lake root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all post partitions
    pub fn posts_dir(&self) -> PathBuf {
        self.root.join("raw").join("posts")
    }

    /// Directory for one ingestion date
    pub fn partition_dir(&self, date: NaiveDate) -> PathBuf {
        self.posts_dir().join(date.format("%Y-%m-%d").to_string())
    }

    /// Partition data file for one `(date, channel)` pair
    pub fn partition_file(&self, key: &PartitionKey) -> PathBuf {
        self.partition_dir(key.date)
            .join(format!("{}.json", key.channel))
    }

    /// The manifest index file
    pub fn manifest_path(&self) -> PathBuf {
        self.posts_dir().join("manifest.json")
    }

    /// Media directory for one channel
    pub fn media_dir(&self, channel: &str) -> PathBuf {
        self.root.join("raw").join("media").join(channel)
    }

    /// Create the base lake directories if they do not exist
    pub fn ensure_structure(&self) -> Result<()> {
        std::fs::create_dir_all(self.posts_dir())?;
        std::fs::create_dir_all(self.root.join("raw").join("media"))?;
        debug!(root = %self.root.display(), "Lake structure ensured");
        Ok(())
    }

    /// Create the directory for one ingestion date
    pub fn ensure_partition_dir(&self, date: NaiveDate) -> Result<PathBuf> {
        let dir = self.partition_dir(date);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Create the media directory for one channel
    pub fn ensure_media_dir(&self, channel: &str) -> Result<PathBuf> {
        let dir = self.media_dir(channel);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Check that the expected lake directories are present
    pub fn validate_structure(&self) -> Result<()> {
        for dir in [self.posts_dir(), self.root.join("raw").join("media")] {
            if !dir.exists() {
                return Err(PulseError::lake(format!(
                    "Required lake directory missing: {}",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn key() -> PartitionKey {
        PartitionKey::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "chanA")
    }

    #[test]
    fn test_paths_are_deterministic() {
        let layout = LakeLayout::new("/lake");
        assert_eq!(
            layout.partition_file(&key()),
            PathBuf::from("/lake/raw/posts/2024-01-01/chanA.json")
        );
        assert_eq!(
            layout.manifest_path(),
            PathBuf::from("/lake/raw/posts/manifest.json")
        );
        assert_eq!(
            layout.media_dir("chanA"),
            PathBuf::from("/lake/raw/media/chanA")
        );
    }

    #[test]
    fn test_ensure_and_validate_structure() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = LakeLayout::new(tmp.path());

        assert!(layout.validate_structure().is_err());

        layout.ensure_structure().unwrap();
        layout.validate_structure().unwrap();
        assert!(layout.posts_dir().is_dir());
    }
}
