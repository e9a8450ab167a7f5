//! Partition writer
//!
//! Writes one producer batch to its `(ingestion date, channel)` partition.
//! The data file lands via temp file + rename, and the manifest is only
//! rewritten afterwards, so a crash mid-write leaves the previous manifest
//! (and the previous partition content it points at) intact. Concurrent
//! writers to the same partition key resolve to last-writer-wins through the
//! rename; callers should still avoid racing writers on one key, since the
//! losing batch is dropped, not merged.

use crate::layout::LakeLayout;
use crate::manifest::{ManifestEntry, ManifestIndex};
use chrono::{NaiveDate, Utc};
use pulse_common::checksum::fingerprint_bytes;
use pulse_common::types::{ChannelPost, PartitionKey, RawPost};
use pulse_common::{PulseError, Result};
use std::path::Path;
use tracing::{info, warn};

/// Why an individual record was rejected from a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Record has no message identifier
    MissingIdentifier,
    /// Record names a different channel than the batch
    ChannelMismatch { found: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingIdentifier => write!(f, "missing message identifier"),
            SkipReason::ChannelMismatch { found } => {
                write!(f, "channel mismatch (found '{}')", found)
            }
        }
    }
}

/// One skipped record, by its position in the incoming batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: SkipReason,
}

/// Outcome of one partition write
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// The partition that was written
    pub key: PartitionKey,
    /// Records written to the partition file
    pub written: usize,
    /// Records rejected individually, with reasons
    pub skipped: Vec<SkippedRecord>,
    /// Records whose referenced media file was missing (stored without media)
    pub media_missing: usize,
    /// Fingerprint of the written partition content; `None` when every
    /// record was skipped and nothing was written
    pub fingerprint: Option<String>,
}

/// Writes producer batches into the partitioned raw store
#[derive(Debug, Clone)]
pub struct PartitionWriter {
    layout: LakeLayout,
}

impl PartitionWriter {
    /// Create a writer over the given lake, ensuring the base structure exists
    pub fn new(layout: LakeLayout) -> Result<Self> {
        layout.ensure_structure()?;
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &LakeLayout {
        &self.layout
    }

    /// Write a batch of validated posts for one channel.
    ///
    /// Posts whose channel does not match the batch channel are skipped
    /// individually; the typed record makes a missing identifier impossible
    /// at this level. If every post is skipped, nothing is written and the
    /// result carries the skip report with `written == 0`.
    pub fn write(
        &self,
        channel: &str,
        records: Vec<ChannelPost>,
        ingestion_date: NaiveDate,
    ) -> Result<WriteResult> {
        if records.is_empty() {
            return Err(PulseError::lake("Cannot write an empty batch"));
        }

        let mut accepted = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();

        for (index, post) in records.into_iter().enumerate() {
            if post.channel != channel {
                skipped.push(SkippedRecord {
                    index,
                    reason: SkipReason::ChannelMismatch { found: post.channel },
                });
                continue;
            }

            accepted.push(RawPost {
                message_id: Some(post.message_id),
                channel: Some(post.channel),
                posted_at: Some(post.posted_at),
                text: post.text,
                media_path: post.media_path,
                media_type: post.media_type,
                post_author: post.post_author,
                views: Some(post.views),
                forwards: Some(post.forwards),
                replies: Some(post.replies),
                ingested_at: Some(post.ingested_at),
            });
        }

        self.write_accepted(channel, accepted, skipped, ingestion_date)
    }

    /// Write a batch of raw producer records for one channel.
    ///
    /// Records with no identifier are skipped individually, never failing the
    /// batch. A record without a channel is assumed to belong to the batch
    /// channel; a record naming a different channel is skipped. If every
    /// record is skipped, nothing is written and the result carries the skip
    /// report with `written == 0`.
    pub fn write_raw(
        &self,
        channel: &str,
        records: Vec<RawPost>,
        ingestion_date: NaiveDate,
    ) -> Result<WriteResult> {
        if records.is_empty() {
            return Err(PulseError::lake("Cannot write an empty batch"));
        }

        let mut accepted = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();

        for (index, mut post) in records.into_iter().enumerate() {
            if post.message_id.is_none() {
                skipped.push(SkippedRecord {
                    index,
                    reason: SkipReason::MissingIdentifier,
                });
                continue;
            }

            match post.channel.as_deref() {
                None | Some("") => post.channel = Some(channel.to_string()),
                Some(found) if found != channel => {
                    skipped.push(SkippedRecord {
                        index,
                        reason: SkipReason::ChannelMismatch {
                            found: found.to_string(),
                        },
                    });
                    continue;
                }
                Some(_) => {}
            }

            accepted.push(post);
        }

        self.write_accepted(channel, accepted, skipped, ingestion_date)
    }

    fn write_accepted(
        &self,
        channel: &str,
        mut accepted: Vec<RawPost>,
        skipped: Vec<SkippedRecord>,
        ingestion_date: NaiveDate,
    ) -> Result<WriteResult> {
        let key = PartitionKey::new(ingestion_date, channel);

        // Skips are individual, never batch-failing: a batch with nothing
        // left still reports its skips, it just writes no partition and
        // leaves the manifest untouched.
        if accepted.is_empty() {
            warn!(
                partition = %key,
                skipped = skipped.len(),
                "Every record in the batch was skipped, nothing written"
            );
            return Ok(WriteResult {
                key,
                written: 0,
                skipped,
                media_missing: 0,
                fingerprint: None,
            });
        }

        let media_missing = self.stage_media(channel, &mut accepted)?;

        // Data file first: temp write + rename into place
        let content = serde_json::to_vec_pretty(&accepted)?;
        let fingerprint = fingerprint_bytes(&content);

        let dir = self.layout.ensure_partition_dir(ingestion_date)?;
        let tmp_path = dir.join(format!(".{}.json.tmp", channel));
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, self.layout.partition_file(&key))?;

        // Manifest second: an entry never points at an unfinished file
        let manifest_path = self.layout.manifest_path();
        let mut manifest = ManifestIndex::load(&manifest_path)?;
        manifest.upsert(ManifestEntry {
            date: ingestion_date,
            channel: channel.to_string(),
            record_count: accepted.len() as u64,
            fingerprint: fingerprint.clone(),
            written_at: Utc::now(),
        });
        manifest.save(&manifest_path)?;

        info!(
            partition = %key,
            written = accepted.len(),
            skipped = skipped.len(),
            media_missing,
            "Partition written"
        );

        Ok(WriteResult {
            key,
            written: accepted.len(),
            skipped,
            media_missing,
            fingerprint: Some(fingerprint),
        })
    }

    /// Copy referenced media files into the per-channel media area and
    /// rewrite each record's media path to its lake-relative location.
    /// A missing media file demotes the reference to `None`; it is counted
    /// but never fatal.
    fn stage_media(&self, channel: &str, records: &mut [RawPost]) -> Result<usize> {
        let mut missing = 0;

        for post in records.iter_mut() {
            let Some(source) = post.media_path.clone() else {
                continue;
            };
            // Accepted records always carry an id by this point
            let Some(message_id) = post.message_id else {
                continue;
            };

            let source_path = Path::new(&source);

            // A lake-relative path that resolves under the root was staged
            // by a previous write of this partition; keep it as is. Absolute
            // producer paths always go through the copy below.
            if source_path.is_relative() && self.layout.root().join(source_path).is_file() {
                continue;
            }

            if !source_path.is_file() {
                warn!(channel, message_id, media = %source, "Referenced media missing, storing without it");
                post.media_path = None;
                missing += 1;
                continue;
            }

            let extension = source_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("bin");
            let file_name = format!("{}.{}", message_id, extension);

            let media_dir = self.layout.ensure_media_dir(channel)?;
            std::fs::copy(source_path, media_dir.join(&file_name))?;

            post.media_path = Some(format!("raw/media/{}/{}", channel, file_name));
        }

        Ok(missing)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn raw(id: i64) -> RawPost {
        RawPost {
            message_id: Some(id),
            channel: Some("chanA".to_string()),
            posted_at: Some(Utc.with_ymd_and_hms(2023, 12, 31, 10, 0, 0).unwrap()),
            text: Some(format!("post {}", id)),
            views: Some(10),
            ..Default::default()
        }
    }

    fn writer(tmp: &TempDir) -> PartitionWriter {
        PartitionWriter::new(LakeLayout::new(tmp.path())).unwrap()
    }

    #[test]
    fn test_write_creates_partition_and_manifest() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        let result = writer
            .write_raw("chanA", vec![raw(1), raw(2), raw(3)], date())
            .unwrap();

        assert_eq!(result.written, 3);
        assert!(result.skipped.is_empty());

        let file = writer.layout().partition_file(&result.key);
        assert!(file.is_file());
        let stored: Vec<RawPost> =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(stored.len(), 3);

        let manifest = ManifestIndex::load(writer.layout().manifest_path()).unwrap();
        let entry = manifest.get(&result.key).unwrap();
        assert_eq!(entry.record_count, 3);
        assert_eq!(Some(entry.fingerprint.as_str()), result.fingerprint.as_deref());
    }

    #[test]
    fn test_rewrite_bumps_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        let first = writer.write_raw("chanA", vec![raw(1), raw(2)], date()).unwrap();
        let second = writer
            .write_raw("chanA", vec![raw(1), raw(2), raw(4)], date())
            .unwrap();

        assert_ne!(first.fingerprint, second.fingerprint);

        let manifest = ManifestIndex::load(writer.layout().manifest_path()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(
            Some(manifest.get(&second.key).unwrap().fingerprint.as_str()),
            second.fingerprint.as_deref()
        );
    }

    #[test]
    fn test_missing_identifier_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        let mut bad = raw(0);
        bad.message_id = None;

        let result = writer
            .write_raw("chanA", vec![raw(1), bad, raw(2)], date())
            .unwrap();

        assert_eq!(result.written, 2);
        assert_eq!(
            result.skipped,
            vec![SkippedRecord {
                index: 1,
                reason: SkipReason::MissingIdentifier
            }]
        );
    }

    #[test]
    fn test_channel_mismatch_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        let mut other = raw(2);
        other.channel = Some("chanB".to_string());

        let result = writer.write_raw("chanA", vec![raw(1), other], date()).unwrap();
        assert_eq!(result.written, 1);
        assert!(matches!(
            result.skipped[0].reason,
            SkipReason::ChannelMismatch { .. }
        ));
    }

    #[test]
    fn test_missing_channel_inherits_batch_channel() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        let mut anon = raw(1);
        anon.channel = None;

        let result = writer.write_raw("chanA", vec![anon], date()).unwrap();
        assert_eq!(result.written, 1);

        let file = writer.layout().partition_file(&result.key);
        let stored: Vec<RawPost> =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(stored[0].channel.as_deref(), Some("chanA"));
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);
        assert!(writer.write_raw("chanA", vec![], date()).is_err());
    }

    #[test]
    fn test_all_skipped_reports_without_writing() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        let mut bad = raw(0);
        bad.message_id = None;

        let result = writer.write_raw("chanA", vec![bad], date()).unwrap();
        assert_eq!(result.written, 0);
        assert!(result.fingerprint.is_none());
        assert_eq!(
            result.skipped,
            vec![SkippedRecord {
                index: 0,
                reason: SkipReason::MissingIdentifier
            }]
        );

        // Nothing landed: no partition file, no manifest entry
        assert!(!writer.layout().partition_file(&result.key).exists());
        let manifest = ManifestIndex::load(writer.layout().manifest_path()).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_media_is_copied_into_lake() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        let media_src = tmp.path().join("photo.jpg");
        std::fs::write(&media_src, b"jpeg bytes").unwrap();

        let mut post = raw(7);
        post.media_path = Some(media_src.to_string_lossy().to_string());

        let result = writer.write_raw("chanA", vec![post], date()).unwrap();
        assert_eq!(result.media_missing, 0);

        let staged = writer.layout().media_dir("chanA").join("7.jpg");
        assert!(staged.is_file());

        let file = writer.layout().partition_file(&result.key);
        let stored: Vec<RawPost> =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(stored[0].media_path.as_deref(), Some("raw/media/chanA/7.jpg"));
    }

    #[test]
    fn test_rewrite_keeps_lake_relative_media() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        let media_src = tmp.path().join("photo.jpg");
        std::fs::write(&media_src, b"jpeg bytes").unwrap();

        let mut post = raw(7);
        post.media_path = Some(media_src.to_string_lossy().to_string());
        let first = writer.write_raw("chanA", vec![post], date()).unwrap();

        // Rewrite the partition from its stored records, whose media paths
        // are now lake-relative; they must not be re-copied or demoted
        let file = writer.layout().partition_file(&first.key);
        let stored: Vec<RawPost> =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        let second = writer.write_raw("chanA", stored, date()).unwrap();
        assert_eq!(second.media_missing, 0);

        let restored: Vec<RawPost> =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(restored[0].media_path.as_deref(), Some("raw/media/chanA/7.jpg"));
        assert!(writer.layout().media_dir("chanA").join("7.jpg").is_file());
    }

    #[test]
    fn test_missing_media_is_demoted_to_none() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        let mut post = raw(8);
        post.media_path = Some(tmp.path().join("gone.jpg").to_string_lossy().to_string());

        let result = writer.write_raw("chanA", vec![post], date()).unwrap();
        assert_eq!(result.written, 1);
        assert_eq!(result.media_missing, 1);

        let file = writer.layout().partition_file(&result.key);
        let stored: Vec<RawPost> =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert!(stored[0].media_path.is_none());
    }

    #[test]
    fn test_typed_write_skips_foreign_channel() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        let now = Utc.with_ymd_and_hms(2023, 12, 31, 10, 0, 0).unwrap();
        let post = |channel: &str, id: i64| ChannelPost {
            message_id: id,
            channel: channel.to_string(),
            posted_at: now,
            text: None,
            media_path: None,
            media_type: None,
            post_author: None,
            views: 0,
            forwards: 0,
            replies: 0,
            ingested_at: now,
        };

        let result = writer
            .write("chanA", vec![post("chanA", 1), post("chanB", 2)], date())
            .unwrap();
        assert_eq!(result.written, 1);
        assert_eq!(result.skipped.len(), 1);
    }
}
