//! Domain types for the Pulse pipeline
//!
//! The raw store deals in loosely-typed [`RawPost`] values as they arrive
//! from producers; [`validate`] turns them into fully-typed [`ChannelPost`]
//! records before anything touches the warehouse.

use crate::error::PulseError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted text payload, in characters
pub const MAX_TEXT_LEN: usize = 65_536;

/// Allowed clock skew when rejecting future timestamps
pub const MAX_CLOCK_SKEW: Duration = Duration::minutes(5);

/// Identifies one partition of the raw store: all records ingested for one
/// channel on one day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Ingestion date (lake partition date, not the post date)
    pub date: NaiveDate,
    /// Source channel name
    pub channel: String,
}

impl PartitionKey {
    pub fn new(date: NaiveDate, channel: impl Into<String>) -> Self {
        Self {
            date,
            channel: channel.into(),
        }
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.date.format("%Y-%m-%d"), self.channel)
    }
}

impl std::str::FromStr for PartitionKey {
    type Err = PulseError;

    /// Parse "YYYY-MM-DD/channel"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((date_part, channel)) = s.split_once('/') else {
            return Err(PulseError::InvalidPartitionKey(s.to_string()));
        };

        let date = date_part
            .parse::<NaiveDate>()
            .map_err(|_| PulseError::InvalidPartitionKey(s.to_string()))?;

        if channel.is_empty() {
            return Err(PulseError::InvalidPartitionKey(s.to_string()));
        }

        Ok(Self::new(date, channel))
    }
}

/// A post as handed over by a producer, before validation.
///
/// Every field is optional so that malformed records can be carried to the
/// validation step and rejected individually instead of failing the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawPost {
    pub message_id: Option<i64>,
    pub channel: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub media_path: Option<String>,
    pub media_type: Option<String>,
    pub post_author: Option<String>,
    pub views: Option<i64>,
    pub forwards: Option<i64>,
    pub replies: Option<i64>,
    pub ingested_at: Option<DateTime<Utc>>,
}

/// A fully validated channel post, the unit stored in the warehouse.
///
/// `(channel, message_id)` is globally unique in the warehouse; replays
/// overwrite a row only when their `ingested_at` is at least as new.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelPost {
    pub message_id: i64,
    pub channel: String,
    pub posted_at: DateTime<Utc>,
    pub text: Option<String>,
    pub media_path: Option<String>,
    pub media_type: Option<String>,
    pub post_author: Option<String>,
    pub views: i64,
    pub forwards: i64,
    pub replies: i64,
    pub ingested_at: DateTime<Utc>,
}

/// Per-record validation failure. Never fatal to a batch or partition;
/// surfaced only in aggregate counts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Counter '{field}' is negative: {value}")]
    NegativeCounter { field: &'static str, value: i64 },

    #[error("Timestamp '{field}' is in the future")]
    FutureTimestamp { field: &'static str },

    #[error("Text payload too long: {len} chars (max {max})")]
    TextTooLong { len: usize, max: usize },
}

/// Validate a raw post, producing a typed [`ChannelPost`].
///
/// Rules:
/// - `message_id`, `channel` and `posted_at` are required
/// - engagement counters default to 0 when absent and must be non-negative
/// - `posted_at` and `ingested_at` may not lie in the future beyond
///   [`MAX_CLOCK_SKEW`]
/// - text length is bounded by [`MAX_TEXT_LEN`]
///
/// `now` is injected so the future-timestamp rule is deterministic in tests.
/// A missing `ingested_at` defaults to `now`.
pub fn validate(raw: &RawPost, now: DateTime<Utc>) -> Result<ChannelPost, ValidationError> {
    let message_id = raw
        .message_id
        .ok_or(ValidationError::MissingField { field: "message_id" })?;

    let channel = raw
        .channel
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(ValidationError::MissingField { field: "channel" })?
        .to_string();

    let posted_at = raw
        .posted_at
        .ok_or(ValidationError::MissingField { field: "posted_at" })?;

    let horizon = now + MAX_CLOCK_SKEW;
    if posted_at > horizon {
        return Err(ValidationError::FutureTimestamp { field: "posted_at" });
    }

    let ingested_at = raw.ingested_at.unwrap_or(now);
    if ingested_at > horizon {
        return Err(ValidationError::FutureTimestamp { field: "ingested_at" });
    }

    let views = counter(raw.views, "views")?;
    let forwards = counter(raw.forwards, "forwards")?;
    let replies = counter(raw.replies, "replies")?;

    if let Some(ref text) = raw.text {
        let len = text.chars().count();
        if len > MAX_TEXT_LEN {
            return Err(ValidationError::TextTooLong { len, max: MAX_TEXT_LEN });
        }
    }

    Ok(ChannelPost {
        message_id,
        channel,
        posted_at,
        text: raw.text.clone(),
        media_path: raw.media_path.clone(),
        media_type: raw.media_type.clone(),
        post_author: raw.post_author.clone(),
        views,
        forwards,
        replies,
        ingested_at,
    })
}

fn counter(value: Option<i64>, field: &'static str) -> Result<i64, ValidationError> {
    let value = value.unwrap_or(0);
    if value < 0 {
        return Err(ValidationError::NegativeCounter { field, value });
    }
    Ok(value)
}

/// Outcome of a load attempt for one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    /// Load state created but no attempt finished yet
    Pending,
    /// All surviving records applied and committed
    Loaded,
    /// Some records rejected by validation, the rest committed
    Partial,
    /// Read, parse or warehouse write failed; nothing committed
    Failed,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Pending => "pending",
            LoadStatus::Loaded => "loaded",
            LoadStatus::Partial => "partial",
            LoadStatus::Failed => "failed",
        }
    }

    /// Statuses that make a partition eligible for incremental reselection
    /// even when its fingerprint is unchanged.
    pub fn needs_retry(&self) -> bool {
        matches!(self, LoadStatus::Pending | LoadStatus::Partial | LoadStatus::Failed)
    }
}

impl std::str::FromStr for LoadStatus {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LoadStatus::Pending),
            "loaded" => Ok(LoadStatus::Loaded),
            "partial" => Ok(LoadStatus::Partial),
            "failed" => Ok(LoadStatus::Failed),
            other => Err(PulseError::Unknown(format!("Invalid load status: {}", other))),
        }
    }
}

impl std::fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn valid_raw() -> RawPost {
        RawPost {
            message_id: Some(42),
            channel: Some("chanA".to_string()),
            posted_at: Some(now() - Duration::hours(2)),
            text: Some("hello".to_string()),
            views: Some(10),
            forwards: Some(1),
            replies: Some(0),
            ingested_at: Some(now() - Duration::minutes(5)),
            ..Default::default()
        }
    }

    #[test]
    fn test_partition_key_roundtrip() {
        let key = PartitionKey::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "chanA");
        assert_eq!(key.to_string(), "2024-01-01/chanA");
        assert_eq!("2024-01-01/chanA".parse::<PartitionKey>().unwrap(), key);
    }

    #[test]
    fn test_partition_key_parse_rejects_garbage() {
        assert!("not-a-key".parse::<PartitionKey>().is_err());
        assert!("2024-13-01/chanA".parse::<PartitionKey>().is_err());
        assert!("2024-01-01/".parse::<PartitionKey>().is_err());
    }

    #[test]
    fn test_validate_accepts_valid_post() {
        let post = validate(&valid_raw(), now()).unwrap();
        assert_eq!(post.message_id, 42);
        assert_eq!(post.channel, "chanA");
        assert_eq!(post.views, 10);
    }

    #[test]
    fn test_validate_requires_identifier() {
        let mut raw = valid_raw();
        raw.message_id = None;
        assert_eq!(
            validate(&raw, now()).unwrap_err(),
            ValidationError::MissingField { field: "message_id" }
        );
    }

    #[test]
    fn test_validate_requires_channel() {
        let mut raw = valid_raw();
        raw.channel = Some(String::new());
        assert!(matches!(
            validate(&raw, now()).unwrap_err(),
            ValidationError::MissingField { field: "channel" }
        ));
    }

    #[test]
    fn test_validate_rejects_negative_counter() {
        let mut raw = valid_raw();
        raw.views = Some(-3);
        assert_eq!(
            validate(&raw, now()).unwrap_err(),
            ValidationError::NegativeCounter { field: "views", value: -3 }
        );
    }

    #[test]
    fn test_validate_missing_counters_default_to_zero() {
        let mut raw = valid_raw();
        raw.views = None;
        raw.forwards = None;
        let post = validate(&raw, now()).unwrap();
        assert_eq!(post.views, 0);
        assert_eq!(post.forwards, 0);
    }

    #[test]
    fn test_validate_rejects_future_timestamp() {
        let mut raw = valid_raw();
        raw.posted_at = Some(now() + Duration::hours(1));
        assert_eq!(
            validate(&raw, now()).unwrap_err(),
            ValidationError::FutureTimestamp { field: "posted_at" }
        );
    }

    #[test]
    fn test_validate_allows_clock_skew() {
        let mut raw = valid_raw();
        raw.posted_at = Some(now() + Duration::minutes(2));
        assert!(validate(&raw, now()).is_ok());
    }

    #[test]
    fn test_validate_bounds_text_length() {
        let mut raw = valid_raw();
        raw.text = Some("x".repeat(MAX_TEXT_LEN + 1));
        assert!(matches!(
            validate(&raw, now()).unwrap_err(),
            ValidationError::TextTooLong { .. }
        ));
    }

    #[test]
    fn test_validate_defaults_ingested_at_to_now() {
        let mut raw = valid_raw();
        raw.ingested_at = None;
        let post = validate(&raw, now()).unwrap();
        assert_eq!(post.ingested_at, now());
    }

    #[test]
    fn test_load_status_roundtrip() {
        for status in [
            LoadStatus::Pending,
            LoadStatus::Loaded,
            LoadStatus::Partial,
            LoadStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<LoadStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<LoadStatus>().is_err());
    }

    #[test]
    fn test_needs_retry() {
        assert!(LoadStatus::Failed.needs_retry());
        assert!(LoadStatus::Partial.needs_retry());
        assert!(!LoadStatus::Loaded.needs_retry());
    }
}
