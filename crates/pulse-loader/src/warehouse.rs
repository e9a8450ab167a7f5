//! Warehouse raw table
//!
//! All writes to `raw.channel_posts` go through [`Warehouse::apply_partition`]:
//! one transaction per partition, multi-row upserts keyed on
//! `(channel, message_id)`, overwriting an existing row only when the
//! incoming `ingested_at` is at least as new. That makes replays idempotent
//! and safe to run out of order. Rows are never deleted here.

use chrono::{DateTime, Utc};
use pulse_common::types::ChannelPost;
use pulse_common::Result;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::debug;

const UPSERT_CONFLICT_CLAUSE: &str = r#" ON CONFLICT (channel, message_id) DO UPDATE SET
    posted_at = EXCLUDED.posted_at,
    message_text = EXCLUDED.message_text,
    media_path = EXCLUDED.media_path,
    media_type = EXCLUDED.media_type,
    post_author = EXCLUDED.post_author,
    views = EXCLUDED.views,
    forwards = EXCLUDED.forwards,
    replies = EXCLUDED.replies,
    ingested_at = EXCLUDED.ingested_at
WHERE EXCLUDED.ingested_at >= raw.channel_posts.ingested_at"#;

/// Summary statistics for the raw table
#[derive(Debug, Clone)]
pub struct WarehouseStats {
    pub total_posts: i64,
    pub distinct_channels: i64,
    pub earliest_post: Option<DateTime<Utc>>,
    pub latest_post: Option<DateTime<Utc>>,
    pub posts_with_media: i64,
}

/// Access to the warehouse raw table
#[derive(Debug, Clone)]
pub struct Warehouse {
    pool: PgPool,
}

impl Warehouse {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `raw` schema, the `channel_posts` table and its indexes
    /// if absent
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS raw")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raw.channel_posts (
                message_id BIGINT NOT NULL,
                channel VARCHAR(255) NOT NULL,
                posted_at TIMESTAMPTZ NOT NULL,
                message_text TEXT,
                media_path TEXT,
                media_type VARCHAR(50),
                post_author VARCHAR(255),
                views BIGINT NOT NULL DEFAULT 0,
                forwards BIGINT NOT NULL DEFAULT 0,
                replies BIGINT NOT NULL DEFAULT 0,
                ingested_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (channel, message_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_channel_posts_channel ON raw.channel_posts(channel)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_channel_posts_posted_at ON raw.channel_posts(posted_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply one partition's surviving records as a single atomic unit.
    ///
    /// Either every upsert commits or none do; a failure partway leaves the
    /// warehouse exactly as it was before the attempt. Returns the number of
    /// records applied.
    pub async fn apply_partition(
        &self,
        posts: &[ChannelPost],
        batch_size: usize,
    ) -> Result<u64> {
        if posts.is_empty() {
            return Ok(0);
        }

        // A single statement may not touch the same row twice; keep only the
        // freshest occurrence of each (channel, message_id) in the batch.
        let posts = dedup_latest(posts);

        let mut tx = self.pool.begin().await?;

        for chunk in posts.chunks(batch_size.max(1)) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO raw.channel_posts (message_id, channel, posted_at, message_text, \
                 media_path, media_type, post_author, views, forwards, replies, ingested_at) ",
            );

            builder.push_values(chunk, |mut b, post| {
                b.push_bind(post.message_id)
                    .push_bind(&post.channel)
                    .push_bind(post.posted_at)
                    .push_bind(&post.text)
                    .push_bind(&post.media_path)
                    .push_bind(&post.media_type)
                    .push_bind(&post.post_author)
                    .push_bind(post.views)
                    .push_bind(post.forwards)
                    .push_bind(post.replies)
                    .push_bind(post.ingested_at);
            });

            builder.push(UPSERT_CONFLICT_CLAUSE);
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        debug!(applied = posts.len(), "Partition batch committed");
        Ok(posts.len() as u64)
    }

    /// Fetch one row by its natural key
    pub async fn get_post(
        &self,
        channel: &str,
        message_id: i64,
    ) -> Result<Option<ChannelPost>> {
        let row = sqlx::query(
            r#"
            SELECT message_id, channel, posted_at, message_text, media_path,
                   media_type, post_author, views, forwards, replies, ingested_at
            FROM raw.channel_posts
            WHERE channel = $1 AND message_id = $2
            "#,
        )
        .bind(channel)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(ChannelPost {
                message_id: row.try_get("message_id")?,
                channel: row.try_get("channel")?,
                posted_at: row.try_get("posted_at")?,
                text: row.try_get("message_text")?,
                media_path: row.try_get("media_path")?,
                media_type: row.try_get("media_type")?,
                post_author: row.try_get("post_author")?,
                views: row.try_get("views")?,
                forwards: row.try_get("forwards")?,
                replies: row.try_get("replies")?,
                ingested_at: row.try_get("ingested_at")?,
            })
        })
        .transpose()
    }

    /// Count all rows in the raw table
    pub async fn count_posts(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw.channel_posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Summary statistics over the raw table
    pub async fn stats(&self) -> Result<WarehouseStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_posts,
                COUNT(DISTINCT channel) AS distinct_channels,
                MIN(posted_at) AS earliest_post,
                MAX(posted_at) AS latest_post,
                COUNT(*) FILTER (WHERE media_path IS NOT NULL) AS posts_with_media
            FROM raw.channel_posts
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(WarehouseStats {
            total_posts: row.try_get("total_posts")?,
            distinct_channels: row.try_get("distinct_channels")?,
            earliest_post: row.try_get("earliest_post")?,
            latest_post: row.try_get("latest_post")?,
            posts_with_media: row.try_get("posts_with_media")?,
        })
    }
}

/// Keep one post per `(channel, message_id)`, preferring the greatest
/// `ingested_at` (ties resolve to the later occurrence in the batch).
fn dedup_latest(posts: &[ChannelPost]) -> Vec<ChannelPost> {
    let mut latest: HashMap<(String, i64), &ChannelPost> = HashMap::new();

    for post in posts {
        latest
            .entry((post.channel.clone(), post.message_id))
            .and_modify(|current| {
                if post.ingested_at >= current.ingested_at {
                    *current = post;
                }
            })
            .or_insert(post);
    }

    let mut result: Vec<ChannelPost> = latest.into_values().cloned().collect();
    result.sort_by(|a, b| (&a.channel, a.message_id).cmp(&(&b.channel, b.message_id)));
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(id: i64, ingested_minute: u32, views: i64) -> ChannelPost {
        ChannelPost {
            message_id: id,
            channel: "chanA".to_string(),
            posted_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            text: None,
            media_path: None,
            media_type: None,
            post_author: None,
            views,
            forwards: 0,
            replies: 0,
            ingested_at: Utc
                .with_ymd_and_hms(2024, 1, 1, 10, ingested_minute, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_dedup_keeps_latest_ingested() {
        let posts = vec![post(1, 5, 100), post(2, 0, 10), post(1, 9, 200)];
        let deduped = dedup_latest(&posts);

        assert_eq!(deduped.len(), 2);
        let one = deduped.iter().find(|p| p.message_id == 1).unwrap();
        assert_eq!(one.views, 200);
    }

    #[test]
    fn test_dedup_keeps_latest_regardless_of_order() {
        let posts = vec![post(1, 9, 200), post(1, 5, 100)];
        let deduped = dedup_latest(&posts);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].views, 200);
    }
}
