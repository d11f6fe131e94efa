//! Database operations for Omnipost

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::adapters::Network;
use crate::error::{DbError, OmnipostError, Result};
use crate::types::{
    ContentItem, ContentStatus, MediaKind, MediaRef, Metric, Schedule, Variant, VariantStatus,
};

/// A published variant joined with the owning user, as the reconciliation
/// engine consumes it.
#[derive(Debug, Clone)]
pub struct PublishedVariant {
    pub variant: Variant,
    pub user_id: String,
}

/// Aggregate queue counts for status display.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub scheduled: i64,
    pub due_now: i64,
    pub published: i64,
    pub drafts: i64,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        let db_url = format!("sqlite://{}", expanded_path.replace('\\', "/"));

        // sqlx turns foreign_keys on by default; leave enforcement off so
        // orphaned schedules stay representable for the scanner to clean up
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(DbError::SqlxError)?
            .create_if_missing(true)
            .foreign_keys(false);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // --- Content items ---

    /// Create a new content item
    pub async fn create_content(&self, item: &ContentItem) -> Result<()> {
        let tags = serde_json::to_string(&item.tags).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO content_items (id, user_id, title, body, tags, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.user_id)
        .bind(&item.title)
        .bind(&item.body)
        .bind(tags)
        .bind(item.status.as_str())
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a content item by ID
    pub async fn get_content(&self, content_id: &str) -> Result<Option<ContentItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, title, body, tags, status, created_at
            FROM content_items WHERE id = ?
            "#,
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(row_to_content))
    }

    /// Update content item status
    pub async fn set_content_status(&self, content_id: &str, status: ContentStatus) -> Result<()> {
        sqlx::query("UPDATE content_items SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(content_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // --- Variants ---

    /// Create a variant
    pub async fn create_variant(&self, variant: &Variant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO variants (id, content_id, network, text_override, status,
                                  external_id, permalink, posted_date, posted_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.content_id)
        .bind(variant.network.as_str())
        .bind(&variant.text_override)
        .bind(variant.status.as_str())
        .bind(&variant.external_id)
        .bind(&variant.permalink)
        .bind(&variant.posted_date)
        .bind(&variant.posted_time)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a variant by ID
    pub async fn get_variant(&self, variant_id: &str) -> Result<Option<Variant>> {
        let row = sqlx::query(
            r#"
            SELECT id, content_id, network, text_override, status,
                   external_id, permalink, posted_date, posted_time
            FROM variants WHERE id = ?
            "#,
        )
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(row_to_variant))
    }

    /// List variants for a content item
    pub async fn variants_for_content(&self, content_id: &str) -> Result<Vec<Variant>> {
        let rows = sqlx::query(
            r#"
            SELECT id, content_id, network, text_override, status,
                   external_id, permalink, posted_date, posted_time
            FROM variants WHERE content_id = ?
            ORDER BY network
            "#,
        )
        .bind(content_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(row_to_variant).collect())
    }

    /// Update variant status
    pub async fn set_variant_status(&self, variant_id: &str, status: VariantStatus) -> Result<()> {
        sqlx::query("UPDATE variants SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(variant_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Record a successful publish on a variant.
    ///
    /// The external ID is write-once: a variant that already carries one is
    /// never overwritten, and attempting to do so is an error.
    pub async fn mark_variant_published(
        &self,
        variant_id: &str,
        external_id: &str,
        permalink: Option<&str>,
        posted_date: &str,
        posted_time: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE variants
            SET status = 'published', external_id = ?, permalink = ?,
                posted_date = ?, posted_time = ?
            WHERE id = ? AND external_id IS NULL
            "#,
        )
        .bind(external_id)
        .bind(permalink)
        .bind(posted_date)
        .bind(posted_time)
        .bind(variant_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(OmnipostError::InvalidInput(format!(
                "Variant {} already has a platform ID recorded",
                variant_id
            )));
        }

        Ok(())
    }

    /// All variants in Published state that carry an external ID, joined with
    /// the owning user. This is the reconciliation source set.
    pub async fn published_variants(&self) -> Result<Vec<PublishedVariant>> {
        let rows = sqlx::query(
            r#"
            SELECT v.id, v.content_id, v.network, v.text_override, v.status,
                   v.external_id, v.permalink, v.posted_date, v.posted_time,
                   c.user_id
            FROM variants v
            JOIN content_items c ON v.content_id = c.id
            WHERE v.status = 'published' AND v.external_id IS NOT NULL
            ORDER BY v.network, v.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let user_id: String = r.get("user_id");
                PublishedVariant {
                    variant: row_to_variant(r),
                    user_id,
                }
            })
            .collect())
    }

    // --- Schedules ---

    /// Attach a schedule to a content item
    pub async fn create_schedule(&self, schedule: &Schedule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schedules (content_id, publish_at, display_timezone, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&schedule.content_id)
        .bind(schedule.publish_at)
        .bind(&schedule.display_timezone)
        .bind(schedule.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get the schedule for a content item
    pub async fn get_schedule(&self, content_id: &str) -> Result<Option<Schedule>> {
        let row = sqlx::query(
            r#"
            SELECT content_id, publish_at, display_timezone, created_at
            FROM schedules WHERE content_id = ?
            "#,
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(row_to_schedule))
    }

    /// Delete the schedule for a content item
    pub async fn delete_schedule(&self, content_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM schedules WHERE content_id = ?")
            .bind(content_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Move a schedule to a new publish instant
    pub async fn update_schedule_time(&self, content_id: &str, publish_at: i64) -> Result<()> {
        let result = sqlx::query("UPDATE schedules SET publish_at = ? WHERE content_id = ?")
            .bind(publish_at)
            .bind(content_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(OmnipostError::NotFound(format!(
                "No schedule for content {}",
                content_id
            )));
        }

        Ok(())
    }

    /// Schedules whose publish instant is at or before `now`, oldest first
    pub async fn due_schedules(&self, now: i64) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(
            r#"
            SELECT content_id, publish_at, display_timezone, created_at
            FROM schedules WHERE publish_at <= ?
            ORDER BY publish_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(row_to_schedule).collect())
    }

    /// All pending schedules, soonest first
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(
            r#"
            SELECT content_id, publish_at, display_timezone, created_at
            FROM schedules ORDER BY publish_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(row_to_schedule).collect())
    }

    /// Aggregate queue counts
    pub async fn queue_stats(&self, now: i64) -> Result<QueueStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM schedules) AS scheduled,
                (SELECT COUNT(*) FROM schedules WHERE publish_at <= ?) AS due_now,
                (SELECT COUNT(*) FROM content_items WHERE status = 'published') AS published,
                (SELECT COUNT(*) FROM content_items WHERE status = 'draft') AS drafts
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(QueueStats {
            scheduled: row.get("scheduled"),
            due_now: row.get("due_now"),
            published: row.get("published"),
            drafts: row.get("drafts"),
        })
    }

    // --- Media references ---

    /// Attach a media reference to a content item
    pub async fn create_media_ref(&self, media: &MediaRef) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO media_refs (id, content_id, position, kind, url)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&media.id)
        .bind(&media.content_id)
        .bind(media.position)
        .bind(media.kind.as_str())
        .bind(&media.url)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Media for a content item in position order
    pub async fn media_for_content(&self, content_id: &str) -> Result<Vec<MediaRef>> {
        let rows = sqlx::query(
            r#"
            SELECT id, content_id, position, kind, url
            FROM media_refs WHERE content_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(content_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(row_to_media).collect())
    }

    // --- Metrics ---

    /// Insert or overwrite the metric record for a variant
    pub async fn upsert_metric(&self, metric: &Metric) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metrics (variant_id, likes, comments, shares, impressions, collected_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(variant_id) DO UPDATE SET
                likes = excluded.likes,
                comments = excluded.comments,
                shares = excluded.shares,
                impressions = excluded.impressions,
                collected_at = excluded.collected_at
            "#,
        )
        .bind(&metric.variant_id)
        .bind(metric.likes)
        .bind(metric.comments)
        .bind(metric.shares)
        .bind(metric.impressions)
        .bind(metric.collected_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Delete the metric record for a variant
    pub async fn delete_metric(&self, variant_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM metrics WHERE variant_id = ?")
            .bind(variant_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get the metric record for a variant
    pub async fn get_metric(&self, variant_id: &str) -> Result<Option<Metric>> {
        let row = sqlx::query(
            r#"
            SELECT variant_id, likes, comments, shares, impressions, collected_at
            FROM metrics WHERE variant_id = ?
            "#,
        )
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(row_to_metric))
    }

    /// All metric records, optionally restricted to a content item's variants
    pub async fn list_metrics(&self, content_id: Option<&str>) -> Result<Vec<Metric>> {
        let rows = match content_id {
            Some(content_id) => sqlx::query(
                r#"
                SELECT m.variant_id, m.likes, m.comments, m.shares, m.impressions, m.collected_at
                FROM metrics m
                JOIN variants v ON m.variant_id = v.id
                WHERE v.content_id = ?
                ORDER BY m.variant_id
                "#,
            )
            .bind(content_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?,
            None => sqlx::query(
                r#"
                SELECT variant_id, likes, comments, shares, impressions, collected_at
                FROM metrics ORDER BY variant_id
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?,
        };

        Ok(rows.into_iter().map(row_to_metric).collect())
    }
}

fn row_to_content(r: sqlx::sqlite::SqliteRow) -> ContentItem {
    let tags: String = r.get("tags");
    ContentItem {
        id: r.get("id"),
        user_id: r.get("user_id"),
        title: r.get("title"),
        body: r.get("body"),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        status: ContentStatus::parse(&r.get::<String, _>("status")),
        created_at: r.get("created_at"),
    }
}

fn row_to_variant(r: sqlx::sqlite::SqliteRow) -> Variant {
    Variant {
        id: r.get("id"),
        content_id: r.get("content_id"),
        network: r
            .get::<String, _>("network")
            .parse()
            .unwrap_or(Network::Bluesky),
        text_override: r.get("text_override"),
        status: VariantStatus::parse(&r.get::<String, _>("status")),
        external_id: r.get("external_id"),
        permalink: r.get("permalink"),
        posted_date: r.get("posted_date"),
        posted_time: r.get("posted_time"),
    }
}

fn row_to_schedule(r: sqlx::sqlite::SqliteRow) -> Schedule {
    Schedule {
        content_id: r.get("content_id"),
        publish_at: r.get("publish_at"),
        display_timezone: r.get("display_timezone"),
        created_at: r.get("created_at"),
    }
}

fn row_to_media(r: sqlx::sqlite::SqliteRow) -> MediaRef {
    MediaRef {
        id: r.get("id"),
        content_id: r.get("content_id"),
        position: r.get("position"),
        kind: MediaKind::parse(&r.get::<String, _>("kind")).unwrap_or(MediaKind::Image),
        url: r.get("url"),
    }
}

fn row_to_metric(r: sqlx::sqlite::SqliteRow) -> Metric {
    Metric {
        variant_id: r.get("variant_id"),
        likes: r.get("likes"),
        comments: r.get("comments"),
        shares: r.get("shares"),
        impressions: r.get("impressions"),
        collected_at: r.get("collected_at"),
    }
}
