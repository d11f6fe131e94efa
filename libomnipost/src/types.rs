//! Core types for Omnipost

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::Network;

/// Lifecycle status of a content item.
///
/// Derived from the attached schedule: `Scheduled` when a schedule exists,
/// `Published` once the scanner has processed it (regardless of individual
/// variant outcomes).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Scheduled => "scheduled",
            ContentStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "scheduled" => ContentStatus::Scheduled,
            "published" => ContentStatus::Published,
            _ => ContentStatus::Draft,
        }
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a variant.
///
/// Transitions are monotonic; the only edge out of `Published` is
/// `DeletedOnPlatform`, driven by metrics reconciliation. There is no path
/// back to `Draft` or `Queued`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VariantStatus {
    Draft,
    Queued,
    Published,
    DeletedOnPlatform,
}

impl VariantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantStatus::Draft => "draft",
            VariantStatus::Queued => "queued",
            VariantStatus::Published => "published",
            VariantStatus::DeletedOnPlatform => "deleted_on_platform",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => VariantStatus::Queued,
            "published" => VariantStatus::Published,
            "deleted_on_platform" => VariantStatus::DeletedOnPlatform,
            _ => VariantStatus::Draft,
        }
    }
}

impl std::fmt::Display for VariantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The author's logical post, independent of destination network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub body: String,
    pub tags: Vec<String>,
    pub status: ContentStatus,
    pub created_at: i64,
}

impl ContentItem {
    pub fn new(user_id: String, body: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            title: None,
            body,
            tags: Vec::new(),
            status: ContentStatus::Draft,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// A per-network rendering of a content item with its own delivery lifecycle.
///
/// `external_id` is set exactly once, by a successful publish, and is
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub content_id: String,
    pub network: Network,
    pub text_override: Option<String>,
    pub status: VariantStatus,
    pub external_id: Option<String>,
    pub permalink: Option<String>,
    /// Publish date, captured separately from the time for display purposes.
    pub posted_date: Option<String>,
    pub posted_time: Option<String>,
}

impl Variant {
    pub fn new(content_id: String, network: Network) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content_id,
            network,
            text_override: None,
            status: VariantStatus::Queued,
            external_id: None,
            permalink: None,
            posted_date: None,
            posted_time: None,
        }
    }

    /// The text an adapter should publish for this variant: the override when
    /// present and non-empty, otherwise the content item's base body.
    pub fn effective_text<'a>(&'a self, base_body: &'a str) -> &'a str {
        match self.text_override.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => base_body,
        }
    }
}

/// One-shot deferred-release instruction attached to a content item.
///
/// `publish_at` is an absolute Unix timestamp; `display_timezone` is carried
/// for presentation only and never reinterprets the instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub content_id: String,
    pub publish_at: i64,
    pub display_timezone: String,
    pub created_at: i64,
}

impl Schedule {
    pub fn new(content_id: String, publish_at: i64, display_timezone: String) -> Self {
        Self {
            content_id,
            publish_at,
            display_timezone,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Media content type carried by a media reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered media reference owned by a content item.
///
/// Position order is significant for carousel delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub content_id: String,
    pub position: i64,
    pub kind: MediaKind,
    pub url: String,
}

impl MediaRef {
    pub fn new(content_id: String, position: i64, kind: MediaKind, url: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content_id,
            position,
            kind,
            url,
        }
    }
}

/// Engagement counters for a published variant.
///
/// At most one live record per variant; created or overwritten by the
/// reconciliation engine, deleted when the remote post no longer exists.
/// `impressions` is `None` on networks that do not expose it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metric {
    pub variant_id: String,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub impressions: Option<i64>,
    pub collected_at: i64,
}
