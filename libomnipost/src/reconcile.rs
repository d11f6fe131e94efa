//! Metrics reconciliation
//!
//! Walks every published variant, fetches each account's recent posts from
//! its network, and converges local engagement records toward the remote
//! state: variants found remotely get their metric row created or
//! overwritten, variants missing from the listing are retired. A retired
//! variant leaves the reconciliation set for good, so repeated runs are
//! idempotent over an unchanged remote.
//!
//! Any listing fetch failure aborts the whole run before local state is
//! touched. Absence can only be concluded from a listing that was actually
//! retrieved.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::{AdapterSet, Network, RemoteEngagement};
use crate::credentials::CredentialProvider;
use crate::db::{Database, PublishedVariant};
use crate::error::{OmnipostError, Result};
use crate::types::{Metric, VariantStatus};

/// How many recent posts to pull per account listing.
const RECENT_LIMIT: usize = 50;

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ReconcileReport {
    /// Metric rows created or overwritten.
    pub updated: usize,
    /// Variants retired because the remote post is gone.
    pub retired: usize,
}

pub struct ReconcileEngine {
    db: Database,
    credentials: Arc<dyn CredentialProvider>,
    adapters: AdapterSet,
}

impl ReconcileEngine {
    pub fn new(
        db: Database,
        credentials: Arc<dyn CredentialProvider>,
        adapters: AdapterSet,
    ) -> Self {
        Self {
            db,
            credentials,
            adapters,
        }
    }

    /// Run one reconciliation pass over every published variant.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let published = self.db.published_variants().await?;
        if published.is_empty() {
            return Ok(ReconcileReport::default());
        }

        // One listing fetch per (user, network) account, fetched concurrently
        let mut groups: HashMap<(String, Network), Vec<PublishedVariant>> = HashMap::new();
        for row in published {
            groups
                .entry((row.user_id.clone(), row.variant.network))
                .or_default()
                .push(row);
        }

        let fetches = groups.into_iter().map(|((user_id, network), variants)| {
            let credentials = Arc::clone(&self.credentials);
            let adapters = &self.adapters;
            async move {
                let credential = credentials.credential(&user_id, network).await?;
                let listing = adapters
                    .list_recent(&credential, network, RECENT_LIMIT)
                    .await?;
                tracing::debug!(
                    user_id,
                    network = %network,
                    remote_posts = listing.len(),
                    "Fetched remote listing"
                );
                Ok::<_, OmnipostError>((variants, listing))
            }
        });

        let fetched = futures::future::try_join_all(fetches).await?;

        let now = Utc::now().timestamp();
        let mut report = ReconcileReport::default();

        for (variants, listing) in fetched {
            let remote: HashMap<&str, &RemoteEngagement> = listing
                .iter()
                .map(|e| (e.external_id.as_str(), e))
                .collect();

            for row in &variants {
                let variant = &row.variant;
                let external_id = match variant.external_id.as_deref() {
                    Some(id) => id,
                    None => continue,
                };

                match remote.get(external_id) {
                    Some(engagement) => {
                        self.db
                            .upsert_metric(&Metric {
                                variant_id: variant.id.clone(),
                                likes: engagement.likes,
                                comments: engagement.comments,
                                shares: engagement.shares,
                                impressions: engagement.impressions,
                                collected_at: now,
                            })
                            .await?;
                        report.updated += 1;
                    }
                    None => {
                        self.db.delete_metric(&variant.id).await?;
                        self.db
                            .set_variant_status(&variant.id, VariantStatus::DeletedOnPlatform)
                            .await?;
                        report.retired += 1;
                        tracing::info!(
                            variant_id = %variant.id,
                            network = %variant.network,
                            external_id,
                            "Remote post gone, variant retired"
                        );
                    }
                }
            }
        }

        tracing::info!(
            updated = report.updated,
            retired = report.retired,
            "Reconciliation pass complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{BlueskyAdapter, InstagramAdapter};
    use crate::credentials::{Credential, StaticCredentialProvider};
    use crate::types::{ContentItem, Variant};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("omnipost.db");
        let db = Database::new(path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn engine_for(db: Database, server: &MockServer) -> ReconcileEngine {
        let mut provider = StaticCredentialProvider::new();
        provider.insert(
            "alice",
            Network::Bluesky,
            Credential {
                account_id: "alice.test".to_string(),
                access_token: "bsky-token".to_string(),
            },
        );
        provider.insert(
            "alice",
            Network::Instagram,
            Credential {
                account_id: "17841400000000000".to_string(),
                access_token: "graph-token".to_string(),
            },
        );
        let adapters = AdapterSet::new(
            BlueskyAdapter::new(server.uri()).unwrap(),
            InstagramAdapter::new(server.uri()).unwrap(),
        );
        ReconcileEngine::new(db, Arc::new(provider), adapters)
    }

    async fn seed_published(db: &Database, network: Network, external_id: &str) -> Variant {
        let content = ContentItem::new("alice".to_string(), "body".to_string());
        db.create_content(&content).await.unwrap();
        let variant = Variant::new(content.id.clone(), network);
        db.create_variant(&variant).await.unwrap();
        db.mark_variant_published(&variant.id, external_id, None, "2026-08-29", "09:00:00")
            .await
            .unwrap();
        variant
    }

    fn bluesky_feed(entries: &[(&str, i64, i64, i64)]) -> serde_json::Value {
        serde_json::json!({
            "feed": entries
                .iter()
                .map(|(uri, likes, replies, reposts)| {
                    serde_json::json!({
                        "post": {
                            "uri": uri,
                            "likeCount": likes,
                            "replyCount": replies,
                            "repostCount": reposts,
                        }
                    })
                })
                .collect::<Vec<_>>()
        })
    }

    #[tokio::test]
    async fn test_reconcile_updates_present_variants() {
        let server = MockServer::start().await;
        let (db, _dir) = test_db().await;
        let variant = seed_published(&db, Network::Bluesky, "at://did:plc:a/post/3k1").await;

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(bluesky_feed(&[("at://did:plc:a/post/3k1", 12, 3, 4)])),
            )
            .mount(&server)
            .await;

        let engine = engine_for(db.clone(), &server);
        let report = engine.reconcile().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.retired, 0);

        let metric = db.get_metric(&variant.id).await.unwrap().unwrap();
        assert_eq!(metric.likes, 12);
        assert_eq!(metric.comments, 3);
        assert_eq!(metric.shares, 4);
        assert_eq!(metric.impressions, None);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let server = MockServer::start().await;
        let (db, _dir) = test_db().await;
        let variant = seed_published(&db, Network::Bluesky, "at://did:plc:a/post/3k1").await;

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(bluesky_feed(&[("at://did:plc:a/post/3k1", 12, 3, 4)])),
            )
            .mount(&server)
            .await;

        let engine = engine_for(db.clone(), &server);
        let first = engine.reconcile().await.unwrap();
        let metrics_after_first = db.list_metrics(None).await.unwrap();
        let second = engine.reconcile().await.unwrap();
        let metrics_after_second = db.list_metrics(None).await.unwrap();

        assert_eq!(first.updated, 1);
        assert_eq!(second.updated, 1);
        // Still exactly one row, counters unchanged
        assert_eq!(metrics_after_second.len(), 1);
        assert_eq!(metrics_after_first[0].likes, metrics_after_second[0].likes);
        assert_eq!(
            metrics_after_second[0].variant_id,
            variant.id
        );
    }

    #[tokio::test]
    async fn test_reconcile_retires_missing_variants() {
        let server = MockServer::start().await;
        let (db, _dir) = test_db().await;
        let kept = seed_published(&db, Network::Bluesky, "at://did:plc:a/post/3k1").await;
        let gone = seed_published(&db, Network::Bluesky, "at://did:plc:a/post/3k2").await;

        db.upsert_metric(&Metric {
            variant_id: gone.id.clone(),
            likes: 5,
            comments: 1,
            shares: 0,
            impressions: None,
            collected_at: 100,
        })
        .await
        .unwrap();

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(bluesky_feed(&[("at://did:plc:a/post/3k1", 2, 0, 0)])),
            )
            .mount(&server)
            .await;

        let engine = engine_for(db.clone(), &server);
        let report = engine.reconcile().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.retired, 1);

        // Retired variant: metric gone, state advanced
        assert!(db.get_metric(&gone.id).await.unwrap().is_none());
        let stored = db.get_variant(&gone.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VariantStatus::DeletedOnPlatform);

        // Kept variant untouched
        let stored = db.get_variant(&kept.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VariantStatus::Published);
    }

    #[tokio::test]
    async fn test_retired_variant_leaves_reconciliation_set() {
        let server = MockServer::start().await;
        let (db, _dir) = test_db().await;
        seed_published(&db, Network::Bluesky, "at://did:plc:a/post/3k2").await;

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bluesky_feed(&[])))
            .mount(&server)
            .await;

        let engine = engine_for(db.clone(), &server);
        let first = engine.reconcile().await.unwrap();
        assert_eq!(first.retired, 1);

        // Second run sees no published variants and fetches nothing
        let second = engine.reconcile().await.unwrap();
        assert_eq!(second.updated, 0);
        assert_eq!(second.retired, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_without_retiring() {
        let server = MockServer::start().await;
        let (db, _dir) = test_db().await;
        let variant = seed_published(&db, Network::Bluesky, "at://did:plc:a/post/3k1").await;

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let engine = engine_for(db.clone(), &server);
        let result = engine.reconcile().await;
        assert!(result.is_err());

        // A failed fetch must never look like deletion
        let stored = db.get_variant(&variant.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VariantStatus::Published);
    }

    #[tokio::test]
    async fn test_reconcile_spans_networks() {
        let server = MockServer::start().await;
        let (db, _dir) = test_db().await;
        let bsky = seed_published(&db, Network::Bluesky, "at://did:plc:a/post/3k1").await;
        let insta = seed_published(&db, Network::Instagram, "media-7").await;

        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.getAuthorFeed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(bluesky_feed(&[("at://did:plc:a/post/3k1", 1, 0, 0)])),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/17841400000000000/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "id": "media-7", "like_count": 9, "comments_count": 4 }
                ]
            })))
            .mount(&server)
            .await;

        let engine = engine_for(db.clone(), &server);
        let report = engine.reconcile().await.unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(report.retired, 0);

        let bsky_metric = db.get_metric(&bsky.id).await.unwrap().unwrap();
        assert_eq!(bsky_metric.likes, 1);

        let insta_metric = db.get_metric(&insta.id).await.unwrap().unwrap();
        assert_eq!(insta_metric.likes, 9);
        assert_eq!(insta_metric.comments, 4);
        assert_eq!(insta_metric.shares, 0);
        assert_eq!(insta_metric.impressions, None);
    }

    #[tokio::test]
    async fn test_reconcile_empty_set_is_noop() {
        let server = MockServer::start().await;
        let (db, _dir) = test_db().await;

        let engine = engine_for(db, &server);
        let report = engine.reconcile().await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.retired, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
