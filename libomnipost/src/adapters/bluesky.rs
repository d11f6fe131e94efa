//! Bluesky network adapter
//!
//! Text-only posting through the XRPC `com.atproto.repo.createRecord` call,
//! with hashtag facets whose byte ranges come from the content transform.
//! Recent-post listing for reconciliation reads `app.bsky.feed.getAuthorFeed`.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::adapters::{PublishOutcome, RemoteEngagement};
use crate::credentials::Credential;
use crate::error::{PlatformError, Result};
use crate::transform::hashtag_spans;

/// Map an XRPC error response to a PlatformError.
///
/// The AT Protocol reports errors as `{ "error": code, "message": text }`;
/// authentication failures surface as 401/403, malformed records as 400.
fn map_bluesky_error(status: StatusCode, body: &str) -> PlatformError {
    let detail = serde_json::from_str::<XrpcError>(body)
        .map(|e| format!("{}: {}", e.error, e.message))
        .unwrap_or_else(|_| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Credential(format!(
            "Bluesky rejected the access token ({}): {}",
            status, detail
        )),
        StatusCode::BAD_REQUEST => PlatformError::Validation(format!(
            "Bluesky rejected the record ({}): {}",
            status, detail
        )),
        _ => PlatformError::Fatal(format!("Bluesky request failed ({}): {}", status, detail)),
    }
}

#[derive(Debug, Deserialize)]
struct XrpcError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct AuthorFeedResponse {
    #[serde(default)]
    feed: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    post: FeedPost,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedPost {
    uri: String,
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    reply_count: i64,
    #[serde(default)]
    repost_count: i64,
}

pub struct BlueskyAdapter {
    client: reqwest::Client,
    service_url: String,
}

impl BlueskyAdapter {
    /// Create an adapter against the given PDS base URL.
    pub fn new(service_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PlatformError::Fatal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            service_url: service_url.trim_end_matches('/').to_string(),
        })
    }

    /// Publish a text post, returning the record URI as the external id.
    pub async fn publish_text(
        &self,
        credential: &Credential,
        text: &str,
    ) -> Result<PublishOutcome> {
        if text.is_empty() {
            return Err(PlatformError::Validation("Post text cannot be empty".to_string()).into());
        }

        let facets: Vec<serde_json::Value> = hashtag_spans(text)
            .into_iter()
            .map(|span| {
                json!({
                    "index": {
                        "byteStart": span.byte_start,
                        "byteEnd": span.byte_end,
                    },
                    "features": [{
                        "$type": "app.bsky.richtext.facet#tag",
                        "tag": span.tag,
                    }],
                })
            })
            .collect();

        let mut record = json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": chrono::Utc::now().to_rfc3339(),
        });
        if !facets.is_empty() {
            record["facets"] = json!(facets);
        }

        let url = format!("{}/xrpc/com.atproto.repo.createRecord", self.service_url);
        tracing::debug!(text_bytes = text.len(), "Creating Bluesky record");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credential.access_token)
            .json(&json!({
                "repo": credential.account_id,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Fatal(format!("Bluesky request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_bluesky_error(status, &body).into());
        }

        let created: CreateRecordResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Fatal(format!("Malformed Bluesky response: {}", e)))?;

        let permalink = permalink_from_uri(&credential.account_id, &created.uri);
        tracing::debug!(uri = %created.uri, "Bluesky record created");

        Ok(PublishOutcome {
            external_id: created.uri,
            permalink,
        })
    }

    /// Fetch the account's most recent posts with engagement counts.
    ///
    /// Bluesky does not expose impressions; they are reported as unknown.
    pub async fn list_recent(
        &self,
        credential: &Credential,
        limit: usize,
    ) -> Result<Vec<RemoteEngagement>> {
        let url = format!("{}/xrpc/app.bsky.feed.getAuthorFeed", self.service_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&credential.access_token)
            .query(&[
                ("actor", credential.account_id.as_str()),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| PlatformError::Fatal(format!("Bluesky request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_bluesky_error(status, &body).into());
        }

        let feed: AuthorFeedResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Fatal(format!("Malformed Bluesky response: {}", e)))?;

        Ok(feed
            .feed
            .into_iter()
            .map(|item| RemoteEngagement {
                external_id: item.post.uri,
                likes: item.post.like_count,
                comments: item.post.reply_count,
                shares: item.post.repost_count,
                impressions: None,
            })
            .collect())
    }
}

/// Derive the public permalink from the account handle and the record key at
/// the end of an AT URI.
fn permalink_from_uri(account_id: &str, uri: &str) -> Option<String> {
    let rkey = uri.rsplit('/').next()?;
    if rkey.is_empty() {
        return None;
    }
    Some(format!("https://bsky.app/profile/{}/post/{}", account_id, rkey))
}
