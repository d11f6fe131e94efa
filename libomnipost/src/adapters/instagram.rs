//! Instagram network adapter
//!
//! Graph-API-style publishing: a post is a media container created via
//! `POST {graph_url}/{account_id}/media` and made live via
//! `POST {graph_url}/{account_id}/media_publish`. Carousels create one child
//! container per media item, aggregate them into a parent container, and
//! publish the parent with bounded retry, because remote media transcoding
//! is asynchronous and the parent may not be publishable immediately after
//! child creation.

use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

use crate::adapters::{capabilities, Network, PublishOutcome, RemoteEngagement};
use crate::credentials::Credential;
use crate::error::{PlatformError, Result};
use crate::types::{MediaKind, MediaRef};

/// Attempt budget for publishing a carousel parent container.
const PARENT_PUBLISH_ATTEMPTS: u32 = 5;

/// Fixed delay between parent publish attempts.
const PARENT_PUBLISH_DELAY: Duration = Duration::from_secs(3);

/// Graph error code for "media still processing".
const MEDIA_NOT_READY_CODE: i64 = 9007;

#[derive(Debug, Deserialize)]
struct GraphErrorResponse {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Debug, Deserialize)]
struct ContainerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MediaListResponse {
    #[serde(default)]
    data: Vec<MediaListEntry>,
}

#[derive(Debug, Deserialize)]
struct MediaListEntry {
    id: String,
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    comments_count: i64,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    permalink: Option<String>,
}

/// Decode a Graph error response body into a PlatformError.
///
/// The "media not ready" condition (code 9007, or the matching message) maps
/// to `Transient`; token problems map to `Credential`; malformed requests to
/// `Validation`; everything else is `Fatal`.
fn decode_graph_error(status: StatusCode, body: &str) -> PlatformError {
    if let Ok(parsed) = serde_json::from_str::<GraphErrorResponse>(body) {
        let err = parsed.error;
        if err.code == MEDIA_NOT_READY_CODE || err.message.contains("Media ID is not available") {
            return PlatformError::Transient(format!(
                "Media still processing (code {}): {}",
                err.code, err.message
            ));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || err.code == 190
        {
            return PlatformError::Credential(format!(
                "Instagram rejected the access token (code {}): {}",
                err.code, err.message
            ));
        }
        if err.code == 100 {
            return PlatformError::Validation(format!(
                "Instagram rejected the request (code {}): {}",
                err.code, err.message
            ));
        }
        return PlatformError::Fatal(format!(
            "Instagram request failed (code {}): {}",
            err.code, err.message
        ));
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Credential(format!(
            "Instagram rejected the access token ({}): {}",
            status, body
        )),
        StatusCode::BAD_REQUEST => PlatformError::Validation(format!(
            "Instagram rejected the request ({}): {}",
            status, body
        )),
        _ => PlatformError::Fatal(format!("Instagram request failed ({}): {}", status, body)),
    }
}

pub struct InstagramAdapter {
    client: reqwest::Client,
    graph_url: String,
    /// Delay between parent publish attempts. Overridable so tests do not
    /// wait out the full 12 seconds; the attempt budget itself is fixed.
    retry_delay: Duration,
}

impl InstagramAdapter {
    pub fn new(graph_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PlatformError::Fatal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            graph_url: graph_url.trim_end_matches('/').to_string(),
            retry_delay: PARENT_PUBLISH_DELAY,
        })
    }

    #[doc(hidden)]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Publish a single-media post. Image and video use distinct container
    /// shapes; the published media id is the external id.
    pub async fn publish_single(
        &self,
        credential: &Credential,
        caption: &str,
        media: &MediaRef,
    ) -> Result<PublishOutcome> {
        let container_id = self
            .create_container(credential, media, Some(caption), false)
            .await?;
        let media_id = self.publish_container(credential, &container_id).await?;
        let permalink = self.fetch_permalink(credential, &media_id).await;

        Ok(PublishOutcome {
            external_id: media_id,
            permalink,
        })
    }

    /// Publish a carousel post from the ordered media list.
    ///
    /// Media beyond the network's carousel cap is silently truncated. The
    /// parent container publish is retried on the transient "media still
    /// processing" signal, up to the fixed attempt budget; exhaustion or any
    /// other error during the publish step surfaces as a fatal error.
    pub async fn publish_carousel(
        &self,
        credential: &Credential,
        caption: &str,
        media: &[MediaRef],
    ) -> Result<PublishOutcome> {
        let cap = capabilities(Network::Instagram).max_carousel_items;
        let media = if media.len() > cap {
            tracing::debug!(
                total = media.len(),
                cap,
                "Truncating carousel media to network cap"
            );
            &media[..cap]
        } else {
            media
        };

        let mut children = Vec::with_capacity(media.len());
        for item in media {
            let child_id = self.create_container(credential, item, None, true).await?;
            children.push(child_id);
        }

        let parent_id = self
            .create_parent_container(credential, caption, &children)
            .await?;
        let media_id = self
            .publish_parent_with_retry(credential, &parent_id)
            .await?;
        let permalink = self.fetch_permalink(credential, &media_id).await;

        Ok(PublishOutcome {
            external_id: media_id,
            permalink,
        })
    }

    /// Fetch the account's recent media with engagement counts.
    ///
    /// The listing exposes likes and comments only: shares are reported as
    /// zero and impressions as unknown.
    pub async fn list_recent(
        &self,
        credential: &Credential,
        limit: usize,
    ) -> Result<Vec<RemoteEngagement>> {
        let url = format!("{}/{}/media", self.graph_url, credential.account_id);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", "id,permalink,like_count,comments_count"),
                ("limit", &limit.to_string()),
                ("access_token", credential.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PlatformError::Fatal(format!("Instagram request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(decode_graph_error(status, &body).into());
        }

        let listing: MediaListResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Fatal(format!("Malformed Instagram response: {}", e)))?;

        Ok(listing
            .data
            .into_iter()
            .map(|entry| RemoteEngagement {
                external_id: entry.id,
                likes: entry.like_count,
                comments: entry.comments_count,
                shares: 0,
                impressions: None,
            })
            .collect())
    }

    /// Create a media container. Images use `image_url`; videos use
    /// `video_url` with `media_type=REELS`. Carousel children additionally
    /// carry `is_carousel_item=true`.
    async fn create_container(
        &self,
        credential: &Credential,
        media: &MediaRef,
        caption: Option<&str>,
        carousel_item: bool,
    ) -> Result<String> {
        let url = format!("{}/{}/media", self.graph_url, credential.account_id);

        let mut form: Vec<(&str, String)> = match media.kind {
            MediaKind::Image => vec![("image_url", media.url.clone())],
            MediaKind::Video => vec![
                ("video_url", media.url.clone()),
                ("media_type", "REELS".to_string()),
            ],
        };
        if let Some(caption) = caption {
            form.push(("caption", caption.to_string()));
        }
        if carousel_item {
            form.push(("is_carousel_item", "true".to_string()));
        }
        form.push(("access_token", credential.access_token.clone()));

        let container = self.post_container(&url, &form).await?;
        tracing::debug!(container_id = %container, kind = %media.kind, "Created media container");
        Ok(container)
    }

    /// Aggregate child containers into one parent carousel container.
    async fn create_parent_container(
        &self,
        credential: &Credential,
        caption: &str,
        children: &[String],
    ) -> Result<String> {
        let url = format!("{}/{}/media", self.graph_url, credential.account_id);
        let form: Vec<(&str, String)> = vec![
            ("media_type", "CAROUSEL".to_string()),
            ("children", children.join(",")),
            ("caption", caption.to_string()),
            ("access_token", credential.access_token.clone()),
        ];

        let parent = self.post_container(&url, &form).await?;
        tracing::debug!(parent_id = %parent, children = children.len(), "Created carousel parent");
        Ok(parent)
    }

    /// Publish a container once, returning the live media id.
    async fn publish_container(
        &self,
        credential: &Credential,
        container_id: &str,
    ) -> Result<String> {
        let url = format!("{}/{}/media_publish", self.graph_url, credential.account_id);
        let form: Vec<(&str, String)> = vec![
            ("creation_id", container_id.to_string()),
            ("access_token", credential.access_token.clone()),
        ];
        self.post_container(&url, &form).await
    }

    /// Publish the carousel parent with bounded retry on the transient
    /// "media still processing" signal.
    async fn publish_parent_with_retry(
        &self,
        credential: &Credential,
        parent_id: &str,
    ) -> Result<String> {
        for attempt in 1..=PARENT_PUBLISH_ATTEMPTS {
            match self.publish_container(credential, parent_id).await {
                Ok(media_id) => {
                    if attempt > 1 {
                        tracing::info!(parent_id, attempt, "Carousel published after retry");
                    }
                    return Ok(media_id);
                }
                Err(crate::error::OmnipostError::Platform(PlatformError::Transient(msg))) => {
                    if attempt < PARENT_PUBLISH_ATTEMPTS {
                        tracing::debug!(
                            parent_id,
                            attempt,
                            max = PARENT_PUBLISH_ATTEMPTS,
                            "Carousel parent not ready, retrying: {}",
                            msg
                        );
                        sleep(self.retry_delay).await;
                    } else {
                        return Err(PlatformError::Fatal(format!(
                            "Carousel parent {} still not ready after {} attempts: {}",
                            parent_id, PARENT_PUBLISH_ATTEMPTS, msg
                        ))
                        .into());
                    }
                }
                Err(other) => return Err(other),
            }
        }

        unreachable!("retry loop returns on every path")
    }

    async fn post_container(&self, url: &str, form: &[(&str, String)]) -> Result<String> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| PlatformError::Fatal(format!("Instagram request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(decode_graph_error(status, &body).into());
        }

        let container: ContainerResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Fatal(format!("Malformed Instagram response: {}", e)))?;
        Ok(container.id)
    }

    /// Best-effort permalink lookup for a published media id. Failure is
    /// logged, not surfaced: the publish itself already succeeded.
    async fn fetch_permalink(&self, credential: &Credential, media_id: &str) -> Option<String> {
        let url = format!("{}/{}", self.graph_url, media_id);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", "permalink"),
                ("access_token", credential.access_token.as_str()),
            ])
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!(media_id, status = %response.status(), "Permalink lookup failed");
            return None;
        }

        response
            .json::<PermalinkResponse>()
            .await
            .ok()
            .and_then(|p| p.permalink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OmnipostError;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_credential() -> Credential {
        Credential {
            account_id: "17841400000000000".to_string(),
            access_token: "graph-token".to_string(),
        }
    }

    fn image(content_id: &str, position: i64) -> MediaRef {
        MediaRef::new(
            content_id.to_string(),
            position,
            MediaKind::Image,
            format!("https://cdn.example.test/img{}.jpg", position),
        )
    }

    fn not_ready_body() -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": "Media ID is not available",
                "type": "OAuthException",
                "code": 9007,
            }
        })
    }

    fn fast_adapter(server: &MockServer) -> InstagramAdapter {
        InstagramAdapter::new(server.uri())
            .unwrap()
            .with_retry_delay(Duration::from_millis(5))
    }

    #[test]
    fn test_decode_graph_error_not_ready_is_transient() {
        let body = not_ready_body().to_string();
        let err = decode_graph_error(StatusCode::BAD_REQUEST, &body);
        assert!(matches!(err, PlatformError::Transient(_)));
    }

    #[test]
    fn test_decode_graph_error_not_ready_by_message() {
        let body = serde_json::json!({
            "error": { "message": "Media ID is not available yet", "code": 4 }
        })
        .to_string();
        let err = decode_graph_error(StatusCode::BAD_REQUEST, &body);
        assert!(matches!(err, PlatformError::Transient(_)));
    }

    #[test]
    fn test_decode_graph_error_bad_token_is_credential() {
        let body = serde_json::json!({
            "error": { "message": "Invalid OAuth access token", "code": 190 }
        })
        .to_string();
        let err = decode_graph_error(StatusCode::BAD_REQUEST, &body);
        assert!(matches!(err, PlatformError::Credential(_)));
    }

    #[test]
    fn test_decode_graph_error_invalid_param_is_validation() {
        let body = serde_json::json!({
            "error": { "message": "Invalid parameter", "code": 100 }
        })
        .to_string();
        let err = decode_graph_error(StatusCode::BAD_REQUEST, &body);
        assert!(matches!(err, PlatformError::Validation(_)));
    }

    #[test]
    fn test_decode_graph_error_unparseable_body() {
        let err = decode_graph_error(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        assert!(matches!(err, PlatformError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_publish_single_image() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media"))
            .and(body_string_contains("image_url"))
            .and(body_string_contains("caption"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "container-1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media_publish"))
            .and(body_string_contains("creation_id=container-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "media-9" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "permalink": "https://www.instagram.com/p/abc/",
            })))
            .mount(&server)
            .await;

        let adapter = fast_adapter(&server);
        let outcome = adapter
            .publish_single(&test_credential(), "caption text", &image("c", 0))
            .await
            .unwrap();

        assert_eq!(outcome.external_id, "media-9");
        assert_eq!(
            outcome.permalink.unwrap(),
            "https://www.instagram.com/p/abc/"
        );
    }

    #[tokio::test]
    async fn test_publish_single_video_uses_reels_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media"))
            .and(body_string_contains("video_url"))
            .and(body_string_contains("media_type=REELS"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "container-2" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media_publish"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "media-10" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media-10"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let video = MediaRef::new(
            "c".to_string(),
            0,
            MediaKind::Video,
            "https://cdn.example.test/clip.mp4".to_string(),
        );

        let adapter = fast_adapter(&server);
        let outcome = adapter
            .publish_single(&test_credential(), "caption", &video)
            .await
            .unwrap();

        assert_eq!(outcome.external_id, "media-10");
        // Permalink lookup failure is tolerated
        assert_eq!(outcome.permalink, None);
    }

    #[tokio::test]
    async fn test_carousel_retry_converges_within_budget() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "container-x" })),
            )
            .mount(&server)
            .await;

        // Attempts 1-2 hit the transient signal, attempt 3 succeeds
        Mock::given(method("POST"))
            .and(path("/17841400000000000/media_publish"))
            .respond_with(ResponseTemplate::new(400).set_body_json(not_ready_body()))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media_publish"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "media-42" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "permalink": "https://www.instagram.com/p/xyz/",
            })))
            .mount(&server)
            .await;

        let adapter = fast_adapter(&server);
        let media = [image("c", 0), image("c", 1), image("c", 2)];
        let outcome = adapter
            .publish_carousel(&test_credential(), "three shots", &media)
            .await
            .unwrap();

        // Exactly one parent published, not duplicated
        assert_eq!(outcome.external_id, "media-42");
    }

    #[tokio::test]
    async fn test_carousel_retry_exhaustion_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "container-x" })),
            )
            .mount(&server)
            .await;

        // Transient on all five attempts
        Mock::given(method("POST"))
            .and(path("/17841400000000000/media_publish"))
            .respond_with(ResponseTemplate::new(400).set_body_json(not_ready_body()))
            .expect(5)
            .mount(&server)
            .await;

        let adapter = fast_adapter(&server);
        let media = [image("c", 0), image("c", 1)];
        let result = adapter
            .publish_carousel(&test_credential(), "caption", &media)
            .await;

        match result {
            Err(OmnipostError::Platform(PlatformError::Fatal(msg))) => {
                assert!(msg.contains("5 attempts"));
            }
            _ => panic!("Expected fatal error after exhausting retries"),
        }
    }

    #[tokio::test]
    async fn test_carousel_non_transient_publish_error_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "container-x" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media_publish"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "Unsupported request", "code": 2 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = fast_adapter(&server);
        let media = [image("c", 0), image("c", 1)];
        let result = adapter
            .publish_carousel(&test_credential(), "caption", &media)
            .await;

        assert!(matches!(
            result,
            Err(OmnipostError::Platform(PlatformError::Fatal(_)))
        ));
    }

    #[tokio::test]
    async fn test_carousel_truncates_to_cap() {
        let server = MockServer::start().await;

        // 10 children + 1 parent = 11 container creations for 12 media items
        Mock::given(method("POST"))
            .and(path("/17841400000000000/media"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "container-x" })),
            )
            .expect(11)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media_publish"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "media-1" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let media: Vec<MediaRef> = (0..12).map(|i| image("c", i)).collect();

        let adapter = fast_adapter(&server);
        let outcome = adapter
            .publish_carousel(&test_credential(), "big batch", &media)
            .await
            .unwrap();
        assert_eq!(outcome.external_id, "media-1");
    }

    #[tokio::test]
    async fn test_carousel_child_creation_failure_propagates() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/17841400000000000/media"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "Invalid parameter: image_url", "code": 100 }
            })))
            .mount(&server)
            .await;

        let adapter = fast_adapter(&server);
        let media = [image("c", 0), image("c", 1)];
        let result = adapter
            .publish_carousel(&test_credential(), "caption", &media)
            .await;

        assert!(matches!(
            result,
            Err(OmnipostError::Platform(PlatformError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_list_recent_maps_engagement() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/17841400000000000/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "id": "media-1", "permalink": "https://www.instagram.com/p/a/", "like_count": 7, "comments_count": 2 },
                    { "id": "media-2" }
                ]
            })))
            .mount(&server)
            .await;

        let adapter = fast_adapter(&server);
        let listing = adapter.list_recent(&test_credential(), 50).await.unwrap();

        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].external_id, "media-1");
        assert_eq!(listing[0].likes, 7);
        assert_eq!(listing[0].comments, 2);
        // Shares unavailable on this listing, impressions unknown
        assert_eq!(listing[0].shares, 0);
        assert_eq!(listing[0].impressions, None);
    }
}
