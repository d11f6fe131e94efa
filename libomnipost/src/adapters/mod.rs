//! Network publish adapters
//!
//! Each destination network gets a concrete adapter encapsulating its wire
//! protocol. The adapter shapes form a closed set (`AdapterKind`): selection
//! is a pure function of the network's static capabilities and the media
//! count, so every combination is enumerable and testable without runtime
//! type inspection.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::config::Config;
use crate::credentials::Credential;
use crate::error::{PlatformError, Result};
use crate::types::MediaRef;

pub mod bluesky;
pub mod instagram;

pub use bluesky::BlueskyAdapter;
pub use instagram::InstagramAdapter;

/// The closed set of supported destination networks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Bluesky,
    Instagram,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Bluesky, Network::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Bluesky => "bluesky",
            Network::Instagram => "instagram",
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bluesky" => Ok(Network::Bluesky),
            "instagram" => Ok(Network::Instagram),
            _ => Err(format!(
                "Unknown network: '{}'. Valid options: bluesky, instagram",
                s
            )),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static publish capabilities of a network.
#[derive(Debug, Clone, Copy)]
pub struct NetworkCapabilities {
    /// Posts are plain text; media references are not sent.
    pub text_only: bool,
    /// A post must carry at least one media item.
    pub requires_media: bool,
    /// Maximum items in a native multi-item post. Excess media is silently
    /// truncated to this count.
    pub max_carousel_items: usize,
}

/// Capability table, keyed on the network identifier.
pub fn capabilities(network: Network) -> NetworkCapabilities {
    match network {
        Network::Bluesky => NetworkCapabilities {
            text_only: true,
            requires_media: false,
            max_carousel_items: 0,
        },
        Network::Instagram => NetworkCapabilities {
            text_only: false,
            requires_media: true,
            max_carousel_items: 10,
        },
    }
}

/// The closed set of publish shapes an adapter can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    TextOnly,
    SingleMedia,
    Carousel,
}

/// Select the adapter shape for a publish, from network capabilities and the
/// number of attached media items.
///
/// Fails with a validation error when the combination is unsatisfiable, e.g.
/// a media-requiring network with no media attached.
pub fn select_adapter(network: Network, media_count: usize) -> Result<AdapterKind> {
    let caps = capabilities(network);

    if caps.text_only {
        return Ok(AdapterKind::TextOnly);
    }
    if caps.requires_media && media_count == 0 {
        return Err(PlatformError::Validation(format!(
            "{} requires at least one media item",
            network
        ))
        .into());
    }
    if media_count > 1 {
        Ok(AdapterKind::Carousel)
    } else {
        Ok(AdapterKind::SingleMedia)
    }
}

/// Result of a successful adapter publish.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub external_id: String,
    pub permalink: Option<String>,
}

/// Engagement counters for one remote post, as returned by a network's
/// recent-posts listing.
#[derive(Debug, Clone)]
pub struct RemoteEngagement {
    pub external_id: String,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    /// `None` on networks that do not expose impressions.
    pub impressions: Option<i64>,
}

/// All configured network adapters, dispatched by `select_adapter`.
pub struct AdapterSet {
    bluesky: BlueskyAdapter,
    instagram: InstagramAdapter,
}

impl AdapterSet {
    pub fn new(bluesky: BlueskyAdapter, instagram: InstagramAdapter) -> Self {
        Self { bluesky, instagram }
    }

    /// Build the adapter set from configured base URLs.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            bluesky: BlueskyAdapter::new(config.networks.bluesky.service_url.clone())?,
            instagram: InstagramAdapter::new(config.networks.instagram.graph_url.clone())?,
        })
    }

    /// Publish `text` plus the ordered `media` list to `network`.
    ///
    /// Picks the adapter shape via the capability table and delegates to the
    /// matching network client.
    pub async fn publish(
        &self,
        credential: &Credential,
        network: Network,
        text: &str,
        media: &[MediaRef],
    ) -> Result<PublishOutcome> {
        match select_adapter(network, media.len())? {
            AdapterKind::TextOnly => self.bluesky.publish_text(credential, text).await,
            AdapterKind::SingleMedia => {
                self.instagram
                    .publish_single(credential, text, &media[0])
                    .await
            }
            AdapterKind::Carousel => {
                self.instagram
                    .publish_carousel(credential, text, media)
                    .await
            }
        }
    }

    /// Fetch a bounded recent listing of the account's posts on `network`,
    /// with engagement counts.
    pub async fn list_recent(
        &self,
        credential: &Credential,
        network: Network,
        limit: usize,
    ) -> Result<Vec<RemoteEngagement>> {
        match network {
            Network::Bluesky => self.bluesky.list_recent(credential, limit).await,
            Network::Instagram => self.instagram.list_recent(credential, limit).await,
        }
    }
}
