//! Publish dispatching
//!
//! Connects stored content to the network adapters: resolves the credential,
//! computes the effective text, publishes through the adapter set, and
//! records the publish on the variant. The variant is only mutated after the
//! adapter reports success; a failed publish leaves it untouched and
//! re-eligible for a later attempt.

use chrono::Utc;
use std::sync::Arc;

use crate::adapters::{AdapterSet, Network};
use crate::credentials::CredentialProvider;
use crate::db::Database;
use crate::error::{OmnipostError, Result};
use crate::types::{ContentStatus, VariantStatus};

/// Record of one successful variant publish.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub variant_id: String,
    pub network: Network,
    pub external_id: String,
    pub permalink: Option<String>,
}

/// Per-variant outcome of a batch publish over a content item.
#[derive(Debug)]
pub struct VariantResult {
    pub variant_id: String,
    pub network: Network,
    pub outcome: std::result::Result<PublishReport, OmnipostError>,
}

pub struct Dispatcher {
    db: Database,
    credentials: Arc<dyn CredentialProvider>,
    adapters: AdapterSet,
}

impl Dispatcher {
    pub fn new(db: Database, credentials: Arc<dyn CredentialProvider>, adapters: AdapterSet) -> Self {
        Self {
            db,
            credentials,
            adapters,
        }
    }

    /// Publish a single variant.
    ///
    /// Fails with `InvalidInput` before any network traffic when the variant
    /// is already published; its external ID is write-once. A successful
    /// publish also promotes the parent content item to published if it is
    /// not there yet.
    pub async fn publish_variant(&self, variant_id: &str) -> Result<PublishReport> {
        let variant = self
            .db
            .get_variant(variant_id)
            .await?
            .ok_or_else(|| OmnipostError::NotFound(format!("Variant {} not found", variant_id)))?;

        if variant.status == VariantStatus::Published {
            return Err(OmnipostError::InvalidInput(format!(
                "Variant {} is already published",
                variant_id
            )));
        }

        let content = self.db.get_content(&variant.content_id).await?.ok_or_else(|| {
            OmnipostError::NotFound(format!("Content {} not found", variant.content_id))
        })?;

        let credential = self
            .credentials
            .credential(&content.user_id, variant.network)
            .await?;

        let media = self.db.media_for_content(&content.id).await?;
        let text = variant.effective_text(&content.body);

        let outcome = self
            .adapters
            .publish(&credential, variant.network, text, &media)
            .await?;

        let now = Utc::now();
        let posted_date = now.format("%Y-%m-%d").to_string();
        let posted_time = now.format("%H:%M:%S").to_string();

        self.db
            .mark_variant_published(
                &variant.id,
                &outcome.external_id,
                outcome.permalink.as_deref(),
                &posted_date,
                &posted_time,
            )
            .await?;

        if content.status != ContentStatus::Published {
            self.db
                .set_content_status(&content.id, ContentStatus::Published)
                .await?;
        }

        tracing::info!(
            variant_id = %variant.id,
            network = %variant.network,
            external_id = %outcome.external_id,
            "Published variant"
        );

        Ok(PublishReport {
            variant_id: variant.id,
            network: variant.network,
            external_id: outcome.external_id,
            permalink: outcome.permalink,
        })
    }

    /// Publish every pending variant of a content item, isolating failures.
    ///
    /// Already-published and retired variants are skipped. One variant's
    /// failure never blocks the others; each outcome is reported separately.
    pub async fn publish_content(&self, content_id: &str) -> Result<Vec<VariantResult>> {
        // Existence check up front so a bad ID is an error, not an empty batch
        self.db
            .get_content(content_id)
            .await?
            .ok_or_else(|| OmnipostError::NotFound(format!("Content {} not found", content_id)))?;

        let variants = self.db.variants_for_content(content_id).await?;
        let mut results = Vec::new();

        for variant in variants {
            match variant.status {
                VariantStatus::Draft | VariantStatus::Queued => {}
                VariantStatus::Published | VariantStatus::DeletedOnPlatform => {
                    tracing::debug!(variant_id = %variant.id, status = %variant.status, "Skipping variant");
                    continue;
                }
            }

            let outcome = self.publish_variant(&variant.id).await;
            if let Err(err) = &outcome {
                tracing::error!(
                    variant_id = %variant.id,
                    network = %variant.network,
                    "Variant publish failed: {}",
                    err
                );
            }
            results.push(VariantResult {
                variant_id: variant.id,
                network: variant.network,
                outcome,
            });
        }

        Ok(results)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}
