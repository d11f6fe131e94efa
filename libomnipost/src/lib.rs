//! Omnipost - scheduled multi-network publishing
//!
//! This library provides the core pipeline for composing content once,
//! scheduling it, delivering per-network variants through adapters, and
//! reconciling engagement metrics back from the networks.

pub mod adapters;
pub mod config;
pub mod credentials;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod reconcile;
pub mod scanner;
pub mod scheduling;
pub mod transform;
pub mod types;

// Re-export commonly used types
pub use adapters::{AdapterSet, Network};
pub use config::Config;
pub use credentials::{Credential, CredentialProvider, FileCredentialProvider};
pub use db::{Database, PublishedVariant, QueueStats};
pub use dispatcher::{Dispatcher, PublishReport, VariantResult};
pub use error::{OmnipostError, Result};
pub use reconcile::{ReconcileEngine, ReconcileReport};
pub use scanner::{ScanReport, Scanner};
pub use types::{ContentItem, ContentStatus, MediaKind, MediaRef, Metric, Schedule, Variant, VariantStatus};
