//! Credential resolution for network adapters
//!
//! The pipeline never manages account linking itself; it asks a
//! [`CredentialProvider`] for a valid access credential per (user, network)
//! pair. The shipped implementation reads a TOML credentials file; tests use
//! an in-memory provider.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::adapters::Network;
use crate::error::{PlatformError, Result};

/// A valid access credential for one (user, network) pair.
///
/// `account_id` is the network-side account handle: the Bluesky DID or
/// handle, or the Graph API account id.
#[derive(Debug, Clone)]
pub struct Credential {
    pub account_id: String,
    pub access_token: String,
}

/// Yields access credentials for publish and listing calls.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve the credential for `user_id` on `network`.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Credential` when no account is linked for the
    /// pair, or the stored credential is unusable.
    async fn credential(&self, user_id: &str, network: Network) -> Result<Credential>;
}

#[derive(Debug, Deserialize)]
struct CredentialEntry {
    account_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    users: HashMap<String, HashMap<String, CredentialEntry>>,
}

/// Reads credentials from a TOML file keyed `[users.<user>.<network>]`.
pub struct FileCredentialProvider {
    credentials: CredentialFile,
}

impl FileCredentialProvider {
    /// Load the credentials file at `path`, expanding `~`.
    pub fn load(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path).to_string();
        Self::load_from_path(Path::new(&expanded))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PlatformError::Credential(format!(
                "Failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        let credentials: CredentialFile = toml::from_str(&content).map_err(|e| {
            PlatformError::Credential(format!(
                "Failed to parse credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { credentials })
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    async fn credential(&self, user_id: &str, network: Network) -> Result<Credential> {
        let entry = self
            .credentials
            .users
            .get(user_id)
            .and_then(|networks| networks.get(network.as_str()))
            .ok_or_else(|| {
                PlatformError::Credential(format!(
                    "No {} account linked for user '{}'",
                    network, user_id
                ))
            })?;

        Ok(Credential {
            account_id: entry.account_id.clone(),
            access_token: entry.access_token.clone(),
        })
    }
}

/// In-memory credential provider for tests.
#[derive(Default)]
pub struct StaticCredentialProvider {
    entries: HashMap<(String, Network), Credential>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user_id: &str, network: Network, credential: Credential) {
        self.entries
            .insert((user_id.to_string(), network), credential);
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credential(&self, user_id: &str, network: Network) -> Result<Credential> {
        self.entries
            .get(&(user_id.to_string(), network))
            .cloned()
            .ok_or_else(|| {
                PlatformError::Credential(format!(
                    "No {} account linked for user '{}'",
                    network, user_id
                ))
                .into()
            })
    }
}
