//! Configuration management for Omnipost

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub networks: NetworksConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworksConfig {
    pub bluesky: BlueskyConfig,
    pub instagram: InstagramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    pub service_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub graph_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    pub networks: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            networks: vec!["bluesky".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/omnipost/omnipost.db".to_string(),
            },
            networks: NetworksConfig {
                bluesky: BlueskyConfig {
                    service_url: "https://bsky.social".to_string(),
                },
                instagram: InstagramConfig {
                    graph_url: "https://graph.facebook.com/v21.0".to_string(),
                },
            },
            credentials: CredentialsConfig {
                path: "~/.config/omnipost/credentials.toml".to_string(),
            },
            defaults: DefaultsConfig::default(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("OMNIPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("omnipost").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("omnipost"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[database]
path = "/tmp/test.db"

[networks.bluesky]
service_url = "https://pds.example.test"

[networks.instagram]
graph_url = "https://graph.example.test/v21.0"

[credentials]
path = "/tmp/credentials.toml"

[defaults]
networks = ["bluesky", "instagram"]
"#
        )
        .unwrap();

        let config = Config::load_from_path(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.database.path, "/tmp/test.db");
        assert_eq!(
            config.networks.bluesky.service_url,
            "https://pds.example.test"
        );
        assert_eq!(
            config.networks.instagram.graph_url,
            "https://graph.example.test/v21.0"
        );
        assert_eq!(config.defaults.networks, vec!["bluesky", "instagram"]);
    }

    #[test]
    fn test_load_without_defaults_section() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[database]
path = "/tmp/test.db"

[networks.bluesky]
service_url = "https://pds.example.test"

[networks.instagram]
graph_url = "https://graph.example.test/v21.0"

[credentials]
path = "/tmp/credentials.toml"
"#
        )
        .unwrap();

        let config = Config::load_from_path(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.defaults.networks, vec!["bluesky"]);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let result = Config::load_from_path(&PathBuf::from("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_path_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not valid toml [[[").unwrap();

        let result = Config::load_from_path(&file.path().to_path_buf());
        assert!(result.is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_config_path_env_override() {
        std::env::set_var("OMNIPOST_CONFIG", "/tmp/omnipost-custom.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("OMNIPOST_CONFIG");

        assert_eq!(path, PathBuf::from("/tmp/omnipost-custom.toml"));
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_config_path_default_location() {
        std::env::remove_var("OMNIPOST_CONFIG");
        let path = resolve_config_path().unwrap();
        assert!(path.ends_with("omnipost/config.toml"));
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default_config();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(parsed.database.path, config.database.path);
        assert_eq!(parsed.defaults.networks, config.defaults.networks);
    }
}
