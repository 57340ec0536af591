//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::auth::AuthConfig;
use super::limits::LimitsConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Forum configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity and listen address.
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Login domains, sessions and login throttling.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Upload storage.
    #[serde(default)]
    pub media: MediaConfig,
    /// Outbound link preview fetching for chat messages.
    #[serde(default)]
    pub link_preview: LinkPreviewConfig,
    /// Page sizes for listings.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Site name shown in responses and logs.
    pub name: String,
    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Serve Prometheus metrics on `/metrics` (default: true).
    #[serde(default = "default_true")]
    pub metrics: bool,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

pub(super) fn default_true() -> bool {
    true
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "stdforum.db".to_string()
}

/// Upload storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Directory uploaded photos, chat images and files are written to.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Maximum accepted request body for uploads (default: 10 MiB).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("media")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

/// Link preview fetching configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkPreviewConfig {
    /// Fetch page metadata for link messages (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Request timeout in seconds (default: 5).
    #[serde(default = "default_preview_timeout")]
    pub timeout_secs: u64,
    /// User-Agent header sent with preview requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Stop reading the page after this many bytes (default: 512 KiB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for LinkPreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_preview_timeout(),
            user_agent: default_user_agent(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_preview_timeout() -> u64 {
    5
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; stdforum-link-preview/0.1)".to_string()
}

fn default_max_body_bytes() -> usize {
    512 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml(
            r#"
[server]
name = "stdforum"
"#,
        )
        .unwrap();

        assert_eq!(config.server.listen, default_listen());
        assert!(config.server.metrics);
        assert_eq!(config.database.path, "stdforum.db");
        assert_eq!(config.media.upload_dir, PathBuf::from("media"));
        assert_eq!(config.media.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.link_preview.enabled);
        assert_eq!(config.link_preview.timeout_secs, 5);
        assert_eq!(config.limits.messages_per_page, 50);
    }

    #[test]
    fn full_config_parses() {
        let config = Config::from_toml(
            r#"
[server]
name = "campus"
listen = "0.0.0.0:9000"
metrics = false

[database]
path = ":memory:"

[auth]
allowed_email_domains = ["khec.edu.np", "khwopa.edu.np"]
session_ttl_hours = 12

[media]
upload_dir = "/var/lib/stdforum/media"
max_upload_bytes = 1024

[link_preview]
enabled = false

[limits]
communities_per_page = 6
"#,
        )
        .unwrap();

        assert_eq!(config.server.listen.port(), 9000);
        assert!(!config.server.metrics);
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.auth.allowed_email_domains.len(), 2);
        assert_eq!(config.auth.session_ttl_hours, 12);
        assert_eq!(config.media.max_upload_bytes, 1024);
        assert!(!config.link_preview.enabled);
        assert_eq!(config.limits.communities_per_page, 6);
        assert_eq!(config.limits.members_per_page, 20);
    }

    #[test]
    fn missing_server_section_is_an_error() {
        assert!(matches!(
            Config::from_toml("[database]\npath = \"x.db\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reports_io_errors() {
        assert!(matches!(
            Config::load("/nonexistent/stdforum.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
