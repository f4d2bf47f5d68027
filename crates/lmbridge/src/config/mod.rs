use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{BridgeError, Result};

/// Main configuration structure for lmbridge
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Inbound HTTP server configuration
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// OpenAI-compatible backend configuration
    #[serde(default)]
    pub backend: BackendConfig,
    /// Streaming translation behaviour
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Config {
    /// Check values that serde cannot validate on its own
    pub fn validate(&self) -> Result<()> {
        self.proxy
            .listen_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                BridgeError::Config(format!(
                    "Invalid listen address '{}': {e}",
                    self.proxy.listen_addr
                ))
            })?;

        let url = Url::parse(&self.backend.url).map_err(|e| {
            BridgeError::Config(format!("Invalid backend URL '{}': {e}", self.backend.url))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(BridgeError::Config(format!(
                "Unsupported backend URL scheme '{}': only http and https are allowed",
                url.scheme()
            )));
        }

        Ok(())
    }
}

/// HTTP proxy server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// How message ids are generated when the backend does not supply one
    #[serde(default)]
    pub id_strategy: IdStrategy,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            id_strategy: IdStrategy::default(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Message id generation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Random v4 UUIDs
    #[default]
    Uuid,
    /// Process-local increasing counter
    Sequential,
}

/// Backend (OpenAI-compatible chat completions server) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend, without the `/v1/...` suffix
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Timeout for the `/health` probe in seconds
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            health_timeout_secs: default_health_timeout_secs(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:1234".to_string()
}

fn default_health_timeout_secs() -> u64 {
    5
}

/// Streaming translation configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamConfig {
    /// Emit a `message_stop` event when the backend stream ends without
    /// ever sending `finish_reason: "stop"`
    #[serde(default)]
    pub synthesize_message_stop: bool,
}

/// Load configuration from an explicit path or the default locations.
///
/// Falls back to [`Config::default`] when no file is found.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_path {
        tracing::info!("Loading config from: {}", path.display());
        return read_config_file(path);
    }

    for path in default_config_paths().iter() {
        if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            return read_config_file(path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".lmbridge").join("config.toml")),
        dirs::config_dir().map(|c| c.join("lmbridge").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn read_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        BridgeError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    toml::from_str(&content).map_err(|e| BridgeError::Config(format!("Failed to parse config: {e}")))
}
