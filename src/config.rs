//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::client::ReconnectPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Streaming client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Dashboard origin; the WebSocket scheme mirrors its scheme
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_path")]
    pub path: String,

    /// Health probe period; 0 disables probing
    #[serde(default = "default_health_interval")]
    pub health_interval_ms: u64,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_path() -> String {
    "/timeseries/live".to_string()
}

fn default_health_interval() -> u64 {
    30_000 // 30 seconds
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            path: default_path(),
            health_interval_ms: default_health_interval(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Create a config for a dashboard origin with default settings
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// WebSocket URL of the streaming endpoint
    ///
    /// `http` maps to `ws` and `https` to `wss`; `ws`/`wss` are kept.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            error: e.to_string(),
        })?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::UnsupportedScheme(url.scheme().to_string()))?;

        url.set_path(&self.path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    pub fn health_interval(&self) -> Option<Duration> {
        (self.health_interval_ms > 0).then(|| Duration::from_millis(self.health_interval_ms))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("liveseries").join("config.toml")),
            Some(PathBuf::from("/etc/liveseries/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Client overrides
        if let Some(base_url) = var("LIVESERIES_BASE_URL") {
            self.client.base_url = base_url;
        }
        if let Some(path) = var("LIVESERIES_PATH") {
            self.client.path = path;
        }
        if let Some(interval) = var("LIVESERIES_HEALTH_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.client.health_interval_ms = ms;
            }
        }
        if let Some(attempts) = var("LIVESERIES_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(n) = attempts.parse() {
                self.client.reconnect.max_attempts = n;
            }
        }

        // Logging overrides
        if let Some(level) = var("LIVESERIES_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LIVESERIES_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid base URL {url:?}: {error}")]
    InvalidUrl { url: String, error: String },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Liveseries Configuration
#
# Environment variables override these settings:
# - LIVESERIES_BASE_URL
# - LIVESERIES_PATH
# - LIVESERIES_HEALTH_INTERVAL_MS
# - LIVESERIES_MAX_RECONNECT_ATTEMPTS
# - LIVESERIES_LOG_LEVEL
# - LIVESERIES_LOG_FORMAT

[client]
# Dashboard origin (http -> ws, https -> wss)
base_url = "http://localhost:8080"

# Streaming endpoint path
path = "/timeseries/live"

# Health probe interval in milliseconds (0 disables)
health_interval_ms = 30000

[client.reconnect]
# First reconnect delay; doubles on every attempt
base_delay_ms = 1000

# Upper bound for a single delay
max_delay_ms = 30000

# Give up after this many consecutive attempts
max_attempts = 5

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
