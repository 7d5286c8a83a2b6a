use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub cloud_service_name: String,

    /// HS256 secret used to verify access tokens
    pub auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// Largest accepted edit patch, in bytes
    #[serde(default = "default_max_patch_bytes")]
    pub max_patch_bytes: usize,

    /// Longest accepted chat message, in characters
    #[serde(default = "default_max_chat_chars")]
    pub max_chat_chars: usize,

    /// Delay between the last accepted edit and the write-back
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,

    #[serde(default = "default_chat_rate_max")]
    pub chat_rate_max: u32,

    #[serde(default = "default_chat_rate_window_ms")]
    pub chat_rate_window_ms: u64,

    #[serde(default = "default_membership_cache_ttl_secs")]
    pub membership_cache_ttl_secs: u64,

    /// Events queued per connection before it counts as lagging
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,
}

/// Limits enforced by the collaboration core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_patch_bytes: usize,
    pub max_chat_chars: usize,
    pub persist_debounce: Duration,
    pub chat_rate_max: u32,
    pub chat_rate_window: Duration,
    pub outbound_queue: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Config::default().limits()
    }
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_patch_bytes: self.max_patch_bytes,
            max_chat_chars: self.max_chat_chars,
            persist_debounce: Duration::from_millis(self.persist_debounce_ms),
            chat_rate_max: self.chat_rate_max,
            chat_rate_window: Duration::from_millis(self.chat_rate_window_ms),
            outbound_queue: self.outbound_queue_size,
        }
    }

    pub fn membership_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.membership_cache_ttl_secs)
    }

    /// Parsed CORS origins, empty when none are configured
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            cloud_service_name: default_service_name(),
            auth_jwt_secret: None,
            db_url: None,
            max_patch_bytes: default_max_patch_bytes(),
            max_chat_chars: default_max_chat_chars(),
            persist_debounce_ms: default_persist_debounce_ms(),
            chat_rate_max: default_chat_rate_max(),
            chat_rate_window_ms: default_chat_rate_window_ms(),
            membership_cache_ttl_secs: default_membership_cache_ttl_secs(),
            outbound_queue_size: default_outbound_queue_size(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "colabri-room".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_max_patch_bytes() -> usize {
    50 * 1024
}

fn default_max_chat_chars() -> usize {
    2000
}

fn default_persist_debounce_ms() -> u64 {
    2500
}

fn default_chat_rate_max() -> u32 {
    5
}

fn default_chat_rate_window_ms() -> u64 {
    1000
}

fn default_membership_cache_ttl_secs() -> u64 {
    30
}

fn default_outbound_queue_size() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_protocol_constants() {
        let limits = Limits::default();
        assert_eq!(limits.max_patch_bytes, 51_200);
        assert_eq!(limits.max_chat_chars, 2000);
        assert_eq!(limits.persist_debounce, Duration::from_millis(2500));
        assert_eq!(limits.chat_rate_max, 5);
        assert_eq!(limits.chat_rate_window, Duration::from_millis(1000));
        assert_eq!(limits.outbound_queue, 256);
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = Config {
            cors_origins: Some("http://localhost:3000, https://app.example.com,,".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.cors_origin_list(),
            vec!["http://localhost:3000".to_string(), "https://app.example.com".to_string()]
        );
        assert!(Config::default().cors_origin_list().is_empty());
    }
}
