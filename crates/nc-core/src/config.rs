use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::options::{AdvertisingOptions, ConnectionOptions, DiscoveryOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Name of the serializer thread
    pub serializer_thread_name: String,
    /// Pending-task depth above which submissions log a warning
    pub queue_warn_depth: u64,
    /// `tracing` filter directive for binaries
    pub log_filter: String,

    // Default options handed out by the facade
    pub advertising: AdvertisingOptions,
    pub discovery: DiscoveryOptions,
    pub connection: ConnectionOptions,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            serializer_thread_name: "nc-serializer".to_string(),
            queue_warn_depth: 256,
            log_filter: "info".to_string(),
            advertising: AdvertisingOptions::default(),
            discovery: DiscoveryOptions::default(),
            connection: ConnectionOptions::default(),
        }
    }
}

impl RouterConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let config: RouterConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        info!("loaded router config from {}", path.display());
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("NC_SERIALIZER_THREAD") {
            config.serializer_thread_name = name;
        }
        if let Ok(depth) = std::env::var("NC_QUEUE_WARN_DEPTH") {
            if let Ok(depth) = depth.parse::<u64>() {
                config.queue_warn_depth = depth;
            }
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            config.log_filter = filter;
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serializer_thread_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "serializer_thread_name must not be empty".to_string(),
            ));
        }
        if self.queue_warn_depth == 0 {
            return Err(ConfigError::ValidationError(
                "queue_warn_depth must be at least 1".to_string(),
            ));
        }
        let connection = self.connection.compatible_options();
        if connection.keep_alive_interval_millis >= connection.keep_alive_timeout_millis {
            return Err(ConfigError::ValidationError(format!(
                "keep-alive interval ({} ms) must be below the timeout ({} ms)",
                connection.keep_alive_interval_millis, connection.keep_alive_timeout_millis
            )));
        }
        Ok(())
    }
}
