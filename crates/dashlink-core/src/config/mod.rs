//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from an
//! optional TOML file overlaid with `DASHLINK__*` environment variables.
//! Each sub-module represents a logical configuration section.

pub mod channel;
pub mod endpoint;
pub mod logging;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::channel::ChannelConfig;
pub use self::endpoint::EndpointConfig;
pub use self::logging::{LogFormat, LoggingConfig};

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reconnect and heartbeat tuning for the channel manager.
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Where the dashboard event stream lives.
    #[serde(default)]
    pub endpoint: EndpointConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file and the environment.
    ///
    /// The file is optional; environment variables prefixed with
    /// `DASHLINK__` (e.g. `DASHLINK__CHANNEL__HEARTBEAT_TIMEOUT_MS`) override it.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("DASHLINK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), AppError> {
        self.channel.validate()?;
        self.endpoint.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = AppConfig::load("does/not/exist/dashlink").expect("defaults");
        assert_eq!(config.channel.max_reconnect_attempts, 10);
        assert_eq!(config.endpoint.path, "/api/ws/dashboard");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.channel.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
