//! Application configuration

use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::AisStreamerError;
use crate::models::{Mmsi, TrackedMmsis};

pub const DEFAULT_FEED_URI: &str = "wss://stream.aisstream.io/v0/stream";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub database: DatabaseConfig,
    pub health: HealthConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub uri: String,
    /// aisstream.io API key, sent in every subscription
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub tracked_mmsis: Vec<u32>,
    /// Fixed pause between a session ending and the next connection attempt
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub reconnect_delay: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub connect_timeout: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub ping_interval: Duration,
    /// How long to wait for a pong before the connection is considered dead
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub ping_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    pub bind: SocketAddr,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("feed.uri", DEFAULT_FEED_URI)?
            .set_default("feed.reconnect_delay", 500)?
            .set_default("feed.connect_timeout", 10)?
            .set_default("feed.ping_interval", 20)?
            .set_default("feed.ping_timeout", 20)?
            .set_default("database.max_connections", 5)?
            .set_default("database.run_migrations", true)?
            .set_default("health.bind", "0.0.0.0:8080")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("AISSTREAMER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("feed.tracked_mmsis"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration parameters
    ///
    /// Any failure here is fatal: the process must not start.
    pub fn validate(&self) -> Result<(), AisStreamerError> {
        self.feed.validate()?;
        self.database.validate()?;
        Ok(())
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), AisStreamerError> {
        if self.api_key.trim().is_empty() {
            return Err(AisStreamerError::ConfigurationError {
                message: "Feed API key is required".to_string(),
            });
        }
        if self.uri.is_empty() {
            return Err(AisStreamerError::ConfigurationError {
                message: "Feed URI cannot be empty".to_string(),
            });
        }
        if self.ping_interval.is_zero() || self.ping_timeout.is_zero() {
            return Err(AisStreamerError::ConfigurationError {
                message: "Ping interval and timeout must be greater than zero".to_string(),
            });
        }
        self.tracked()?;
        Ok(())
    }

    /// Build the tracked MMSI set, rejecting an empty list or invalid values
    pub fn tracked(&self) -> Result<TrackedMmsis, AisStreamerError> {
        if self.tracked_mmsis.is_empty() {
            return Err(AisStreamerError::ConfigurationError {
                message: "At least one tracked MMSI is required".to_string(),
            });
        }
        self.tracked_mmsis
            .iter()
            .map(|&value| Mmsi::try_from(value))
            .collect::<Result<TrackedMmsis, _>>()
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), AisStreamerError> {
        if self.url.trim().is_empty() {
            return Err(AisStreamerError::ConfigurationError {
                message: "Database URL is required".to_string(),
            });
        }
        if self.max_connections == 0 {
            return Err(AisStreamerError::ConfigurationError {
                message: "Database pool needs at least one connection".to_string(),
            });
        }
        Ok(())
    }
}
