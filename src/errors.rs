//! Errors for AIS streamer
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum AisStreamerError {
    #[error("WebSocket connection failed: {0}")]
    ConnectionError(#[source] tungstenite::Error),

    #[error("WebSocket connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Failed to send subscription: {0}")]
    SubscriptionError(#[source] tungstenite::Error),

    #[error("Feed stream closed: {0}")]
    StreamClosed(String),

    #[error("No pong received within {0:?}")]
    KeepaliveTimeout(Duration),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Invalid MMSI: {0}")]
    InvalidMmsi(String),

    #[error("Position report has no identifier")]
    MissingIdentifier,

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

impl AisStreamerError {
    /// Whether the error ends a feed session and sends the supervisor into backoff
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_)
                | Self::ConnectTimeout(_)
                | Self::SubscriptionError(_)
                | Self::StreamClosed(_)
                | Self::KeepaliveTimeout(_)
        )
    }
}
