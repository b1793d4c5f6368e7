//! Error types for the publish crate.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the bus connection.
#[derive(Error, Debug)]
pub enum Error {
    /// MQTT client error.
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
