//! # Error Types
//!
//! Custom error types for Swarm Flock using `thiserror`.

use thiserror::Error;

/// Main error type for Swarm Flock
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Shared snapshot frame could not be decoded (torn or corrupt read)
    #[error("Snapshot decode error: {0}")]
    Decode(String),

    /// Encoded snapshot does not fit in the shared region
    #[error("Snapshot of {size} bytes exceeds region capacity of {capacity} bytes")]
    CapacityExceeded { size: usize, capacity: usize },

    /// Shared region could not be created, attached or sized
    #[error("Shared region error: {0}")]
    Region(String),

    /// Flight actuator rejected or failed a command
    #[error("Actuator error: {0}")]
    Actuator(String),

    /// Telemetry source failure
    #[error("Telemetry source error: {0}")]
    Telemetry(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Swarm Flock
pub type Result<T> = std::result::Result<T, SwarmError>;
