//! Common error types for YTPB

use thiserror::Error;

/// Common result type for YTPB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across YTPB crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed TOML configuration file
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON settings
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input to a helper that only accepts well-formed arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Event type string is not one of the known extension event types
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// Player API script could not be loaded
    #[error("API load error: {0}")]
    ApiLoad(String),

    /// Player could not be instantiated or never became ready
    #[error("Player setup error: {0}")]
    PlayerSetup(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
