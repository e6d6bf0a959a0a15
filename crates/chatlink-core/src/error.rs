//! Error types for chatlink.

use thiserror::Error;

/// Core error type, one variant per failure category so callers can
/// decide surface-vs-fatal per kind instead of matching on strings.
#[derive(Error, Debug)]
pub enum ChatLinkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Permission denied: {0}")]
    Auth(String),

    #[error("{0}")]
    Policy(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChatLinkError>;
