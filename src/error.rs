//! Error types for the signal relay

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Payload error: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Sink {sink} failed: {reason}")]
    Sink { sink: String, reason: String },

    #[error("Sink {sink} timed out after {after_ms}ms")]
    Timeout { sink: String, after_ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Inbound payload could not be interpreted at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported payload type: {0}")]
    UnsupportedPayload(&'static str),
}

/// Required fields absent or malformed in an alert
///
/// Reported back to the caller as-is. Never retried and never logged as a fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Missing required fields: {missing:?}")]
pub struct ValidationError {
    /// Fields the store requires
    pub required: Vec<String>,
    /// Required fields that were absent
    pub missing: Vec<String>,
    /// Fields present but carrying an unusable value
    pub invalid: Vec<String>,
    /// Keys that were present in the payload
    pub received: Vec<String>,
}

impl ValidationError {
    pub fn is_missing(&self, field: &str) -> bool {
        self.missing.iter().any(|f| f == field)
    }
}
