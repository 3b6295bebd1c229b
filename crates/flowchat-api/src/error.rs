//! Error types for flowchat-api

use thiserror::Error;

/// Result type alias using flowchat-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the chat server
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server answered with a non-success status or an `{"error": ...}` body
    #[error("API error: {message} (status: {status:?})")]
    Api {
        status: Option<u16>,
        message: String,
    },

    /// A stream frame could not be decoded
    #[error("Frame error: {0}")]
    Frame(String),

    /// Frame bytes were not valid UTF-8
    #[error("Invalid UTF-8 in stream: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from an optional status and a message
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is worth retrying when opening a stream
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            Error::Api {
                status: Some(status),
                ..
            } => *status == 429 || (500..600).contains(status),
            Error::Api {
                status: None,
                message,
            } => {
                let msg = message.to_lowercase();
                msg.contains("overloaded")
                    || msg.contains("rate limit")
                    || msg.contains("too many requests")
            }
            _ => false,
        }
    }
}
