//! Error types for daybook-core

use std::fmt;

use thiserror::Error;

use crate::util::body_excerpt;

/// Result type alias using daybook-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Why an in-flight request was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The request outlived its timeout.
    Timeout,
    /// A newer request to the same URL replaced it.
    Superseded,
    /// The session was torn down.
    Shutdown,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timeout => "timed out",
            Self::Superseded => "superseded by a newer request",
            Self::Shutdown => "aborted on shutdown",
        };
        formatter.write_str(label)
    }
}

/// Errors that can occur in daybook-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Connectivity failure or a 5xx response
    #[error("Network error: {0}")]
    Network(String),

    /// Request aborted before completion
    #[error("Request {0}")]
    Cancelled(CancelCause),

    /// Session credential rejected (401)
    #[error("Not authenticated")]
    AuthInvalid,

    /// Resource missing (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Corrupt cached JSON or unexpected payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Malformed input rejected locally or by the API (400)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Too many attempts (429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Any other non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Local store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl Error {
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Cancelled(CancelCause::Timeout))
    }

    pub const fn is_auth_invalid(&self) -> bool {
        matches!(self, Self::AuthInvalid)
    }

    /// Map a non-success HTTP status and its body onto the error taxonomy.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = parse_api_error(status, body);
        match status {
            401 => Self::AuthInvalid,
            404 => Self::NotFound(message),
            400 | 422 => Self::Validation(message),
            429 => Self::RateLimited(message),
            500..=599 => Self::Network(message),
            _ => Self::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Cancelled(CancelCause::Timeout)
        } else if error.is_decode() {
            Self::Parse(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

/// Errors raised by a local key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: u16, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return format!("{} ({status})", message.trim());
        }
    }

    let trimmed = body_excerpt(body);
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("{trimmed} ({status})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert!(Error::from_status(401, "").is_auth_invalid());
        assert!(matches!(
            Error::from_status(404, r#"{"error":"History not found"}"#),
            Error::NotFound(message) if message == "History not found (404)"
        ));
        assert!(matches!(
            Error::from_status(400, "bad"),
            Error::Validation(_)
        ));
        assert!(matches!(Error::from_status(503, ""), Error::Network(_)));
        assert!(matches!(
            Error::from_status(418, ""),
            Error::Api { status: 418, .. }
        ));
    }

    #[test]
    fn cancellation_helpers() {
        let timeout = Error::Cancelled(CancelCause::Timeout);
        assert!(timeout.is_cancellation());
        assert!(timeout.is_timeout());
        assert!(!Error::Cancelled(CancelCause::Superseded).is_timeout());
        assert_eq!(timeout.to_string(), "Request timed out");
    }
}
