//! Error types for the paper-trading engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the paper-trading engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Market feed errors
    #[error("Feed error ({feed}): {message}")]
    Feed { feed: String, message: String },

    #[error("Feed timeout after {0}ms")]
    FeedTimeout(u64),

    #[error("Rate limited by {feed}, retry after {retry_after_ms}ms")]
    RateLimited { feed: String, retry_after_ms: u64 },

    #[error("Unusable payload from {feed}: {message}")]
    Data { feed: String, message: String },

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    // Engine errors
    #[error("Invariant violated: {0}")]
    Logic(String),

    #[error("Cycle cancelled during {0}")]
    Cancelled(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Feed { .. }
                | Error::FeedTimeout(_)
                | Error::RateLimited { .. }
                | Error::Storage(_)
        )
    }

    /// Logic errors abort the current user's cycle; everything else is
    /// captured into the cycle's error list and the cycle continues.
    pub fn is_logic(&self) -> bool {
        matches!(self, Error::Logic(_))
    }

    /// Shorthand for a feed error
    pub fn feed(feed: impl Into<String>, message: impl ToString) -> Self {
        Error::Feed {
            feed: feed.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for an unusable-payload error
    pub fn data(feed: impl Into<String>, message: impl ToString) -> Self {
        Error::Data {
            feed: feed.into(),
            message: message.to_string(),
        }
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::FeedTimeout(0)
        } else {
            Error::Feed {
                feed: e
                    .url()
                    .and_then(|u| u.host_str().map(|h| h.to_string()))
                    .unwrap_or_else(|| "http".to_string()),
                message: e.to_string(),
            }
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::feed("gecko", "503").is_retryable());
        assert!(Error::RateLimited {
            feed: "dexscreener".to_string(),
            retry_after_ms: 2000
        }
        .is_retryable());
        assert!(!Error::Config("missing cron secret".to_string()).is_retryable());
        assert!(!Error::Logic("negative capital".to_string()).is_retryable());
    }

    #[test]
    fn test_logic_classification() {
        assert!(Error::Logic("pnl mismatch".to_string()).is_logic());
        assert!(!Error::Storage("write failed".to_string()).is_logic());
    }
}
