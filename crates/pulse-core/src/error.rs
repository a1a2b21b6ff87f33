// Error types for the aggregation core
//
// I/O-origin errors are caught at the boundary of the component that issued
// the call and folded into that component's state. These types are what the
// state records and what fallible entry points hand back to the caller.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors raised by an external data source (HTTP endpoint, push channel, probe)
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure (connection refused, DNS, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The operation did not finish within its bound
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The payload could not be decoded into the expected shape
    #[error("decode error: {0}")]
    Decode(String),

    /// The push channel failed or ended
    #[error("channel error: {0}")]
    Channel(String),
}

impl SourceError {
    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        SourceError::Decode(msg.into())
    }

    /// Create a channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        SourceError::Channel(msg.into())
    }

    /// Whether this error came from a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            SourceError::Timeout(_) => true,
            SourceError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Decode(e.to_string())
    }
}

/// Errors reported by [`ActivityLogQuery`](crate::activity_log::ActivityLogQuery)
#[derive(Debug, Error)]
pub enum QueryError {
    /// The page fetch failed; the previous page is still displayed
    #[error("failed to load activity page {page}: {source}")]
    Fetch {
        page: u32,
        #[source]
        source: SourceError,
    },

    /// Page size must be at least one row
    #[error("invalid page size: {0}")]
    InvalidPageSize(u32),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}
