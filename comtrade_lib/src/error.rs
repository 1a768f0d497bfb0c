//! Error types for the library layer.

use std::fmt;
use std::path::PathBuf;

/// Failures of the on-disk result cache. These are never retried.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache entry {path} (removed): {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode cache entry {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors produced by the library layer, wrapping upstream API errors
/// and adding retry, cache, serialization, and input validation failures.
#[derive(Debug)]
pub enum ComtradeError {
    /// The service rejected the request (non-throttling status or error payload).
    Api(comtrade_api::Error),
    /// Transient failures persisted past the attempt bound.
    RetriesExhausted { attempts: u32, last_error: String },
    /// The result cache could not be read or written.
    Cache(CacheError),
    /// JSON serialization or deserialization failed.
    Serialization(serde_json::Error),
    /// User-provided input failed validation.
    InvalidInput(String),
    /// Configuration file or directory setup failed.
    Config(String),
}

impl fmt::Display for ComtradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(e) => write!(f, "API error: {}", e),
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "I/O failure: request still failing after {} attempts: {}",
                attempts, last_error
            ),
            Self::Cache(e) => write!(f, "Cache error: {}", e),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ComtradeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Api(e) => Some(e),
            Self::Cache(e) => Some(e),
            Self::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<comtrade_api::Error> for ComtradeError {
    fn from(e: comtrade_api::Error) -> Self {
        Self::Api(e)
    }
}

impl From<CacheError> for ComtradeError {
    fn from(e: CacheError) -> Self {
        Self::Cache(e)
    }
}

impl From<serde_json::Error> for ComtradeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}
