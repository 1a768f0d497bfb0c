//! Error types for the API client.

/// Errors that can occur when making API requests.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request never produced a response (connection refused, DNS, reset).
    #[error("Request failed: {0}")]
    Transport(String),
    /// The request exceeded the configured timeout.
    #[error("Request timed out")]
    Timeout,
    /// The service throttled the caller (HTTP 429 or a 429 error payload).
    #[error("Rate limited by Comtrade API: {message}")]
    RateLimited { message: String },
    /// The API returned a non-success, non-throttling status.
    #[error("Request failed with status {status}: {message}")]
    HttpStatus { status: u16, message: String },
    /// The API answered 200 but the body carried a structured error payload.
    #[error("Comtrade API error {code}: {message}")]
    Service { code: i64, message: String },
    /// The response body could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl Error {
    /// Transient conditions worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Timeout | Error::RateLimited { .. }
        )
    }
}
