use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the match monitor
#[derive(Error, Debug)]
pub enum WatchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Page extraction errors
    #[error("Extraction failed: {0}")]
    TransientExtraction(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Page capability unavailable: {0}")]
    BrowserUnavailable(String),

    // Orchestration errors
    #[error("Discovery cycle failed: {0}")]
    Discovery(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WatchError {
    /// Whether this error means the owning session's page is unusable.
    ///
    /// Everything else is handled locally: logged, backed off, retried on the
    /// next tick.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(self, WatchError::Navigation { .. })
    }
}

/// Result type alias for WatchError
pub type Result<T> = std::result::Result<T, WatchError>;

/// Bound a fallible future by `limit`, surfacing expiry as `WatchError::Timeout`.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(WatchError::Timeout {
            operation: operation.to_string(),
            elapsed_ms: limit.as_millis() as u64,
        }),
    }
}
