//! Error types for the NuGet client core.
//!
//! Errors fall into a few families that callers treat differently:
//! transport failures degrade read operations to empty results, malformed
//! responses always surface, and parse failures are hard errors at parse time.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the NuGet client.
#[derive(Debug, Error)]
pub enum NugetError {
    // Transport errors
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    // Protocol errors
    #[error("Malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    #[error("Service discovery failed for {url}: {message}")]
    DiscoveryFailed { url: String, message: String },

    // Version errors
    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Invalid version range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid package archive {path}: {message}")]
    Archive { path: PathBuf, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Operation errors
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("{operation} is not supported by source '{source_name}'")]
    Unsupported {
        operation: &'static str,
        source_name: String,
    },

    #[error("Operation was cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for NuGet operations.
pub type Result<T> = std::result::Result<T, NugetError>;

impl From<std::io::Error> for NugetError {
    fn from(err: std::io::Error) -> Self {
        NugetError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for NugetError {
    fn from(err: serde_json::Error) -> Self {
        NugetError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl NugetError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        NugetError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a malformed-response error naming the offending URL.
    pub fn malformed(url: impl Into<String>, message: impl Into<String>) -> Self {
        NugetError::MalformedResponse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Convert a reqwest failure into a transport error for `url`.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NugetError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            NugetError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            NugetError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Transport failures: the source could not be reached or refused the
    /// request. Read operations degrade these to an empty result.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            NugetError::Network { .. } | NugetError::HttpStatus { .. } | NugetError::Timeout { .. }
        )
    }

    /// Whether the server answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NugetError::HttpStatus { status: 404, .. })
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            NugetError::Network { .. } | NugetError::Timeout { .. } => true,
            NugetError::HttpStatus { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}
