//! Domain error types
//!
//! This module defines the error hierarchy for gridstats. Per-source failures
//! (`FetchFailed`, `MalformedSource`) are isolated by the orchestrator and turn
//! into degraded sources; only reconciliation and storage errors fail a run.
//! Third-party error types are flattened into strings at this boundary.

use thiserror::Error;

/// Main gridstats error type
#[derive(Debug, Error)]
pub enum GridError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A source key that the registry does not know about
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Retrieving a source artifact failed (after retries, if transient)
    #[error("Fetch failed for source '{source_key}': {error}")]
    FetchFailed {
        source_key: String,
        error: FetchError,
    },

    /// The artifact does not have the shape its adapter expects
    #[error("Malformed source '{source_key}': {message}")]
    MalformedSource { source_key: String, message: String },

    /// Strict agreement was required and no tie-break was possible
    #[error("Unresolvable conflict for {key}: {message}")]
    UnresolvableConflict { key: String, message: String },

    /// Structural failure inside the reconciler (e.g. incompatible units)
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    /// Writing, validating or publishing a snapshot candidate failed
    #[error("Storage commit failed: {0}")]
    StorageCommitFailed(String),

    /// Generic storage errors outside a commit
    #[error("Storage error: {0}")]
    Storage(String),

    /// State management errors
    #[error("State management error: {0}")]
    State(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// The run was cancelled by a shutdown signal
    #[error("Run cancelled")]
    Cancelled,

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl GridError {
    /// Shorthand for a `MalformedSource` error
    pub fn malformed(source_key: impl Into<String>, message: impl Into<String>) -> Self {
        GridError::MalformedSource {
            source_key: source_key.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a `FetchFailed` error
    pub fn fetch_failed(source_key: impl Into<String>, error: FetchError) -> Self {
        GridError::FetchFailed {
            source_key: source_key.into(),
            error,
        }
    }

    /// Whether this error is isolated to a single source
    pub fn is_source_scoped(&self) -> bool {
        matches!(
            self,
            GridError::FetchFailed { .. } | GridError::MalformedSource { .. }
        )
    }
}

/// Transport-level fetch errors
///
/// Classified into transient (retried) and permanent (reported immediately).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Could not connect to the endpoint
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Upstream asked us to slow down (429)
    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx other than 429)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// The response body was empty
    #[error("Empty response body")]
    EmptyResponse,

    /// Local artifact could not be read
    #[error("Local artifact unavailable: {0}")]
    LocalFile(String),

    /// Location could not be interpreted as a URL or path
    #[error("Invalid location: {0}")]
    InvalidLocation(String),
}

impl FetchError {
    /// Whether a retry could reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout(_)
                | FetchError::ConnectionFailed(_)
                | FetchError::RateLimited(_)
                | FetchError::ServerError { .. }
        )
    }
}

impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        GridError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GridError {
    fn from(err: toml::de::Error) -> Self {
        GridError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_error_display() {
        let err = GridError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_fetch_failed_display_includes_source() {
        let err = GridError::fetch_failed(
            "ember",
            FetchError::ServerError {
                status: 503,
                message: "unavailable".to_string(),
            },
        );
        let text = err.to_string();
        assert!(text.contains("ember"));
        assert!(text.contains("503"));
    }

    #[test]
    fn test_fetch_error_classification() {
        assert!(FetchError::Timeout("30s".to_string()).is_transient());
        assert!(FetchError::RateLimited("429".to_string()).is_transient());
        assert!(FetchError::ServerError {
            status: 502,
            message: String::new()
        }
        .is_transient());

        assert!(!FetchError::ClientError {
            status: 404,
            message: String::new()
        }
        .is_transient());
        assert!(!FetchError::EmptyResponse.is_transient());
        assert!(!FetchError::LocalFile("missing".to_string()).is_transient());
    }

    #[test]
    fn test_source_scoped_errors() {
        assert!(GridError::malformed("iea", "bad header").is_source_scoped());
        assert!(!GridError::StorageCommitFailed("disk full".to_string()).is_source_scoped());
        assert!(!GridError::Cancelled.is_source_scoped());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: GridError = io_err.into();
        assert!(matches!(err, GridError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: GridError = json_err.into();
        assert!(matches!(err, GridError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: GridError = toml_err.into();
        assert!(matches!(err, GridError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }
}
