//! Core error types for howubeen-core.
//!
//! Only validation and storage failures are allowed to fail an operation
//! visibly. Enrichment and notification failures are recovered inside the
//! core and surface as flags on the returned data.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for howubeen-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Status code the ingestion HTTP surface reports for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            _ => 500,
        }
    }
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The store did not answer within the configured timeout
    #[error("Store operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// A stored value could not be decoded
    #[error("Corrupt value in column '{column}': {value}")]
    Corrupt { column: String, value: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Neither text nor a voice reference was supplied
    #[error("Either text input or a voice note is required")]
    EmptyCheckin,

    /// A required identifier was missing or blank
    #[error("Missing required field '{0}'")]
    MissingField(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Failure reported by an enrichment capability.
///
/// Never leaves the ingestor: every variant maps to a documented fallback.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("enrichment call timed out after {0}ms")]
    Timeout(u64),

    #[error("enrichment request failed: {0}")]
    Request(String),

    #[error("enrichment response was malformed: {0}")]
    Malformed(String),

    #[error("enrichment capability does not support {0}")]
    Unsupported(&'static str),
}

/// Failure reported by a notification capability for one recipient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("delivery timed out after {0}ms")]
    Timeout(u64),

    #[error("transport rejected message (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseBusy
                    || inner.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Store(err.into())
    }
}

impl From<reqwest::Error> for EnrichmentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EnrichmentError::Malformed(err.to_string())
        } else {
            EnrichmentError::Request(err.to_string())
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err: CoreError = ValidationError::EmptyCheckin.into();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn store_failure_maps_to_server_error() {
        let err: CoreError = StoreError::Timeout {
            operation: "upsert_checkin".into(),
            timeout_ms: 50,
        }
        .into();
        assert_eq!(err.http_status(), 500);
        assert!(err.to_string().contains("upsert_checkin"));
    }

    #[test]
    fn no_rows_is_a_query_failure() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::QueryFailed(_)));
    }
}
