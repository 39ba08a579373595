//! Error types for Lectern operations

use crate::EntityKind;
use thiserror::Error;

/// Failures reported by the document service boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Fetch of {kind} rejected: {reason}")]
    Rejected { kind: EntityKind, reason: String },

    #[error("Entity not found: {kind} with id {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("No signed-in user for a user-scoped request")]
    Unauthenticated,

    #[error("Fetch task for {key} aborted: {reason}")]
    Aborted { key: String, reason: String },
}

/// Durable storage failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Durable storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Persisted state is corrupted: {reason}")]
    Corrupted { reason: String },

    #[error("Persisted state version {found} does not match expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        PersistenceError::Io {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Corrupted {
            reason: e.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to install tracing subscriber: {reason}")]
    Telemetry { reason: String },
}

/// Master error type for all Lectern errors.
#[derive(Debug, Clone, Error)]
pub enum LecternError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Lectern operations.
pub type LecternResult<T> = Result<T, LecternError>;

// =============================================================================
// TESTS
// =============================================================================
