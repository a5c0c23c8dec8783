//! Core error types for schedalarm-core.
//!
//! Four failure classes cross the public API: using the engine before
//! `init()`, rejected arguments, lookups of unknown schedules or groups,
//! and storage I/O. Storage failures are surfaced as-is -- retry policy
//! belongs to the embedder, not the engine.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for schedalarm-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The manager was used before `init()` completed.
    #[error("schedule manager not initialized")]
    NotInitialized,

    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    /// A schedule or group lookup came up empty.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Underlying store I/O error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Validation errors raised synchronously by the coordinator.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Duration must be a positive number of minutes.
    #[error("duration must be positive, got {0}")]
    NonPositiveDuration(i64),

    /// The schedule tag is the caller-stable identity and may not be empty.
    #[error("schedule tag must not be empty")]
    EmptyTag,

    /// Start times more than 24 hours in the past are rejected.
    #[error("start time is more than 24 hours in the past: {0}")]
    StartTooOld(chrono::DateTime<chrono::Utc>),

    /// The no-repeat placeholder is reserved but not implemented.
    #[error("repeat kind '{0}' is not supported")]
    UnsupportedRepeatKind(String),

    /// A second callback was registered without opting into replacement.
    #[error("change callback has already been set")]
    CallbackAlreadySet,
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the database file.
    #[error("failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The data directory could not be resolved or created.
    #[error("failed to prepare data directory: {0}")]
    DataDir(#[from] std::io::Error),

    /// Query execution failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed.
    #[error("database migration failed: {0}")]
    MigrationFailed(String),

    /// The database is locked by another writer.
    #[error("database is locked")]
    Locked,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

/// Result type alias for CoreError.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
