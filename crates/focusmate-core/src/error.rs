//! Core error types for focusmate-core.
//!
//! Every failure in this crate degrades functionality (lost recovery, lost
//! history entry) rather than crashing the host process, so each concern
//! gets its own `thiserror` enum and callers decide what to surface.

use std::path::PathBuf;
use thiserror::Error;

use crate::ledger::FocusSession;

/// Core error type for focusmate-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Durable key-value store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Timer engine errors
    #[error("Timer error: {0}")]
    Engine(#[from] EngineError),

    /// Session ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Session recording errors
    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
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

    /// The connection mutex was poisoned by a panicking writer
    #[error("Database connection poisoned")]
    Poisoned,
}

/// Errors from the durable key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing database failed
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// A stored value could not be parsed as the expected type
    #[error("Corrupt value for '{key}': {value:?}")]
    Corrupt { key: String, value: String },

    /// The store refused the write
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors reported by the timer engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A countdown is already running
    #[error("A focus session is already running")]
    AlreadyRunning,

    /// Requested duration was zero
    #[error("Duration must be greater than zero")]
    InvalidDuration,

    /// Persisting the running state failed; the countdown continues in memory only
    #[error("Failed to persist timer state: {0}")]
    PersistenceWriteFailed(#[source] StoreError),

    /// The timer actor has shut down and no longer accepts commands
    #[error("Timer actor is not running")]
    ActorStopped,
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

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// The data directory could not be created
    #[error("Data directory unavailable: {0}")]
    DataDir(#[source] std::io::Error),
}

/// Errors from a session ledger (remote or local cache).
#[derive(Error, Debug)]
pub enum LedgerError {
    /// HTTP transport failed
    #[error("Ledger request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Ledger returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Ledger base URL is missing or malformed
    #[error("Ledger not configured: {0}")]
    NotConfigured(String),

    /// Response body was not a session collection
    #[error("Malformed ledger response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Local cache failed
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Ledger refused the append
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Errors from recording a finished countdown.
#[derive(Error, Debug)]
pub enum RecordError {
    /// The session was credited locally but never reached the ledger.
    /// Not retried.
    #[error("Failed to push {} minute session to ledger: {source}", .session.duration_minutes)]
    LedgerPushFailed {
        session: FocusSession,
        #[source]
        source: LedgerError,
    },

    /// The local minute counter could not be advanced
    #[error("Failed to update local minute total: {0}")]
    CounterWriteFailed(#[source] StoreError),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}
