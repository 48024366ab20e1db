//! Core error types for ascend-core.
//!
//! Every fallible boundary of the library has its own thiserror enum so the
//! caller can tell validation failures, state conflicts, persistence
//! failures and best-effort delivery failures apart.

use std::path::PathBuf;
use thiserror::Error;

use crate::focus::CompletionStage;

/// Reasons a focus session start is rejected.
///
/// All of these are raised synchronously, before the registry is touched
/// (duration) or without mutating it (conflicts).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("Duration must be between {min} and {max} minutes (got {got})")]
    DurationOutOfRange { min: u32, max: u32, got: u32 },

    #[error("{0}")]
    AlreadyActive(#[from] AlreadyActive),

    #[error("On cooldown, try again in {} seconds", remaining_secs(.remaining_ms))]
    OnCooldown { remaining_ms: u64 },
}

fn remaining_secs(ms: &u64) -> u64 {
    ms.div_ceil(1000)
}

/// The user already owns an active session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("User '{user_id}' already has an active focus session")]
pub struct AlreadyActive {
    pub user_id: String,
}

/// Persistence errors raised by [`crate::storage::UserStore`] and
/// [`crate::storage::SessionLog`] implementations.
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

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Stored data could not be decoded
    #[error("Corrupt record for '{key}': {message}")]
    Corrupt { key: String, message: String },

    /// Backend temporarily unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Notification delivery errors.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Sink has no credentials or target configured
    #[error("Notification sink not configured: {0}")]
    NotConfigured(String),

    /// Target cannot receive messages (e.g. DMs closed)
    #[error("Delivery unavailable: {0}")]
    Unavailable(String),

    /// Remote API answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Badge side-effect errors.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("Failed to grant role {role_id}: {message}")]
    RoleGrant { role_id: String, message: String },

    #[error("Badge announcement failed: {0}")]
    Announce(#[from] SinkError),
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

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// A completion pipeline run that stopped before its persistence write
/// succeeded. No XP was granted for the session.
#[derive(Error, Debug)]
#[error("Focus completion for '{user_id}' aborted while {stage}: {source}")]
pub struct PipelineError {
    pub user_id: String,
    pub stage: CompletionStage,
    #[source]
    pub source: StoreError,
}

/// A weekly report that could not be built, archived or delivered.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Weekly report failed: {0}")]
    Store(#[from] StoreError),

    #[error("Weekly report not delivered: {0}")]
    Delivery(#[from] SinkError),
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
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
