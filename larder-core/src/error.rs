//! Error types for larder operations
//!
//! Fetch failures are not represented here: they are the fetcher's own error
//! type and travel through `StoreResponse::Error`. These errors cover the
//! persistence layer and configuration.

use thiserror::Error;

/// Persistence layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Failed to open environment at {path}: {reason}")]
    EnvOpen { path: String, reason: String },

    #[error("Failed to open database: {reason}")]
    DbOpen { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed for store {store_id}: {reason}")]
    Serialization { store_id: String, reason: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all larder errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for larder operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// TESTS
// =============================================================================
