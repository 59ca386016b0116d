//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Refused to store an empty ciphertext blob.
    #[error("empty ciphertext for secret (resource {resource_id}, user {user_id})")]
    CiphertextEmpty {
        resource_id: String,
        user_id: String,
    },

    /// The permission state no longer matches the basis a reconcile plan
    /// was computed from. Recover by re-running reconcile.
    #[error("reconcile conflict on resource {resource_id}: permission state changed")]
    ReconcileConflict { resource_id: String },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Async runtime failure (blocking task aborted).
    #[error("runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
