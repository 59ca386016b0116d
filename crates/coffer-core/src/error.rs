//! Error types for the coffer core.

use thiserror::Error;

/// Errors that can occur while constructing core types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid fingerprint: {0:?} (expected 40 hex characters)")]
    InvalidFingerprint(String),

    #[error("invalid key id: {0:?} (expected 16 hex characters)")]
    InvalidKeyId(String),

    #[error("invalid entity id: {0:?}")]
    InvalidId(String),

    #[error("unknown permission type serial: {0}")]
    InvalidPermissionType(u8),
}
