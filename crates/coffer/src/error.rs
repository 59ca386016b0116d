//! Error types for the coffer facade.

use thiserror::Error;

use coffer_core::{PermissionId, ResourceId, UserId};
use coffer_pgp::PgpError;
use coffer_store::StoreError;

use crate::config::ConfigError;

/// Errors that can occur during facade operations.
#[derive(Debug, Error)]
pub enum CofferError {
    /// Key pipeline error (parse, policy, keyring, probe).
    #[error("key error: {0}")]
    Pgp(#[from] PgpError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Resource not found.
    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceId),

    /// User not found or not usable.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// Permission row not found on the resource.
    #[error("permission not found: {0}")]
    PermissionNotFound(PermissionId),

    /// A user entitled to a secret has no active key to encrypt to.
    #[error("user {0} has no active key")]
    NoActiveKey(UserId),

    /// Access was expected but resolution returned none.
    #[error("permission denied: user {user_id} on resource {resource_id}")]
    PermissionDenied {
        user_id: UserId,
        resource_id: ResourceId,
    },

    /// The user has access but no secret row exists yet; reconcile must
    /// run before the secret can be served.
    #[error("no secret for user {user_id} on resource {resource_id}")]
    SecretMissing {
        user_id: UserId,
        resource_id: ResourceId,
    },

    /// Async runtime failure (blocking task aborted).
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, CofferError>;
