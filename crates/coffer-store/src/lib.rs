//! # Coffer Store
//!
//! Storage abstraction for the coffer directory. Provides a trait-based
//! interface with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store persists the directory (users, groups, memberships,
//! resources, key records), permission rows, and secret rows. The
//! primary implementation is [`SqliteStore`], with [`MemoryStore`] for
//! tests.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`AccessChange`] - One atomic permission change + secret reconcile
//!
//! ## Design Notes
//!
//! - **Isolation**: [`Store::apply_access_change`] runs as one
//!   transaction, so permission state and secret rows never drift apart
//!   observably.
//! - **Conflict detection**: an access change carries the permission-row
//!   basis its reconcile plan assumed; a mismatch fails with
//!   `ReconcileConflict` and applies nothing.
//! - **One blob per pair**: `secrets` is keyed by (resource, user); puts
//!   are upserts and empty ciphertext is refused.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AccessChange, PermissionOp, Store};

use bytes::Bytes;
use coffer_core::{ResourceId, Secret, UserId};

/// Build a secret row stamped with the current time.
pub fn secret_now(resource_id: ResourceId, user_id: UserId, ciphertext: Bytes) -> Secret {
    Secret {
        resource_id,
        user_id,
        ciphertext,
        modified_at: migration::now_millis(),
    }
}
