//! # Coffer
//!
//! The server-side core of a team password manager: encrypted secret
//! storage, user/group/role access permissions, and the GPG key
//! lifecycle that underpins both.
//!
//! ## Overview
//!
//! - **Keys**: armored OpenPGP keys are parsed, policy-checked, proven
//!   usable with an encrypt/decrypt round trip, and imported into a
//!   fingerprint-keyed keyring before they become an identity.
//! - **Permissions**: access is the union of direct user rows and group
//!   rows, ordered Read < Update < Owner; the highest applicable level
//!   wins.
//! - **Secrets**: every user with access to a resource holds exactly one
//!   ciphertext row encrypted to their active key. Grant, revoke and key
//!   replacement all reconcile the rows to keep that invariant.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use coffer::Coffer;
//! use coffer::config::CofferConfig;
//! use coffer_pgp::Keyring;
//! use coffer_store::SqliteStore;
//!
//! async fn example(config: CofferConfig) {
//!     let keyring = Keyring::open(&config.keyring_dir).unwrap();
//!     let store = SqliteStore::open(&config.database_path).unwrap();
//!     let coffer = Coffer::new(keyring, store, config.key_policy);
//!
//!     // Install the server identity from armored private key text.
//!     // let fingerprint = coffer
//!     //     .install_server_key(&armored, &config.server_key)
//!     //     .await
//!     //     .unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! The component crates are re-exported for convenience:
//!
//! - `coffer::core` - domain types
//! - `coffer::pgp` - key validation, keyring, probe
//! - `coffer::perms` - permission resolution
//! - `coffer::store` - persistence

pub mod config;
pub mod error;
pub mod kernel;
pub mod sealer;

// Re-export component crates
pub use coffer_core as core;
pub use coffer_perms as perms;
pub use coffer_pgp as pgp;
pub use coffer_store as store;

// Re-export main types for convenience
pub use config::{CofferConfig, ConfigError, ServerKeyConfig};
pub use error::{CofferError, Result};
pub use kernel::{Coffer, KeyRegistration, ReconcileOutcome};
pub use sealer::{KeyringSealer, SecretSealer};

// Commonly used core types
pub use coffer_core::{
    Aro, Fingerprint, GpgKeyRecord, Group, GroupMembership, Permission, PermissionType, Resource,
    Secret, User,
};
