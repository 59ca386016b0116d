//! # Coffer Core
//!
//! Domain types shared by every coffer crate.
//!
//! ## Overview
//!
//! The core crate defines the vocabulary of the system and nothing else:
//! strongly typed identifiers, OpenPGP key metadata, the directory records
//! (users, groups, memberships, resources), permission rows, and encrypted
//! secret rows. There is no I/O here.
//!
//! ## Key Concepts
//!
//! - **Fingerprint**: the canonical identity of an OpenPGP key (20 bytes,
//!   40 upper-hex characters).
//! - **Permission**: one ACO/ARO access rule. The effective permission for
//!   a user on a resource is the maximum over all applicable rows.
//! - **Secret**: one ciphertext blob per (resource, user) pair, encrypted
//!   to that user's active key.

pub mod directory;
pub mod error;
pub mod types;

pub use directory::{
    Aro, Group, GroupMembership, GpgKeyRecord, Permission, PermissionType, Resource, Secret, User,
};
pub use error::CoreError;
pub use types::{Fingerprint, GroupId, KeyId, KeyRecordId, PermissionId, ResourceId, UserId};
