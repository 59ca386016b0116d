//! # Coffer Permissions
//!
//! Pure resolution of effective access rights.
//!
//! ## Model
//!
//! A permission row grants a level (Read < Update < Owner) to an ARO —
//! a specific user, a specific group, or a type-level default. The
//! effective permission of a user on a resource is the **maximum** level
//! across every applicable row: union-of-rights, never override.
//!
//! Soft-deleted actors are excluded everywhere: a deleted or inactive
//! user resolves to no access even when rows still reference them, a
//! deleted group contributes nothing to its members, and a deleted
//! resource resolves to no access for everyone.
//!
//! ## Reconciliation
//!
//! [`AccessSnapshot::plan_reconcile`] computes, from the resolved access
//! set and the current secret holders, which ciphertext rows must be
//! created, kept, or deleted to restore the core invariant: exactly one
//! secret row per user with access. The plan is pure data; executing it
//! is the store's job.

pub mod resolve;
pub mod snapshot;

pub use resolve::ReconcilePlan;
pub use snapshot::AccessSnapshot;
