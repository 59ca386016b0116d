//! Store trait: the abstract interface for directory persistence.
//!
//! This trait keeps the facade storage-agnostic. Implementations are
//! SQLite (primary) and in-memory (for tests). Both provide the same
//! isolation guarantee: [`Store::apply_access_change`] is atomic, so no
//! reader ever observes a permission change whose secrets have not been
//! reconciled.

use async_trait::async_trait;

use coffer_core::{
    Fingerprint, GpgKeyRecord, Group, GroupId, GroupMembership, Permission, PermissionId,
    Resource, ResourceId, Secret, User, UserId,
};
use coffer_perms::AccessSnapshot;

use crate::error::Result;

/// The permission-row half of an access change.
#[derive(Debug, Clone)]
pub enum PermissionOp {
    Grant(Permission),
    Revoke(PermissionId),
}

/// One atomic unit of permission change plus secret reconciliation.
///
/// `basis` is the full set of permission-row ids the caller's reconcile
/// plan assumed for the resource, **after** `op` is applied. If the
/// stored rows differ at execution time (a concurrent change won),
/// the store fails with `ReconcileConflict` and applies nothing.
#[derive(Debug, Clone)]
pub struct AccessChange {
    pub resource_id: ResourceId,
    /// `None` for a pure reconcile with no permission change.
    pub op: Option<PermissionOp>,
    pub basis: Vec<PermissionId>,
    pub secret_puts: Vec<Secret>,
    pub secret_deletes: Vec<UserId>,
}

/// Async interface for directory persistence.
///
/// All methods are async; the SQLite implementation hops onto
/// `spawn_blocking` internally so callers never block the runtime.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    async fn upsert_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, id: &UserId) -> Result<Option<User>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Groups and memberships
    // ─────────────────────────────────────────────────────────────────────────

    async fn upsert_group(&self, group: &Group) -> Result<()>;

    async fn list_groups(&self) -> Result<Vec<Group>>;

    /// Insert a membership row. Idempotent per (group, user).
    async fn add_membership(&self, membership: &GroupMembership) -> Result<()>;

    async fn remove_membership(&self, group_id: &GroupId, user_id: &UserId) -> Result<()>;

    async fn list_memberships(&self) -> Result<Vec<GroupMembership>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    async fn upsert_resource(&self, resource: &Resource) -> Result<()>;

    async fn get_resource(&self, id: &ResourceId) -> Result<Option<Resource>>;

    // ─────────────────────────────────────────────────────────────────────────
    // GPG key records
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a key record. Fingerprints must be unique among non-deleted
    /// records; the caller retires old records first.
    async fn insert_key_record(&self, record: &GpgKeyRecord) -> Result<()>;

    /// The user's current (non-deleted) key record, if any.
    async fn active_key_for_user(&self, user_id: &UserId) -> Result<Option<GpgKeyRecord>>;

    async fn get_key_by_fingerprint(&self, fingerprint: &Fingerprint)
        -> Result<Option<GpgKeyRecord>>;

    /// Soft-delete every key record of a user. Returns how many rows were
    /// retired.
    async fn retire_user_keys(&self, user_id: &UserId) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    async fn permissions_for_resource(&self, resource_id: &ResourceId) -> Result<Vec<Permission>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Secrets
    // ─────────────────────────────────────────────────────────────────────────

    /// Upsert one secret row. Fails with `CiphertextEmpty` on an empty
    /// blob.
    async fn put_secret(&self, secret: &Secret) -> Result<()>;

    async fn get_secret(&self, resource_id: &ResourceId, user_id: &UserId)
        -> Result<Option<Secret>>;

    /// Users currently holding a secret row for the resource.
    async fn secret_holders(&self, resource_id: &ResourceId) -> Result<Vec<UserId>>;

    /// Resources for which the user currently holds a secret row.
    async fn resources_with_secret_for(&self, user_id: &UserId) -> Result<Vec<ResourceId>>;

    /// Delete every secret row of a user (key replacement invalidates
    /// their ciphertext). Returns how many rows were deleted.
    async fn delete_secrets_for_user(&self, user_id: &UserId) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Composite operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Load a consistent snapshot for resolving one resource: the
    /// resource row, its permission rows, and the full directory.
    async fn load_snapshot(&self, resource_id: &ResourceId) -> Result<Option<AccessSnapshot>>;

    /// Apply a permission change and its secret reconciliation as one
    /// atomic unit. See [`AccessChange`] for the conflict rule.
    async fn apply_access_change(&self, change: &AccessChange) -> Result<()>;
}
