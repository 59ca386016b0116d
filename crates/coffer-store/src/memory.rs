//! In-memory implementation of the Store trait.
//!
//! Primarily for tests. Same semantics as SQLite, including the atomic
//! `apply_access_change` (all mutation happens under one write lock, so
//! the conflict check and the secret writes are a single unit).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use coffer_core::{
    Fingerprint, GpgKeyRecord, Group, GroupId, GroupMembership, Permission, Resource, ResourceId,
    Secret, User, UserId,
};
use coffer_perms::AccessSnapshot;

use crate::error::{Result, StoreError};
use crate::traits::{AccessChange, PermissionOp, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    users: BTreeMap<UserId, User>,
    groups: BTreeMap<GroupId, Group>,
    memberships: BTreeMap<(GroupId, UserId), GroupMembership>,
    resources: HashMap<ResourceId, Resource>,
    key_records: Vec<GpgKeyRecord>,
    permissions: Vec<Permission>,
    secrets: BTreeMap<(ResourceId, UserId), Secret>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryStoreInner) -> T) -> Result<T> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Runtime("store lock poisoned".to_string()))?;
        Ok(f(&inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut MemoryStoreInner) -> Result<T>) -> Result<T> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Runtime("store lock poisoned".to_string()))?;
        f(&mut inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_ciphertext(secret: &Secret) -> Result<()> {
    if secret.ciphertext.is_empty() {
        return Err(StoreError::CiphertextEmpty {
            resource_id: secret.resource_id.to_string(),
            user_id: secret.user_id.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.write(|inner| {
            inner.users.insert(user.id, user.clone());
            Ok(())
        })
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        self.read(|inner| inner.users.get(id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.read(|inner| inner.users.values().cloned().collect())
    }

    async fn upsert_group(&self, group: &Group) -> Result<()> {
        self.write(|inner| {
            inner.groups.insert(group.id, group.clone());
            Ok(())
        })
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        self.read(|inner| inner.groups.values().cloned().collect())
    }

    async fn add_membership(&self, membership: &GroupMembership) -> Result<()> {
        self.write(|inner| {
            inner
                .memberships
                .insert((membership.group_id, membership.user_id), membership.clone());
            Ok(())
        })
    }

    async fn remove_membership(&self, group_id: &GroupId, user_id: &UserId) -> Result<()> {
        self.write(|inner| {
            inner.memberships.remove(&(*group_id, *user_id));
            Ok(())
        })
    }

    async fn list_memberships(&self) -> Result<Vec<GroupMembership>> {
        self.read(|inner| inner.memberships.values().cloned().collect())
    }

    async fn upsert_resource(&self, resource: &Resource) -> Result<()> {
        self.write(|inner| {
            inner.resources.insert(resource.id, resource.clone());
            Ok(())
        })
    }

    async fn get_resource(&self, id: &ResourceId) -> Result<Option<Resource>> {
        self.read(|inner| inner.resources.get(id).cloned())
    }

    async fn insert_key_record(&self, record: &GpgKeyRecord) -> Result<()> {
        self.write(|inner| {
            inner.key_records.push(record.clone());
            Ok(())
        })
    }

    async fn active_key_for_user(&self, user_id: &UserId) -> Result<Option<GpgKeyRecord>> {
        self.read(|inner| {
            inner
                .key_records
                .iter()
                .filter(|r| r.user_id == *user_id && !r.deleted)
                .max_by_key(|r| r.created_at)
                .cloned()
        })
    }

    async fn get_key_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<GpgKeyRecord>> {
        self.read(|inner| {
            let mut matches: Vec<&GpgKeyRecord> = inner
                .key_records
                .iter()
                .filter(|r| r.fingerprint == *fingerprint)
                .collect();
            // Prefer a live record over retired ones.
            matches.sort_by_key(|r| (r.deleted, std::cmp::Reverse(r.created_at)));
            matches.first().map(|r| (*r).clone())
        })
    }

    async fn retire_user_keys(&self, user_id: &UserId) -> Result<u64> {
        self.write(|inner| {
            let mut retired = 0;
            for record in inner
                .key_records
                .iter_mut()
                .filter(|r| r.user_id == *user_id && !r.deleted)
            {
                record.deleted = true;
                retired += 1;
            }
            Ok(retired)
        })
    }

    async fn permissions_for_resource(&self, resource_id: &ResourceId) -> Result<Vec<Permission>> {
        self.read(|inner| {
            inner
                .permissions
                .iter()
                .filter(|p| p.resource_id == *resource_id)
                .cloned()
                .collect()
        })
    }

    async fn put_secret(&self, secret: &Secret) -> Result<()> {
        self.write(|inner| {
            check_ciphertext(secret)?;
            inner
                .secrets
                .insert((secret.resource_id, secret.user_id), secret.clone());
            Ok(())
        })
    }

    async fn get_secret(
        &self,
        resource_id: &ResourceId,
        user_id: &UserId,
    ) -> Result<Option<Secret>> {
        self.read(|inner| inner.secrets.get(&(*resource_id, *user_id)).cloned())
    }

    async fn secret_holders(&self, resource_id: &ResourceId) -> Result<Vec<UserId>> {
        self.read(|inner| {
            inner
                .secrets
                .keys()
                .filter(|(r, _)| r == resource_id)
                .map(|(_, u)| *u)
                .collect()
        })
    }

    async fn resources_with_secret_for(&self, user_id: &UserId) -> Result<Vec<ResourceId>> {
        self.read(|inner| {
            let mut out: Vec<ResourceId> = inner
                .secrets
                .keys()
                .filter(|(_, u)| u == user_id)
                .map(|(r, _)| *r)
                .collect();
            out.sort();
            out.dedup();
            out
        })
    }

    async fn delete_secrets_for_user(&self, user_id: &UserId) -> Result<u64> {
        self.write(|inner| {
            let before = inner.secrets.len();
            inner.secrets.retain(|(_, u), _| u != user_id);
            Ok((before - inner.secrets.len()) as u64)
        })
    }

    async fn load_snapshot(&self, resource_id: &ResourceId) -> Result<Option<AccessSnapshot>> {
        self.read(|inner| {
            let resource = inner.resources.get(resource_id)?.clone();
            Some(AccessSnapshot::new(
                resource,
                inner
                    .permissions
                    .iter()
                    .filter(|p| p.resource_id == *resource_id)
                    .cloned()
                    .collect(),
                inner.users.values().cloned().collect(),
                inner.groups.values().cloned().collect(),
                inner.memberships.values().cloned().collect(),
            ))
        })
    }

    async fn apply_access_change(&self, change: &AccessChange) -> Result<()> {
        self.write(|inner| {
            // Stage the permission change on a copy so a conflict leaves
            // the stored rows untouched.
            let mut permissions = inner.permissions.clone();
            match &change.op {
                Some(PermissionOp::Grant(permission)) => permissions.push(permission.clone()),
                Some(PermissionOp::Revoke(id)) => permissions.retain(|p| p.id != *id),
                None => {}
            }

            let stored: BTreeSet<_> = permissions
                .iter()
                .filter(|p| p.resource_id == change.resource_id)
                .map(|p| p.id)
                .collect();
            let basis: BTreeSet<_> = change.basis.iter().copied().collect();
            if stored != basis {
                return Err(StoreError::ReconcileConflict {
                    resource_id: change.resource_id.to_string(),
                });
            }

            for secret in &change.secret_puts {
                check_ciphertext(secret)?;
            }

            inner.permissions = permissions;
            for secret in &change.secret_puts {
                inner
                    .secrets
                    .insert((secret.resource_id, secret.user_id), secret.clone());
            }
            for user_id in &change.secret_deletes {
                inner.secrets.remove(&(change.resource_id, *user_id));
            }
            Ok(())
        })
    }
}
