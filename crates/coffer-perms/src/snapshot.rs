//! The access snapshot: everything needed to resolve one resource.
//!
//! A snapshot is a consistent read of the directory taken inside the
//! store's isolation boundary. Resolution over a snapshot is pure, so
//! the same snapshot always resolves the same way.

use std::collections::{HashMap, HashSet};

use coffer_core::{
    Group, GroupId, GroupMembership, Permission, Resource, User, UserId,
};

/// Directory state relevant to a single resource.
#[derive(Debug, Clone)]
pub struct AccessSnapshot {
    resource: Resource,
    /// Permission rows whose ACO is this resource.
    permissions: Vec<Permission>,
    users: HashMap<UserId, User>,
    groups: HashMap<GroupId, Group>,
    memberships: Vec<GroupMembership>,
}

impl AccessSnapshot {
    pub fn new(
        resource: Resource,
        permissions: Vec<Permission>,
        users: Vec<User>,
        groups: Vec<Group>,
        memberships: Vec<GroupMembership>,
    ) -> Self {
        Self {
            resource,
            permissions,
            users: users.into_iter().map(|u| (u.id, u)).collect(),
            groups: groups.into_iter().map(|g| (g.id, g)).collect(),
            memberships,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    /// All user records in the snapshot, usable or not.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Groups a user belongs to, excluding soft-deleted groups.
    pub fn groups_of(&self, user_id: &UserId) -> HashSet<GroupId> {
        self.memberships
            .iter()
            .filter(|m| m.user_id == *user_id)
            .filter(|m| {
                self.groups
                    .get(&m.group_id)
                    .map(|g| !g.deleted)
                    .unwrap_or(false)
            })
            .map(|m| m.group_id)
            .collect()
    }

    /// Add a permission row to the snapshot (prospective state for
    /// planning a grant before it is committed).
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Remove a permission row from the snapshot (prospective state for
    /// planning a revoke before it is committed).
    pub fn without_permission(mut self, id: &coffer_core::PermissionId) -> Self {
        self.permissions.retain(|p| p.id != *id);
        self
    }
}
