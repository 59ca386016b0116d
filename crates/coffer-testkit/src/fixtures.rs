//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: build a directory in memory,
//! then seed it into any store implementation.

use coffer_core::{
    Group, GroupId, GroupMembership, Resource, ResourceId, User, UserId,
};
use coffer_store::{MemoryStore, Store};

/// A directory under construction: users, groups, memberships and
/// resources, ready to seed into a store.
#[derive(Debug, Default, Clone)]
pub struct TestDirectory {
    pub users: Vec<User>,
    pub groups: Vec<Group>,
    pub memberships: Vec<GroupMembership>,
    pub resources: Vec<Resource>,
}

impl TestDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active user.
    pub fn add_user(&mut self, name: &str) -> UserId {
        let id = UserId::new();
        self.users.push(User {
            id,
            username: name.to_string(),
            active: true,
            deleted: false,
        });
        id
    }

    /// Soft-delete a previously added user.
    pub fn delete_user(&mut self, id: UserId) {
        if let Some(user) = self.users.iter_mut().find(|u| u.id == id) {
            user.deleted = true;
        }
    }

    /// Add a group with the given members.
    pub fn add_group(&mut self, name: &str, members: &[UserId]) -> GroupId {
        let id = GroupId::new();
        self.groups.push(Group {
            id,
            name: name.to_string(),
            deleted: false,
        });
        for user_id in members {
            self.memberships.push(GroupMembership {
                group_id: id,
                user_id: *user_id,
                is_admin: false,
            });
        }
        id
    }

    /// Add a resource.
    pub fn add_resource(&mut self, name: &str) -> ResourceId {
        let id = ResourceId::new();
        self.resources.push(Resource {
            id,
            name: name.to_string(),
            uri: None,
            expires_at: None,
            deleted: false,
        });
        id
    }

    /// Look up a resource added earlier.
    pub fn resource(&self, id: ResourceId) -> &Resource {
        self.resources
            .iter()
            .find(|r| r.id == id)
            .expect("unknown resource id")
    }

    /// Seed everything into an existing store.
    pub async fn seed<S: Store>(&self, store: &S) {
        for user in &self.users {
            store.upsert_user(user).await.expect("seed user");
        }
        for group in &self.groups {
            store.upsert_group(group).await.expect("seed group");
        }
        for membership in &self.memberships {
            store
                .add_membership(membership)
                .await
                .expect("seed membership");
        }
        for resource in &self.resources {
            store.upsert_resource(resource).await.expect("seed resource");
        }
    }

    /// Seed into a fresh in-memory store.
    pub async fn seed_memory(&self) -> MemoryStore {
        let store = MemoryStore::new();
        self.seed(&store).await;
        store
    }
}
