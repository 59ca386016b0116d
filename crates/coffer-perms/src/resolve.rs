//! Effective permission resolution and reconcile planning.

use std::collections::{BTreeSet, HashSet};

use coffer_core::{Aro, PermissionType, UserId};

use crate::snapshot::AccessSnapshot;

impl AccessSnapshot {
    /// Resolve the effective permission of a user on this snapshot's
    /// resource.
    ///
    /// Applicable rows are the direct user rows, the rows of every
    /// non-deleted group the user belongs to, and type-level default rows
    /// (ARO with no foreign key). The result is the maximum level over
    /// applicable rows, or `None` when no row applies.
    ///
    /// Soft-deleted or inactive users resolve to `None` regardless of
    /// rows, and so does every user when the resource itself is
    /// soft-deleted.
    pub fn resolve(&self, user_id: &UserId) -> Option<PermissionType> {
        if self.resource().deleted {
            return None;
        }
        let user = self.user(user_id)?;
        if !user.is_usable() {
            return None;
        }

        let groups = self.groups_of(user_id);
        self.permissions()
            .iter()
            .filter(|row| applies(&row.aro, user_id, &groups))
            .map(|row| row.permission_type)
            .max()
    }

    /// Every usable user with non-`None` access, with their level.
    ///
    /// Sorted by user id so reconcile plans are deterministic.
    pub fn users_with_access(&self) -> Vec<(UserId, PermissionType)> {
        let mut out: Vec<_> = self
            .users()
            .filter_map(|u| self.resolve(&u.id).map(|pt| (u.id, pt)))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Compute the secret-row changes needed to restore the invariant:
    /// exactly one secret per user with access, none for anyone else.
    ///
    /// `holders` is the set of users that currently have a secret row for
    /// this resource. The plan is idempotent by construction: running it
    /// against a converged state yields an empty `create` and `delete`.
    pub fn plan_reconcile(&self, holders: &[UserId]) -> ReconcilePlan {
        let holders: BTreeSet<UserId> = holders.iter().copied().collect();
        let entitled: BTreeSet<UserId> = self
            .users_with_access()
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        ReconcilePlan {
            create: entitled.difference(&holders).copied().collect(),
            keep: entitled.intersection(&holders).copied().collect(),
            delete: holders.difference(&entitled).copied().collect(),
        }
    }
}

fn applies(aro: &Aro, user_id: &UserId, groups: &HashSet<coffer_core::GroupId>) -> bool {
    match aro {
        // A missing foreign key is a type-level default row.
        Aro::User(None) => true,
        Aro::User(Some(id)) => id == user_id,
        Aro::Group(None) => !groups.is_empty(),
        Aro::Group(Some(id)) => groups.contains(id),
    }
}

/// Secret-row changes computed by [`AccessSnapshot::plan_reconcile`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcilePlan {
    /// Users entitled to access with no secret row yet.
    pub create: Vec<UserId>,
    /// Users entitled to access whose secret row already exists.
    pub keep: Vec<UserId>,
    /// Users holding a secret row without access.
    pub delete: Vec<UserId>,
}

impl ReconcilePlan {
    /// Whether the stored state already matches the resolved access set.
    pub fn is_converged(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_core::{
        Group, GroupId, GroupMembership, Permission, PermissionId, Resource, ResourceId, User,
    };

    struct Fixture {
        resource: Resource,
        users: Vec<User>,
        groups: Vec<Group>,
        memberships: Vec<GroupMembership>,
        permissions: Vec<Permission>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                resource: Resource {
                    id: ResourceId::new(),
                    name: "router".to_string(),
                    uri: Some("ssh://10.0.0.1".to_string()),
                    expires_at: None,
                    deleted: false,
                },
                users: Vec::new(),
                groups: Vec::new(),
                memberships: Vec::new(),
                permissions: Vec::new(),
            }
        }

        fn add_user(&mut self, name: &str) -> UserId {
            let id = UserId::new();
            self.users.push(User {
                id,
                username: name.to_string(),
                active: true,
                deleted: false,
            });
            id
        }

        fn add_group(&mut self, name: &str, members: &[UserId]) -> GroupId {
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

        fn permit(&mut self, aro: Aro, permission_type: PermissionType) {
            self.permissions.push(Permission {
                id: PermissionId::new(),
                resource_id: self.resource.id,
                aro,
                permission_type,
                created_at: 0,
            });
        }

        fn snapshot(&self) -> AccessSnapshot {
            AccessSnapshot::new(
                self.resource.clone(),
                self.permissions.clone(),
                self.users.clone(),
                self.groups.clone(),
                self.memberships.clone(),
            )
        }
    }

    #[test]
    fn no_rows_resolves_to_none() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        assert_eq!(fx.snapshot().resolve(&ada), None);
    }

    #[test]
    fn direct_row_resolves() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        fx.permit(Aro::user(ada), PermissionType::Update);
        assert_eq!(fx.snapshot().resolve(&ada), Some(PermissionType::Update));
    }

    #[test]
    fn union_takes_the_maximum() {
        // U in G1 (READ) and G2 (OWNER), both granted: OWNER wins.
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        let g1 = fx.add_group("readers", &[ada]);
        let g2 = fx.add_group("owners", &[ada]);
        fx.permit(Aro::group(g1), PermissionType::Read);
        fx.permit(Aro::group(g2), PermissionType::Owner);

        assert_eq!(fx.snapshot().resolve(&ada), Some(PermissionType::Owner));
    }

    #[test]
    fn direct_and_group_rows_union_not_override() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        let ops = fx.add_group("ops", &[ada]);
        fx.permit(Aro::user(ada), PermissionType::Read);
        fx.permit(Aro::group(ops), PermissionType::Owner);

        assert_eq!(fx.snapshot().resolve(&ada), Some(PermissionType::Owner));

        // And the other way around: a weaker group row never lowers a
        // stronger direct row.
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        let ops = fx.add_group("ops", &[ada]);
        fx.permit(Aro::user(ada), PermissionType::Owner);
        fx.permit(Aro::group(ops), PermissionType::Read);
        assert_eq!(fx.snapshot().resolve(&ada), Some(PermissionType::Owner));
    }

    #[test]
    fn soft_deleted_user_resolves_to_none() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        fx.permit(Aro::user(ada), PermissionType::Owner);
        fx.users[0].deleted = true;

        assert_eq!(fx.snapshot().resolve(&ada), None);
    }

    #[test]
    fn inactive_user_resolves_to_none() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        fx.permit(Aro::user(ada), PermissionType::Owner);
        fx.users[0].active = false;

        assert_eq!(fx.snapshot().resolve(&ada), None);
    }

    #[test]
    fn deleted_group_contributes_nothing() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        let ops = fx.add_group("ops", &[ada]);
        fx.permit(Aro::group(ops), PermissionType::Owner);
        fx.groups[0].deleted = true;

        assert_eq!(fx.snapshot().resolve(&ada), None);
    }

    #[test]
    fn deleted_resource_resolves_to_none_for_everyone() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        fx.permit(Aro::user(ada), PermissionType::Owner);
        fx.resource.deleted = true;

        assert_eq!(fx.snapshot().resolve(&ada), None);
        assert!(fx.snapshot().users_with_access().is_empty());
    }

    #[test]
    fn type_level_default_applies_to_every_user() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        let bob = fx.add_user("bob");
        fx.permit(Aro::User(None), PermissionType::Read);

        let snapshot = fx.snapshot();
        assert_eq!(snapshot.resolve(&ada), Some(PermissionType::Read));
        assert_eq!(snapshot.resolve(&bob), Some(PermissionType::Read));
    }

    #[test]
    fn plan_reconcile_creates_and_deletes() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        let bob = fx.add_user("bob");
        let ghost = fx.add_user("ghost");
        let ops = fx.add_group("ops", &[ada, bob]);
        fx.permit(Aro::group(ops), PermissionType::Read);

        // ghost holds a stale secret; bob has access but no secret yet.
        let plan = fx.snapshot().plan_reconcile(&[ada, ghost]);
        assert_eq!(plan.create, vec![bob]);
        assert_eq!(plan.keep, vec![ada]);
        assert_eq!(plan.delete, vec![ghost]);
        assert!(!plan.is_converged());
    }

    #[test]
    fn plan_reconcile_converges() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        let bob = fx.add_user("bob");
        let ops = fx.add_group("ops", &[ada, bob]);
        fx.permit(Aro::group(ops), PermissionType::Read);

        let snapshot = fx.snapshot();
        let plan = snapshot.plan_reconcile(&[]);
        assert_eq!(plan.create.len(), 2);

        // Applying the plan and re-planning yields convergence.
        let holders: Vec<UserId> = plan.create.clone();
        let next = snapshot.plan_reconcile(&holders);
        assert!(next.is_converged());
        assert_eq!(next.keep.len(), 2);
    }

    #[test]
    fn revoke_then_plan_deletes_all_rows() {
        let mut fx = Fixture::new();
        let ada = fx.add_user("ada");
        let bob = fx.add_user("bob");
        let ops = fx.add_group("ops", &[ada, bob]);
        fx.permit(Aro::group(ops), PermissionType::Read);

        let granted = fx.snapshot();
        let holders: Vec<UserId> = granted
            .plan_reconcile(&[])
            .create;
        assert_eq!(holders.len(), 2);

        let revoked_id = granted.permissions()[0].id;
        let revoked = granted.without_permission(&revoked_id);
        let plan = revoked.plan_reconcile(&holders);
        assert!(plan.create.is_empty());
        assert_eq!(plan.delete.len(), 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn permission_type() -> impl Strategy<Value = PermissionType> {
            prop_oneof![
                Just(PermissionType::Read),
                Just(PermissionType::Update),
                Just(PermissionType::Owner),
            ]
        }

        proptest! {
            /// Resolution equals the max over the applicable subset.
            #[test]
            fn resolution_is_max_of_applicable(
                direct in proptest::option::of(permission_type()),
                via_groups in proptest::collection::vec(permission_type(), 0..4),
            ) {
                let mut fx = Fixture::new();
                let ada = fx.add_user("ada");
                if let Some(pt) = direct {
                    fx.permit(Aro::user(ada), pt);
                }
                for pt in &via_groups {
                    let g = fx.add_group("g", &[ada]);
                    fx.permit(Aro::group(g), *pt);
                }

                let expected = direct
                    .into_iter()
                    .chain(via_groups.iter().copied())
                    .max();
                prop_assert_eq!(fx.snapshot().resolve(&ada), expected);
            }

            /// Rows for other users and foreign groups never leak access.
            #[test]
            fn foreign_rows_never_apply(
                rows in proptest::collection::vec(permission_type(), 1..5),
            ) {
                let mut fx = Fixture::new();
                let ada = fx.add_user("ada");
                let bob = fx.add_user("bob");
                let others = fx.add_group("others", &[bob]);
                for pt in &rows {
                    fx.permit(Aro::user(bob), *pt);
                    fx.permit(Aro::group(others), *pt);
                }
                prop_assert_eq!(fx.snapshot().resolve(&ada), None);
            }
        }
    }
}
