//! Proptest strategies for permission rows.

use proptest::prelude::*;

use coffer_core::{Aro, Permission, PermissionId, PermissionType, ResourceId, UserId};

/// Strategy over the three permission levels.
pub fn permission_type() -> impl Strategy<Value = PermissionType> {
    prop_oneof![
        Just(PermissionType::Read),
        Just(PermissionType::Update),
        Just(PermissionType::Owner),
    ]
}

/// Strategy producing direct-user permission rows for the given users on
/// one resource.
pub fn direct_permissions(
    resource_id: ResourceId,
    users: Vec<UserId>,
) -> impl Strategy<Value = Vec<Permission>> {
    let count = users.len();
    proptest::collection::vec(permission_type(), 0..=count).prop_map(move |types| {
        types
            .into_iter()
            .zip(users.iter())
            .map(|(permission_type, user_id)| Permission {
                id: PermissionId::new(),
                resource_id,
                aro: Aro::user(*user_id),
                permission_type,
                created_at: 0,
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_rows_target_the_resource(
            rows in direct_permissions(ResourceId::new(), vec![UserId::new(), UserId::new()]),
        ) {
            // ResourceId::new() runs once per test case set; every row
            // must carry it.
            if let Some(first) = rows.first() {
                for row in &rows {
                    prop_assert_eq!(row.resource_id, first.resource_id);
                }
            }
        }
    }
}
