//! Directory records: the entities the permission engine and secret store
//! operate on.
//!
//! These mirror the persistence contract one-to-one. Soft deletion is a
//! flag, never a physical removal: key records and permission rows may be
//! referenced by ciphertext long after the owning entity is retired.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{
    Fingerprint, GroupId, KeyId, KeyRecordId, PermissionId, ResourceId, UserId,
};

/// Ordered permission levels.
///
/// The discriminants are the serial values of the permission-type seed
/// rows; resolution takes the maximum over applicable rows, so the order
/// of the discriminants is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PermissionType {
    /// May read the resource and hold a secret for it.
    Read = 1,
    /// May update the resource.
    Update = 7,
    /// Full control, including sharing and deletion.
    Owner = 15,
}

impl PermissionType {
    /// The serial value stored in the `permissions.type` column.
    pub const fn serial(self) -> u8 {
        self as u8
    }

    /// Parse a stored serial value.
    pub fn from_serial(serial: u8) -> Result<Self, CoreError> {
        match serial {
            1 => Ok(PermissionType::Read),
            7 => Ok(PermissionType::Update),
            15 => Ok(PermissionType::Owner),
            other => Err(CoreError::InvalidPermissionType(other)),
        }
    }
}

/// The access-control requester side of a permission row.
///
/// `None` in the inner id is a type-level default: the row applies to
/// every non-deleted ARO of that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aro {
    User(Option<UserId>),
    Group(Option<GroupId>),
}

impl Aro {
    /// Row for one specific user.
    pub fn user(id: UserId) -> Self {
        Aro::User(Some(id))
    }

    /// Row for one specific group.
    pub fn group(id: GroupId) -> Self {
        Aro::Group(Some(id))
    }
}

/// One access rule: ARO -> permission level on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    /// The resource this row protects (the ACO side).
    pub resource_id: ResourceId,
    pub aro: Aro,
    pub permission_type: PermissionType,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// A user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Inactive users keep their rows but resolve to no access.
    pub active: bool,
    pub deleted: bool,
}

impl User {
    /// A user who can currently hold access.
    pub fn is_usable(&self) -> bool {
        self.active && !self.deleted
    }
}

/// A group record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub deleted: bool,
}

/// Membership join row, unique per (group, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub is_admin: bool,
}

/// A resource: the logical secret entry (e.g. one credential).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub uri: Option<String>,
    /// Unix milliseconds; expiry of the credential itself, not of access.
    pub expires_at: Option<i64>,
    pub deleted: bool,
}

/// A stored GPG public key, bound to a user by id.
///
/// Never mutated after insertion. Replacing a user's key soft-deletes the
/// old record and inserts a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpgKeyRecord {
    pub id: KeyRecordId,
    pub user_id: UserId,
    pub fingerprint: Fingerprint,
    pub key_id: KeyId,
    /// Primary user id packet of the key ("Name <email>").
    pub uid: String,
    pub bits: u32,
    pub algorithm: String,
    /// The armored public key material as imported.
    pub armored_key: String,
    /// Unix milliseconds; creation time embedded in the key.
    pub key_created_at: i64,
    /// Must be `None`: expiring keys are rejected at validation.
    pub expires_at: Option<i64>,
    pub deleted: bool,
    /// Unix milliseconds; when the record was inserted.
    pub created_at: i64,
}

/// One ciphertext blob for one user on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub resource_id: ResourceId,
    pub user_id: UserId,
    pub ciphertext: Bytes,
    /// Unix milliseconds.
    pub modified_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_type_total_order() {
        assert!(PermissionType::Read < PermissionType::Update);
        assert!(PermissionType::Update < PermissionType::Owner);
        assert_eq!(
            PermissionType::Read.max(PermissionType::Owner),
            PermissionType::Owner
        );
    }

    #[test]
    fn permission_type_serial_roundtrip() {
        for pt in [
            PermissionType::Read,
            PermissionType::Update,
            PermissionType::Owner,
        ] {
            assert_eq!(PermissionType::from_serial(pt.serial()).unwrap(), pt);
        }
    }

    #[test]
    fn permission_type_rejects_unknown_serial() {
        assert!(PermissionType::from_serial(0).is_err());
        assert!(PermissionType::from_serial(8).is_err());
        assert!(PermissionType::from_serial(255).is_err());
    }

    #[test]
    fn soft_deleted_user_is_not_usable() {
        let user = User {
            id: UserId::new(),
            username: "ada".to_string(),
            active: true,
            deleted: true,
        };
        assert!(!user.is_usable());
    }

    #[test]
    fn inactive_user_is_not_usable() {
        let user = User {
            id: UserId::new(),
            username: "ada".to_string(),
            active: false,
            deleted: false,
        };
        assert!(!user.is_usable());
    }
}
