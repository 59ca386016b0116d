//! SQLite implementation of the Store trait.
//!
//! The primary storage backend. Uses rusqlite with bundled SQLite,
//! wrapped in async via `tokio::task::spawn_blocking`; the connection
//! lives behind a mutex, so writers serialize and `apply_access_change`
//! runs as a single transaction.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use coffer_core::{
    Aro, Fingerprint, GpgKeyRecord, Group, GroupId, GroupMembership, KeyId, KeyRecordId,
    Permission, PermissionId, PermissionType, Resource, ResourceId, Secret, User, UserId,
};
use coffer_perms::AccessSnapshot;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AccessChange, PermissionOp, Store};

/// SQLite-based store implementation.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path, running migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database. Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on a blocking worker.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Runtime("connection mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Runtime(format!("blocking task failed: {err}")))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping helpers
// ─────────────────────────────────────────────────────────────────────────────

fn parse_uuid<T>(s: &str, build: impl FnOnce(uuid::Uuid) -> T) -> Result<T> {
    uuid::Uuid::parse_str(s)
        .map(build)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid: {s}")))
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, bool, bool)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn user_from_tuple((id, username, active, deleted): (String, String, bool, bool)) -> Result<User> {
    Ok(User {
        id: parse_uuid(&id, UserId)?,
        username,
        active,
        deleted,
    })
}

fn aro_to_columns(aro: &Aro) -> (&'static str, Option<String>) {
    match aro {
        Aro::User(id) => ("User", id.map(|u| u.to_string())),
        Aro::Group(id) => ("Group", id.map(|g| g.to_string())),
    }
}

fn aro_from_columns(aro: &str, foreign_key: Option<&str>) -> Result<Aro> {
    match aro {
        "User" => Ok(Aro::User(match foreign_key {
            Some(s) => Some(parse_uuid(s, UserId)?),
            None => None,
        })),
        "Group" => Ok(Aro::Group(match foreign_key {
            Some(s) => Some(parse_uuid(s, GroupId)?),
            None => None,
        })),
        other => Err(StoreError::InvalidData(format!("unknown aro: {other}"))),
    }
}

fn permission_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PermissionRow> {
    Ok(PermissionRow {
        id: row.get(0)?,
        aco_foreign_key: row.get(1)?,
        aro: row.get(2)?,
        aro_foreign_key: row.get(3)?,
        serial: row.get(4)?,
        created_at: row.get(5)?,
    })
}

struct PermissionRow {
    id: String,
    aco_foreign_key: String,
    aro: String,
    aro_foreign_key: Option<String>,
    serial: u8,
    created_at: i64,
}

impl PermissionRow {
    fn into_permission(self) -> Result<Permission> {
        Ok(Permission {
            id: parse_uuid(&self.id, PermissionId)?,
            resource_id: parse_uuid(&self.aco_foreign_key, ResourceId)?,
            aro: aro_from_columns(&self.aro, self.aro_foreign_key.as_deref())?,
            permission_type: PermissionType::from_serial(self.serial)
                .map_err(|err| StoreError::InvalidData(err.to_string()))?,
            created_at: self.created_at,
        })
    }
}

fn load_permissions(conn: &Connection, resource_id: &ResourceId) -> Result<Vec<Permission>> {
    let mut stmt = conn.prepare(
        "SELECT id, aco_foreign_key, aro, aro_foreign_key, type, created_at
         FROM permissions WHERE aco = 'Resource' AND aco_foreign_key = ?1
         ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map(params![resource_id.to_string()], permission_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(PermissionRow::into_permission).collect()
}

fn insert_permission(conn: &Connection, permission: &Permission) -> Result<()> {
    let (aro, aro_fk) = aro_to_columns(&permission.aro);
    conn.execute(
        "INSERT INTO permissions (id, aco, aco_foreign_key, aro, aro_foreign_key, type, created_at)
         VALUES (?1, 'Resource', ?2, ?3, ?4, ?5, ?6)",
        params![
            permission.id.to_string(),
            permission.resource_id.to_string(),
            aro,
            aro_fk,
            permission.permission_type.serial(),
            permission.created_at,
        ],
    )?;
    Ok(())
}

fn upsert_secret(conn: &Connection, secret: &Secret) -> Result<()> {
    if secret.ciphertext.is_empty() {
        return Err(StoreError::CiphertextEmpty {
            resource_id: secret.resource_id.to_string(),
            user_id: secret.user_id.to_string(),
        });
    }
    conn.execute(
        "INSERT INTO secrets (resource_id, user_id, ciphertext, modified_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(resource_id, user_id) DO UPDATE SET
            ciphertext = excluded.ciphertext,
            modified_at = excluded.modified_at",
        params![
            secret.resource_id.to_string(),
            secret.user_id.to_string(),
            secret.ciphertext.as_ref(),
            secret.modified_at,
        ],
    )?;
    Ok(())
}

fn resource_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, Option<String>, Option<i64>, bool)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn load_resource(conn: &Connection, id: &ResourceId) -> Result<Option<Resource>> {
    let row = conn
        .query_row(
            "SELECT id, name, uri, expires_at, deleted FROM resources WHERE id = ?1",
            params![id.to_string()],
            resource_from_row,
        )
        .optional()?;
    match row {
        None => Ok(None),
        Some((id, name, uri, expires_at, deleted)) => Ok(Some(Resource {
            id: parse_uuid(&id, ResourceId)?,
            name,
            uri,
            expires_at,
            deleted,
        })),
    }
}

fn key_record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeyRecordRow> {
    Ok(KeyRecordRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        fingerprint: row.get(2)?,
        key_id: row.get(3)?,
        uid: row.get(4)?,
        bits: row.get(5)?,
        algorithm: row.get(6)?,
        armored_key: row.get(7)?,
        key_created_at: row.get(8)?,
        expires_at: row.get(9)?,
        deleted: row.get(10)?,
        created_at: row.get(11)?,
    })
}

struct KeyRecordRow {
    id: String,
    user_id: String,
    fingerprint: String,
    key_id: String,
    uid: String,
    bits: u32,
    algorithm: String,
    armored_key: String,
    key_created_at: i64,
    expires_at: Option<i64>,
    deleted: bool,
    created_at: i64,
}

impl KeyRecordRow {
    fn into_record(self) -> Result<GpgKeyRecord> {
        Ok(GpgKeyRecord {
            id: parse_uuid(&self.id, KeyRecordId)?,
            user_id: parse_uuid(&self.user_id, UserId)?,
            fingerprint: Fingerprint::from_hex(&self.fingerprint)
                .map_err(|err| StoreError::InvalidData(err.to_string()))?,
            key_id: KeyId::from_hex(&self.key_id)
                .map_err(|err| StoreError::InvalidData(err.to_string()))?,
            uid: self.uid,
            bits: self.bits,
            algorithm: self.algorithm,
            armored_key: self.armored_key,
            key_created_at: self.key_created_at,
            expires_at: self.expires_at,
            deleted: self.deleted,
            created_at: self.created_at,
        })
    }
}

const KEY_RECORD_COLUMNS: &str = "id, user_id, fingerprint, key_id, uid, bits, algorithm, \
     armored_key, key_created_at, expires_at, deleted, created_at";

// ─────────────────────────────────────────────────────────────────────────────
// Store impl
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_user(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO users (id, username, active, deleted) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    active = excluded.active,
                    deleted = excluded.deleted",
                params![user.id.to_string(), user.username, user.active, user.deleted],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let id = *id;
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, active, deleted FROM users WHERE id = ?1",
                    params![id.to_string()],
                    row_to_user,
                )
                .optional()?;
            row.map(user_from_tuple).transpose()
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, username, active, deleted FROM users ORDER BY id")?;
            let rows = stmt
                .query_map([], row_to_user)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(user_from_tuple).collect()
        })
        .await
    }

    async fn upsert_group(&self, group: &Group) -> Result<()> {
        let group = group.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO groups (id, name, deleted) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    deleted = excluded.deleted",
                params![group.id.to_string(), group.name, group.deleted],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, deleted FROM groups ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|(id, name, deleted)| {
                    Ok(Group {
                        id: parse_uuid(&id, GroupId)?,
                        name,
                        deleted,
                    })
                })
                .collect()
        })
        .await
    }

    async fn add_membership(&self, membership: &GroupMembership) -> Result<()> {
        let membership = membership.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO groups_users (group_id, user_id, is_admin) VALUES (?1, ?2, ?3)
                 ON CONFLICT(group_id, user_id) DO UPDATE SET is_admin = excluded.is_admin",
                params![
                    membership.group_id.to_string(),
                    membership.user_id.to_string(),
                    membership.is_admin,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_membership(&self, group_id: &GroupId, user_id: &UserId) -> Result<()> {
        let (group_id, user_id) = (*group_id, *user_id);
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM groups_users WHERE group_id = ?1 AND user_id = ?2",
                params![group_id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_memberships(&self) -> Result<Vec<GroupMembership>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT group_id, user_id, is_admin FROM groups_users ORDER BY group_id, user_id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|(group_id, user_id, is_admin)| {
                    Ok(GroupMembership {
                        group_id: parse_uuid(&group_id, GroupId)?,
                        user_id: parse_uuid(&user_id, UserId)?,
                        is_admin,
                    })
                })
                .collect()
        })
        .await
    }

    async fn upsert_resource(&self, resource: &Resource) -> Result<()> {
        let resource = resource.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO resources (id, name, uri, expires_at, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    uri = excluded.uri,
                    expires_at = excluded.expires_at,
                    deleted = excluded.deleted",
                params![
                    resource.id.to_string(),
                    resource.name,
                    resource.uri,
                    resource.expires_at,
                    resource.deleted,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_resource(&self, id: &ResourceId) -> Result<Option<Resource>> {
        let id = *id;
        self.run(move |conn| load_resource(conn, &id)).await
    }

    async fn insert_key_record(&self, record: &GpgKeyRecord) -> Result<()> {
        let record = record.clone();
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO gpgkeys ({KEY_RECORD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    record.id.to_string(),
                    record.user_id.to_string(),
                    record.fingerprint.to_hex(),
                    record.key_id.to_hex(),
                    record.uid,
                    record.bits,
                    record.algorithm,
                    record.armored_key,
                    record.key_created_at,
                    record.expires_at,
                    record.deleted,
                    record.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn active_key_for_user(&self, user_id: &UserId) -> Result<Option<GpgKeyRecord>> {
        let user_id = *user_id;
        self.run(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {KEY_RECORD_COLUMNS} FROM gpgkeys
                         WHERE user_id = ?1 AND deleted = 0
                         ORDER BY created_at DESC LIMIT 1"
                    ),
                    params![user_id.to_string()],
                    key_record_from_row,
                )
                .optional()?;
            row.map(KeyRecordRow::into_record).transpose()
        })
        .await
    }

    async fn get_key_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<GpgKeyRecord>> {
        let fingerprint = *fingerprint;
        self.run(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {KEY_RECORD_COLUMNS} FROM gpgkeys
                         WHERE fingerprint = ?1
                         ORDER BY deleted ASC, created_at DESC LIMIT 1"
                    ),
                    params![fingerprint.to_hex()],
                    key_record_from_row,
                )
                .optional()?;
            row.map(KeyRecordRow::into_record).transpose()
        })
        .await
    }

    async fn retire_user_keys(&self, user_id: &UserId) -> Result<u64> {
        let user_id = *user_id;
        self.run(move |conn| {
            let retired = conn.execute(
                "UPDATE gpgkeys SET deleted = 1 WHERE user_id = ?1 AND deleted = 0",
                params![user_id.to_string()],
            )?;
            Ok(retired as u64)
        })
        .await
    }

    async fn permissions_for_resource(&self, resource_id: &ResourceId) -> Result<Vec<Permission>> {
        let resource_id = *resource_id;
        self.run(move |conn| load_permissions(conn, &resource_id))
            .await
    }

    async fn put_secret(&self, secret: &Secret) -> Result<()> {
        let secret = secret.clone();
        self.run(move |conn| upsert_secret(conn, &secret)).await
    }

    async fn get_secret(
        &self,
        resource_id: &ResourceId,
        user_id: &UserId,
    ) -> Result<Option<Secret>> {
        let (resource_id, user_id) = (*resource_id, *user_id);
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT ciphertext, modified_at FROM secrets
                     WHERE resource_id = ?1 AND user_id = ?2",
                    params![resource_id.to_string(), user_id.to_string()],
                    |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;
            Ok(row.map(|(ciphertext, modified_at)| Secret {
                resource_id,
                user_id,
                ciphertext: Bytes::from(ciphertext),
                modified_at,
            }))
        })
        .await
    }

    async fn secret_holders(&self, resource_id: &ResourceId) -> Result<Vec<UserId>> {
        let resource_id = *resource_id;
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM secrets WHERE resource_id = ?1 ORDER BY user_id",
            )?;
            let rows = stmt
                .query_map(params![resource_id.to_string()], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(|s| parse_uuid(&s, UserId)).collect()
        })
        .await
    }

    async fn resources_with_secret_for(&self, user_id: &UserId) -> Result<Vec<ResourceId>> {
        let user_id = *user_id;
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT resource_id FROM secrets WHERE user_id = ?1 ORDER BY resource_id",
            )?;
            let rows = stmt
                .query_map(params![user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|s| parse_uuid(&s, ResourceId))
                .collect()
        })
        .await
    }

    async fn delete_secrets_for_user(&self, user_id: &UserId) -> Result<u64> {
        let user_id = *user_id;
        self.run(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM secrets WHERE user_id = ?1",
                params![user_id.to_string()],
            )?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn load_snapshot(&self, resource_id: &ResourceId) -> Result<Option<AccessSnapshot>> {
        let resource_id = *resource_id;
        self.run(move |conn| {
            let Some(resource) = load_resource(conn, &resource_id)? else {
                return Ok(None);
            };
            let permissions = load_permissions(conn, &resource_id)?;

            let mut stmt =
                conn.prepare("SELECT id, username, active, deleted FROM users ORDER BY id")?;
            let users = stmt
                .query_map([], row_to_user)?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .map(user_from_tuple)
                .collect::<Result<Vec<_>>>()?;

            let mut stmt = conn.prepare("SELECT id, name, deleted FROM groups")?;
            let groups = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .map(|(id, name, deleted)| {
                    Ok(Group {
                        id: parse_uuid(&id, GroupId)?,
                        name,
                        deleted,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let mut stmt =
                conn.prepare("SELECT group_id, user_id, is_admin FROM groups_users")?;
            let memberships = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .map(|(group_id, user_id, is_admin)| {
                    Ok(GroupMembership {
                        group_id: parse_uuid(&group_id, GroupId)?,
                        user_id: parse_uuid(&user_id, UserId)?,
                        is_admin,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(Some(AccessSnapshot::new(
                resource,
                permissions,
                users,
                groups,
                memberships,
            )))
        })
        .await
    }

    async fn apply_access_change(&self, change: &AccessChange) -> Result<()> {
        let change = change.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;

            match &change.op {
                Some(PermissionOp::Grant(permission)) => insert_permission(&tx, permission)?,
                Some(PermissionOp::Revoke(id)) => {
                    tx.execute(
                        "DELETE FROM permissions WHERE id = ?1",
                        params![id.to_string()],
                    )?;
                }
                None => {}
            }

            // The plan was computed against `basis`; if the stored rows
            // moved underneath us, applying the secret writes would
            // desynchronize permissions and secrets.
            let mut stmt = tx.prepare(
                "SELECT id FROM permissions WHERE aco = 'Resource' AND aco_foreign_key = ?1",
            )?;
            let stored: BTreeSet<String> = stmt
                .query_map(params![change.resource_id.to_string()], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<rusqlite::Result<_>>()?;
            drop(stmt);

            let basis: BTreeSet<String> =
                change.basis.iter().map(|id| id.to_string()).collect();
            if stored != basis {
                return Err(StoreError::ReconcileConflict {
                    resource_id: change.resource_id.to_string(),
                });
            }

            for secret in &change.secret_puts {
                upsert_secret(&tx, secret)?;
            }
            for user_id in &change.secret_deletes {
                tx.execute(
                    "DELETE FROM secrets WHERE resource_id = ?1 AND user_id = ?2",
                    params![change.resource_id.to_string(), user_id.to_string()],
                )?;
            }

            tx.commit()?;
            debug!(
                resource = %change.resource_id,
                puts = change.secret_puts.len(),
                deletes = change.secret_deletes.len(),
                "applied access change"
            );
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> User {
        User {
            id: UserId::new(),
            username: name.to_string(),
            active: true,
            deleted: false,
        }
    }

    fn resource(name: &str) -> Resource {
        Resource {
            id: ResourceId::new(),
            name: name.to_string(),
            uri: None,
            expires_at: None,
            deleted: false,
        }
    }

    #[tokio::test]
    async fn user_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let ada = user("ada");
        store.upsert_user(&ada).await.unwrap();

        assert_eq!(store.get_user(&ada.id).await.unwrap(), Some(ada.clone()));
        assert_eq!(store.list_users().await.unwrap(), vec![ada]);
    }

    #[tokio::test]
    async fn open_creates_file_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coffer.db");
        let ada = user("ada");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert_user(&ada).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_user(&ada.id).await.unwrap(), Some(ada));
    }

    #[tokio::test]
    async fn put_secret_rejects_empty_ciphertext() {
        let store = SqliteStore::open_memory().unwrap();
        let secret = Secret {
            resource_id: ResourceId::new(),
            user_id: UserId::new(),
            ciphertext: Bytes::new(),
            modified_at: 0,
        };
        match store.put_secret(&secret).await {
            Err(StoreError::CiphertextEmpty { .. }) => {}
            other => panic!("expected CiphertextEmpty, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn secret_upsert_is_one_row_per_pair() {
        let store = SqliteStore::open_memory().unwrap();
        let resource_id = ResourceId::new();
        let user_id = UserId::new();

        let first = Secret {
            resource_id,
            user_id,
            ciphertext: Bytes::from_static(b"v1"),
            modified_at: 1,
        };
        let second = Secret {
            ciphertext: Bytes::from_static(b"v2"),
            modified_at: 2,
            ..first.clone()
        };
        store.put_secret(&first).await.unwrap();
        store.put_secret(&second).await.unwrap();

        let stored = store.get_secret(&resource_id, &user_id).await.unwrap().unwrap();
        assert_eq!(stored.ciphertext, Bytes::from_static(b"v2"));
        assert_eq!(store.secret_holders(&resource_id).await.unwrap(), vec![user_id]);
    }

    #[tokio::test]
    async fn retire_user_keys_soft_deletes() {
        let store = SqliteStore::open_memory().unwrap();
        let ada = user("ada");
        let record = GpgKeyRecord {
            id: KeyRecordId::new(),
            user_id: ada.id,
            fingerprint: Fingerprint::from_bytes([0xaa; 20]),
            key_id: Fingerprint::from_bytes([0xaa; 20]).key_id(),
            uid: "Ada <ada@example.org>".to_string(),
            bits: 256,
            algorithm: "EdDSA".to_string(),
            armored_key: "-----BEGIN PGP PUBLIC KEY BLOCK-----".to_string(),
            key_created_at: 0,
            expires_at: None,
            deleted: false,
            created_at: 1,
        };
        store.insert_key_record(&record).await.unwrap();
        assert!(store.active_key_for_user(&ada.id).await.unwrap().is_some());

        assert_eq!(store.retire_user_keys(&ada.id).await.unwrap(), 1);
        assert!(store.active_key_for_user(&ada.id).await.unwrap().is_none());

        // The record itself survives: ciphertext may still reference it.
        let by_fpr = store
            .get_key_by_fingerprint(&record.fingerprint)
            .await
            .unwrap()
            .unwrap();
        assert!(by_fpr.deleted);
    }

    #[tokio::test]
    async fn apply_access_change_detects_conflict() {
        let store = SqliteStore::open_memory().unwrap();
        let res = resource("router");
        store.upsert_resource(&res).await.unwrap();

        // Plan claims a permission row that is not stored.
        let change = AccessChange {
            resource_id: res.id,
            op: None,
            basis: vec![PermissionId::new()],
            secret_puts: vec![],
            secret_deletes: vec![],
        };
        match store.apply_access_change(&change).await {
            Err(StoreError::ReconcileConflict { .. }) => {}
            other => panic!("expected ReconcileConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn apply_access_change_is_atomic() {
        let store = SqliteStore::open_memory().unwrap();
        let res = resource("router");
        store.upsert_resource(&res).await.unwrap();
        let ada = user("ada");
        store.upsert_user(&ada).await.unwrap();

        let permission = Permission {
            id: PermissionId::new(),
            resource_id: res.id,
            aro: Aro::user(ada.id),
            permission_type: PermissionType::Read,
            created_at: 0,
        };
        // The empty ciphertext makes the secret write fail after the
        // permission insert; the whole change must roll back.
        let change = AccessChange {
            resource_id: res.id,
            op: Some(PermissionOp::Grant(permission.clone())),
            basis: vec![permission.id],
            secret_puts: vec![Secret {
                resource_id: res.id,
                user_id: ada.id,
                ciphertext: Bytes::new(),
                modified_at: 0,
            }],
            secret_deletes: vec![],
        };
        assert!(store.apply_access_change(&change).await.is_err());
        assert!(store
            .permissions_for_resource(&res.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn apply_access_change_grant_and_secrets() {
        let store = SqliteStore::open_memory().unwrap();
        let res = resource("router");
        store.upsert_resource(&res).await.unwrap();
        let ada = user("ada");
        store.upsert_user(&ada).await.unwrap();

        let permission = Permission {
            id: PermissionId::new(),
            resource_id: res.id,
            aro: Aro::user(ada.id),
            permission_type: PermissionType::Owner,
            created_at: 0,
        };
        let change = AccessChange {
            resource_id: res.id,
            op: Some(PermissionOp::Grant(permission.clone())),
            basis: vec![permission.id],
            secret_puts: vec![Secret {
                resource_id: res.id,
                user_id: ada.id,
                ciphertext: Bytes::from_static(b"ciphertext"),
                modified_at: 0,
            }],
            secret_deletes: vec![],
        };
        store.apply_access_change(&change).await.unwrap();

        let stored = store.permissions_for_resource(&res.id).await.unwrap();
        assert_eq!(stored, vec![permission]);
        assert_eq!(store.secret_holders(&res.id).await.unwrap(), vec![ada.id]);

        // Revoke + delete in one unit.
        let change = AccessChange {
            resource_id: res.id,
            op: Some(PermissionOp::Revoke(stored[0].id)),
            basis: vec![],
            secret_puts: vec![],
            secret_deletes: vec![ada.id],
        };
        store.apply_access_change(&change).await.unwrap();
        assert!(store.secret_holders(&res.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_snapshot_resolves_group_access() {
        let store = SqliteStore::open_memory().unwrap();
        let res = resource("router");
        store.upsert_resource(&res).await.unwrap();
        let ada = user("ada");
        store.upsert_user(&ada).await.unwrap();
        let ops = Group {
            id: GroupId::new(),
            name: "ops".to_string(),
            deleted: false,
        };
        store.upsert_group(&ops).await.unwrap();
        store
            .add_membership(&GroupMembership {
                group_id: ops.id,
                user_id: ada.id,
                is_admin: false,
            })
            .await
            .unwrap();

        let permission = Permission {
            id: PermissionId::new(),
            resource_id: res.id,
            aro: Aro::group(ops.id),
            permission_type: PermissionType::Update,
            created_at: 0,
        };
        store
            .apply_access_change(&AccessChange {
                resource_id: res.id,
                op: Some(PermissionOp::Grant(permission.clone())),
                basis: vec![permission.id],
                secret_puts: vec![],
                secret_deletes: vec![],
            })
            .await
            .unwrap();

        let snapshot = store.load_snapshot(&res.id).await.unwrap().unwrap();
        assert_eq!(snapshot.resolve(&ada.id), Some(PermissionType::Update));
        assert!(store
            .load_snapshot(&ResourceId::new())
            .await
            .unwrap()
            .is_none());
    }
}
