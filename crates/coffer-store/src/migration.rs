//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system: each migration transforms the
//! schema from version N to N+1 inside one transaction.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE users (
            id TEXT PRIMARY KEY,               -- uuid
            username TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            deleted INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE groups (
            id TEXT PRIMARY KEY,               -- uuid
            name TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0
        );

        -- Many-to-many join, unique per (group, user)
        CREATE TABLE groups_users (
            group_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (group_id, user_id)
        );

        CREATE TABLE resources (
            id TEXT PRIMARY KEY,               -- uuid
            name TEXT NOT NULL,
            uri TEXT,
            expires_at INTEGER,                -- unix ms, credential expiry
            deleted INTEGER NOT NULL DEFAULT 0
        );

        -- Key records are append-only; replacement soft-deletes the old row
        CREATE TABLE gpgkeys (
            id TEXT PRIMARY KEY,               -- uuid
            user_id TEXT NOT NULL,
            fingerprint TEXT NOT NULL,         -- 40 upper-hex chars
            key_id TEXT NOT NULL,              -- 16 upper-hex chars
            uid TEXT NOT NULL,
            bits INTEGER NOT NULL,
            algorithm TEXT NOT NULL,
            armored_key TEXT NOT NULL,
            key_created_at INTEGER NOT NULL,   -- unix ms
            expires_at INTEGER,                -- unix ms; always NULL by policy
            deleted INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL        -- unix ms
        );

        CREATE TABLE permissions (
            id TEXT PRIMARY KEY,               -- uuid
            aco TEXT NOT NULL,                 -- 'Resource'
            aco_foreign_key TEXT NOT NULL,
            aro TEXT NOT NULL,                 -- 'User' | 'Group'
            aro_foreign_key TEXT,              -- NULL = type-level default
            type INTEGER NOT NULL,             -- permission serial (1/7/15)
            created_at INTEGER NOT NULL
        );

        CREATE TABLE secrets (
            resource_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            ciphertext BLOB NOT NULL,
            modified_at INTEGER NOT NULL,
            PRIMARY KEY (resource_id, user_id)
        );

        -- Indexes for common queries
        CREATE INDEX idx_gpgkeys_fingerprint ON gpgkeys(fingerprint);
        CREATE INDEX idx_gpgkeys_user ON gpgkeys(user_id);
        CREATE INDEX idx_groups_users_user ON groups_users(user_id);
        CREATE INDEX idx_groups_users_group ON groups_users(group_id);
        CREATE INDEX idx_permissions_aco_fk ON permissions(aco_foreign_key);
        CREATE INDEX idx_permissions_aro_fk ON permissions(aro_foreign_key);
        CREATE INDEX idx_permissions_aco_aro ON permissions(aco, aro);
        CREATE INDEX idx_permissions_type ON permissions(type);
        CREATE INDEX idx_secrets_user ON secrets(user_id);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "groups",
            "groups_users",
            "resources",
            "gpgkeys",
            "permissions",
            "secrets",
            "schema_migrations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
