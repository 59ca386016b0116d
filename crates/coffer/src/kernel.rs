//! The facade: one object tying the key pipeline, the permission engine
//! and the store together.
//!
//! Operations here are the system's external surface. Each one is a
//! single logical unit: the import → probe → export sequence for keys is
//! strictly ordered, and every permission change commits together with
//! its secret reconciliation.

use std::path::Path;
use std::sync::Arc;

use tokio::task;
use tracing::info;

use coffer_core::{
    Aro, Fingerprint, GpgKeyRecord, KeyRecordId, Permission, PermissionId, PermissionType,
    Resource, ResourceId, Secret, UserId,
};
use coffer_pgp::{self as pgp, Keyring, PgpError};
use coffer_store::{secret_now, AccessChange, PermissionOp, Store};

use crate::config::ServerKeyConfig;
use crate::error::{CofferError, Result};
use crate::sealer::SecretSealer;

/// Outcome of one access change or reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    /// Users whose secret row was created.
    pub created: Vec<UserId>,
    /// Users whose secret row was deleted.
    pub deleted: Vec<UserId>,
}

impl ReconcileOutcome {
    /// Whether the stored state was already converged.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

/// Result of registering a user's key.
#[derive(Debug, Clone)]
pub struct KeyRegistration {
    pub record: GpgKeyRecord,
    /// Resources whose secret rows were purged because they were
    /// encrypted to the replaced key. Each needs a reconcile with fresh
    /// ciphertext before the user can read it again.
    pub stale_resources: Vec<ResourceId>,
}

/// The coffer core.
pub struct Coffer<S: Store> {
    keyring: Arc<Keyring>,
    store: Arc<S>,
    policy: pgp::KeyPolicy,
}

impl<S: Store + 'static> Coffer<S> {
    pub fn new(keyring: Keyring, store: S, policy: pgp::KeyPolicy) -> Self {
        Self {
            keyring: Arc::new(keyring),
            store: Arc::new(store),
            policy,
        }
    }

    /// The keyring this core owns.
    pub fn keyring(&self) -> &Arc<Keyring> {
        &self.keyring
    }

    /// The storage backend.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Install the server's encryption identity.
    ///
    /// Validates the armored private key, proves it usable with the
    /// round-trip probe, imports it into the keyring, and exports both
    /// armored halves to the configured paths. Returns the fingerprint
    /// for the surrounding configuration layer to record.
    ///
    /// The sequence is strictly ordered; any failure aborts the install
    /// with the step's own error, and a key that fails the probe is
    /// never recorded as an identity.
    pub async fn install_server_key(
        &self,
        armored_private: &str,
        server_key: &ServerKeyConfig,
    ) -> Result<Fingerprint> {
        let armored = armored_private.to_string();
        let keyring = Arc::clone(&self.keyring);
        let policy = self.policy;
        let public_path = server_key.public_path.clone();
        let private_path = server_key.private_path.clone();

        let fingerprint = run_blocking(move || {
            let info = pgp::parse_private(&armored)?;
            pgp::validate(&info, &policy)?;
            pgp::probe(&armored)?;
            let fingerprint = keyring.import(&armored)?;

            let public = keyring.export_public(&fingerprint)?;
            let private = keyring.export_private(&fingerprint)?;
            write_atomic(&public_path, public.as_bytes())?;
            write_atomic(&private_path, private.as_bytes())?;
            Ok(fingerprint)
        })
        .await?;

        info!(fingerprint = %fingerprint, "server key installed");
        Ok(fingerprint)
    }

    /// Register (or replace) a user's public key.
    ///
    /// The key must parse as public-only material, satisfy the key
    /// policy, and accept ciphertext. Any previous key record is
    /// soft-deleted, and the user's secret rows are purged: they were
    /// encrypted to the old key and must be recreated by reconciling the
    /// affected resources.
    pub async fn register_user_key(
        &self,
        user_id: UserId,
        armored_public: &str,
    ) -> Result<KeyRegistration> {
        let user = self
            .store
            .get_user(&user_id)
            .await?
            .filter(|u| u.is_usable())
            .ok_or(CofferError::UserNotFound(user_id))?;

        let armored = armored_public.to_string();
        let keyring = Arc::clone(&self.keyring);
        let policy = self.policy;
        let (info, fingerprint) = run_blocking(move || {
            let info = pgp::parse_public(&armored)?;
            pgp::validate(&info, &policy)?;
            // The decrypt half of the probe needs secret material, which
            // public registration forbids; proving the key can receive
            // ciphertext is the reachable half.
            pgp::encrypt(&armored, pgp::PROBE_PLAINTEXT)?;
            let fingerprint = keyring.import(&armored)?;
            Ok((info, fingerprint))
        })
        .await?;

        self.store.retire_user_keys(&user_id).await?;

        let record = GpgKeyRecord {
            id: KeyRecordId::new(),
            user_id,
            fingerprint,
            key_id: info.key_id,
            uid: info.uid,
            bits: info.bits,
            algorithm: info.algorithm,
            armored_key: armored_public.to_string(),
            key_created_at: info.created_at,
            expires_at: info.expires_at,
            deleted: false,
            created_at: now_millis(),
        };
        self.store.insert_key_record(&record).await?;

        let stale_resources = self.store.resources_with_secret_for(&user_id).await?;
        self.store.delete_secrets_for_user(&user_id).await?;

        info!(
            user = %user.username,
            fingerprint = %fingerprint,
            stale = stale_resources.len(),
            "user key registered"
        );
        Ok(KeyRegistration {
            record,
            stale_resources,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources and access
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a resource owned by `owner`.
    ///
    /// Inserts the resource row, grants `Owner` to the user, and seals
    /// the owner's secret row, all before returning.
    pub async fn create_resource(
        &self,
        resource: &Resource,
        owner: UserId,
        sealer: Arc<dyn SecretSealer>,
    ) -> Result<PermissionId> {
        self.store.upsert_resource(resource).await?;
        self.grant(resource.id, Aro::user(owner), PermissionType::Owner, sealer)
            .await
    }

    /// Grant a permission and reconcile secrets in one atomic unit.
    pub async fn grant(
        &self,
        resource_id: ResourceId,
        aro: Aro,
        permission_type: PermissionType,
        sealer: Arc<dyn SecretSealer>,
    ) -> Result<PermissionId> {
        let permission = Permission {
            id: PermissionId::new(),
            resource_id,
            aro,
            permission_type,
            created_at: now_millis(),
        };
        let id = permission.id;
        self.change_access(resource_id, Some(PermissionOp::Grant(permission)), sealer)
            .await?;
        Ok(id)
    }

    /// Revoke a permission row and reconcile secrets in one atomic unit.
    pub async fn revoke(
        &self,
        resource_id: ResourceId,
        permission_id: PermissionId,
        sealer: Arc<dyn SecretSealer>,
    ) -> Result<ReconcileOutcome> {
        self.change_access(
            resource_id,
            Some(PermissionOp::Revoke(permission_id)),
            sealer,
        )
        .await
    }

    /// Bring secret rows into agreement with the resolved permission
    /// set. Idempotent: re-running after a partial failure converges.
    pub async fn reconcile(
        &self,
        resource_id: ResourceId,
        sealer: Arc<dyn SecretSealer>,
    ) -> Result<ReconcileOutcome> {
        self.change_access(resource_id, None, sealer).await
    }

    /// Resolve the effective permission of a user on a resource.
    pub async fn resolve(
        &self,
        user_id: UserId,
        resource_id: ResourceId,
    ) -> Result<Option<PermissionType>> {
        let snapshot = self
            .store
            .load_snapshot(&resource_id)
            .await?
            .ok_or(CofferError::ResourceNotFound(resource_id))?;
        Ok(snapshot.resolve(&user_id))
    }

    /// Fetch the user's ciphertext for a resource, enforcing access.
    pub async fn secret_for(&self, user_id: UserId, resource_id: ResourceId) -> Result<Secret> {
        if self.resolve(user_id, resource_id).await?.is_none() {
            return Err(CofferError::PermissionDenied {
                user_id,
                resource_id,
            });
        }
        self.store
            .get_secret(&resource_id, &user_id)
            .await?
            .ok_or(CofferError::SecretMissing {
                user_id,
                resource_id,
            })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn change_access(
        &self,
        resource_id: ResourceId,
        op: Option<PermissionOp>,
        sealer: Arc<dyn SecretSealer>,
    ) -> Result<ReconcileOutcome> {
        let snapshot = self
            .store
            .load_snapshot(&resource_id)
            .await?
            .ok_or(CofferError::ResourceNotFound(resource_id))?;

        let prospective = match &op {
            Some(PermissionOp::Grant(permission)) => snapshot.with_permission(permission.clone()),
            Some(PermissionOp::Revoke(id)) => {
                if !snapshot.permissions().iter().any(|p| p.id == *id) {
                    return Err(CofferError::PermissionNotFound(*id));
                }
                snapshot.without_permission(id)
            }
            None => snapshot,
        };

        let holders = self.store.secret_holders(&resource_id).await?;
        let plan = prospective.plan_reconcile(&holders);

        // Every new holder must have an active key before any sealing
        // starts; a missing key aborts the whole change.
        let mut recipients = Vec::with_capacity(plan.create.len());
        for user_id in &plan.create {
            let record = self
                .store
                .active_key_for_user(user_id)
                .await?
                .ok_or(CofferError::NoActiveKey(*user_id))?;
            recipients.push(record);
        }

        let secret_puts = if recipients.is_empty() {
            Vec::new()
        } else {
            let resource = prospective.resource().clone();
            run_blocking(move || {
                recipients
                    .iter()
                    .map(|recipient| {
                        let ciphertext = sealer.seal(&resource, recipient)?;
                        Ok(secret_now(resource.id, recipient.user_id, ciphertext))
                    })
                    .collect::<Result<Vec<Secret>>>()
            })
            .await?
        };

        let change = AccessChange {
            resource_id,
            op,
            basis: prospective.permissions().iter().map(|p| p.id).collect(),
            secret_puts,
            secret_deletes: plan.delete.clone(),
        };
        self.store.apply_access_change(&change).await?;

        info!(
            resource = %resource_id,
            created = plan.create.len(),
            deleted = plan.delete.len(),
            "access reconciled"
        );
        Ok(ReconcileOutcome {
            created: plan.create,
            deleted: plan.delete,
        })
    }
}

/// Run CPU/IO-bound key work on a blocking worker.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|err| CofferError::Runtime(format!("blocking task failed: {err}")))?
}

/// Write a file through a temp sibling and an atomic rename.
fn write_atomic(path: &Path, contents: &[u8]) -> std::result::Result<(), PgpError> {
    use std::io::Write;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|err| PgpError::ImportFailed(format!("temp file error: {err}")))?;
    tmp.write_all(contents)
        .map_err(|err| PgpError::ImportFailed(format!("temp write error: {err}")))?;
    tmp.persist(path)
        .map_err(|err| PgpError::ImportFailed(format!("rename failed: {err}")))?;
    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
