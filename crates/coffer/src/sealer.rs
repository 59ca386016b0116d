//! Sealing: producing per-recipient ciphertext during reconciliation.
//!
//! The permission engine decides *who* needs a secret row; a sealer
//! decides *what bytes* go into it. The built-in [`KeyringSealer`]
//! encrypts a caller-supplied plaintext to each recipient's active key
//! through the keyring; tests substitute their own sealers.

use std::sync::Arc;

use bytes::Bytes;

use coffer_core::{GpgKeyRecord, Resource};
use coffer_pgp::{Keyring, PgpError};

/// Produces the ciphertext for one (resource, recipient) pair.
///
/// Sealing is CPU-bound OpenPGP work; the facade always invokes sealers
/// from a blocking worker.
pub trait SecretSealer: Send + Sync {
    fn seal(&self, resource: &Resource, recipient: &GpgKeyRecord)
        -> Result<Bytes, PgpError>;
}

/// Seals a fixed plaintext to each recipient via the keyring.
///
/// The plaintext is the secret material of the resource being shared,
/// supplied by the caller for the duration of one grant/reconcile call.
pub struct KeyringSealer {
    keyring: Arc<Keyring>,
    plaintext: Bytes,
}

impl KeyringSealer {
    pub fn new(keyring: Arc<Keyring>, plaintext: impl Into<Bytes>) -> Self {
        Self {
            keyring,
            plaintext: plaintext.into(),
        }
    }
}

impl SecretSealer for KeyringSealer {
    fn seal(
        &self,
        _resource: &Resource,
        recipient: &GpgKeyRecord,
    ) -> Result<Bytes, PgpError> {
        let armored = self.keyring.export_public(&recipient.fingerprint)?;
        let ciphertext = coffer_pgp::encrypt(&armored, &self.plaintext)?;
        Ok(Bytes::from(ciphertext))
    }
}
