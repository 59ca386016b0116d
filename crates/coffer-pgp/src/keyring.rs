//! The keyring: durable key storage keyed by fingerprint.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/public/<FINGERPRINT>.asc   armored public certificate
//! <root>/secret/<FINGERPRINT>.asc   armored secret certificate (if any)
//! ```
//!
//! Every write goes through a temp file in the target directory followed
//! by an atomic rename, so a crashed import never leaves a torn entry.
//! Concurrent imports of the same fingerprint are last-write-wins: both
//! writers serialize the same certificate, so either outcome is a
//! complete, correct file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use openpgp::parse::Parse;
use openpgp::Cert;
use sequoia_openpgp as openpgp;
use tempfile::NamedTempFile;
use tracing::debug;

use coffer_core::Fingerprint;

use crate::armor::{armored_private, armored_public};
use crate::error::{PgpError, Result};
use crate::validate::parse_cert;

/// Directory-backed keyring. Exclusive owner of keyring state.
#[derive(Debug, Clone)]
pub struct Keyring {
    root: PathBuf,
}

impl Keyring {
    /// Open (and if needed create) a keyring rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("public"))?;
        fs::create_dir_all(root.join("secret"))?;
        Ok(Self { root })
    }

    /// Import an armored certificate, public or private.
    ///
    /// Idempotent: importing a fingerprint that is already present
    /// overwrites it with identical content and returns the fingerprint.
    /// The certificate's public half is always stored; the secret half is
    /// stored only when present in the input.
    pub fn import(&self, armored: &str) -> Result<Fingerprint> {
        let cert = parse_cert(armored)?;
        let fingerprint = Fingerprint::from_hex(&cert.fingerprint().to_hex()).map_err(|_| {
            PgpError::UnsupportedKeyType(
                "unsupported fingerprint shape; only v4 keys are accepted".to_string(),
            )
        })?;

        self.write_entry(&self.public_dir(), &fingerprint, &armored_public(&cert)?)?;
        if cert.is_tsk() {
            self.write_entry(&self.secret_dir(), &fingerprint, &armored_private(&cert)?)?;
        }

        debug!(fingerprint = %fingerprint, secret = cert.is_tsk(), "imported key");
        Ok(fingerprint)
    }

    /// Export the armored public certificate for a fingerprint.
    pub fn export_public(&self, fingerprint: &Fingerprint) -> Result<String> {
        self.read_entry(&self.public_dir(), fingerprint)
    }

    /// Export the armored secret certificate for a fingerprint.
    pub fn export_private(&self, fingerprint: &Fingerprint) -> Result<String> {
        self.read_entry(&self.secret_dir(), fingerprint)
    }

    /// Whether the keyring holds a public entry for this fingerprint.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entry_path(&self.public_dir(), fingerprint).is_file()
    }

    /// List all fingerprints with a public entry.
    pub fn list(&self) -> Result<Vec<Fingerprint>> {
        let mut fingerprints = Vec::new();
        for entry in fs::read_dir(self.public_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("asc") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(fpr) = Fingerprint::from_hex(stem) {
                fingerprints.push(fpr);
            }
        }
        fingerprints.sort_by_key(|f| f.to_hex());
        Ok(fingerprints)
    }

    /// Load the parsed certificate for a fingerprint, preferring the
    /// secret entry when one exists.
    pub fn load_cert(&self, fingerprint: &Fingerprint) -> Result<Cert> {
        let armored = match self.export_private(fingerprint) {
            Ok(armored) => armored,
            Err(PgpError::KeyNotFound(_)) => self.export_public(fingerprint)?,
            Err(err) => return Err(err),
        };
        Cert::from_bytes(armored.as_bytes())
            .map_err(|err| PgpError::MalformedKey(format!("stored entry unreadable: {err}")))
    }

    fn public_dir(&self) -> PathBuf {
        self.root.join("public")
    }

    fn secret_dir(&self) -> PathBuf {
        self.root.join("secret")
    }

    fn entry_path(&self, dir: &Path, fingerprint: &Fingerprint) -> PathBuf {
        dir.join(format!("{}.asc", fingerprint.to_hex()))
    }

    fn write_entry(&self, dir: &Path, fingerprint: &Fingerprint, armored: &str) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|err| PgpError::ImportFailed(format!("temp file error: {err}")))?;
        tmp.write_all(armored.as_bytes())
            .map_err(|err| PgpError::ImportFailed(format!("temp write error: {err}")))?;
        tmp.persist(self.entry_path(dir, fingerprint))
            .map_err(|err| PgpError::ImportFailed(format!("rename failed: {err}")))?;
        Ok(())
    }

    fn read_entry(&self, dir: &Path, fingerprint: &Fingerprint) -> Result<String> {
        let path = self.entry_path(dir, fingerprint);
        match fs::read_to_string(&path) {
            Ok(armored) => Ok(armored),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(PgpError::KeyNotFound(*fingerprint))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{armored_private_for, armored_public_for, plain_cert};

    fn temp_keyring() -> (tempfile::TempDir, Keyring) {
        let dir = tempfile::tempdir().expect("tempdir");
        let keyring = Keyring::open(dir.path()).expect("open keyring");
        (dir, keyring)
    }

    #[test]
    fn import_returns_fingerprint() {
        let (_dir, keyring) = temp_keyring();
        let cert = plain_cert("Ada <ada@example.org>");

        let fpr = keyring.import(&armored_public_for(&cert)).unwrap();
        assert_eq!(fpr.to_hex(), cert.fingerprint().to_hex());
        assert!(keyring.contains(&fpr));
    }

    #[test]
    fn import_is_idempotent() {
        let (_dir, keyring) = temp_keyring();
        let cert = plain_cert("Ada <ada@example.org>");
        let armored = armored_public_for(&cert);

        let first = keyring.import(&armored).unwrap();
        let second = keyring.import(&armored).unwrap();
        assert_eq!(first, second);
        assert_eq!(keyring.list().unwrap(), vec![first]);
    }

    #[test]
    fn public_import_has_no_secret_entry() {
        let (_dir, keyring) = temp_keyring();
        let cert = plain_cert("Ada <ada@example.org>");

        let fpr = keyring.import(&armored_public_for(&cert)).unwrap();
        assert!(keyring.export_public(&fpr).is_ok());
        match keyring.export_private(&fpr) {
            Err(PgpError::KeyNotFound(missing)) => assert_eq!(missing, fpr),
            other => panic!("expected KeyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn private_import_stores_both_halves() {
        let (_dir, keyring) = temp_keyring();
        let cert = plain_cert("Ada <ada@example.org>");

        let fpr = keyring.import(&armored_private_for(&cert)).unwrap();
        let public = keyring.export_public(&fpr).unwrap();
        let private = keyring.export_private(&fpr).unwrap();
        assert!(public.contains("BEGIN PGP PUBLIC KEY BLOCK"));
        assert!(private.contains("BEGIN PGP PRIVATE KEY BLOCK"));
    }

    #[test]
    fn export_unknown_fingerprint_fails() {
        let (_dir, keyring) = temp_keyring();
        let fpr = Fingerprint::from_bytes([0x11; 20]);
        assert!(matches!(
            keyring.export_public(&fpr),
            Err(PgpError::KeyNotFound(_))
        ));
    }

    #[test]
    fn import_rejects_garbage() {
        let (_dir, keyring) = temp_keyring();
        assert!(matches!(
            keyring.import("garbage"),
            Err(PgpError::MalformedKey(_))
        ));
    }

    #[test]
    fn list_orders_by_fingerprint() {
        let (_dir, keyring) = temp_keyring();
        let a = keyring
            .import(&armored_public_for(&plain_cert("A <a@example.org>")))
            .unwrap();
        let b = keyring
            .import(&armored_public_for(&plain_cert("B <b@example.org>")))
            .unwrap();

        let mut expected = vec![a, b];
        expected.sort_by_key(|f| f.to_hex());
        assert_eq!(keyring.list().unwrap(), expected);
    }
}
