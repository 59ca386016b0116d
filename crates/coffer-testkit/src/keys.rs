//! In-process OpenPGP key generation for tests.
//!
//! Cv25519 keys generate in milliseconds, so every test builds fresh
//! material instead of shipping canned fixtures.

use openpgp::cert::prelude::*;
use openpgp::crypto::Password;
use sequoia_openpgp as openpgp;
use std::time::Duration;

use coffer_core::Fingerprint;
use coffer_pgp::{armored_private, armored_public};

/// A generated test key with both armored halves.
#[derive(Debug, Clone)]
pub struct TestKey {
    pub fingerprint: Fingerprint,
    pub public: String,
    pub private: String,
}

impl TestKey {
    /// A non-expiring key with signing and encryption subkeys.
    pub fn generate(uid: &str) -> Self {
        Self::from_builder(builder(uid))
    }

    /// A key whose primary key expires after `validity`.
    pub fn generate_expiring(uid: &str, validity: Duration) -> Self {
        Self::from_builder(builder(uid).set_validity_period(validity))
    }

    /// A key whose secret material is locked behind a passphrase.
    pub fn generate_locked(uid: &str, passphrase: &str) -> Self {
        Self::from_builder(builder(uid).set_password(Some(Password::from(passphrase))))
    }

    fn from_builder(builder: CertBuilder<'_>) -> Self {
        let (cert, _rev) = builder.generate().expect("keygen");
        let fingerprint =
            Fingerprint::from_hex(&cert.fingerprint().to_hex()).expect("v4 fingerprint");
        Self {
            fingerprint,
            public: armored_public(&cert).expect("armor public"),
            private: armored_private(&cert).expect("armor private"),
        }
    }
}

fn builder(uid: &str) -> CertBuilder<'static> {
    CertBuilder::new()
        .set_cipher_suite(CipherSuite::Cv25519)
        .add_userid(uid)
        .add_signing_subkey()
        .add_transport_encryption_subkey()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_parses() {
        let key = TestKey::generate("Ada <ada@example.org>");
        let info = coffer_pgp::parse(&key.public).unwrap();
        assert_eq!(info.fingerprint, key.fingerprint);
        assert!(info.expires_at.is_none());
    }

    #[test]
    fn expiring_key_reports_expiry() {
        let key = TestKey::generate_expiring(
            "Brief <brief@example.org>",
            Duration::from_secs(3600 * 24),
        );
        let info = coffer_pgp::parse(&key.public).unwrap();
        assert!(info.expires_at.is_some());
    }
}
