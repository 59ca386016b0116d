//! Encrypt/decrypt primitives and the round-trip probe.
//!
//! The probe is the last gate before a key becomes an encryption
//! identity: it encrypts a fixed plaintext to the candidate key, decrypts
//! the result with the same key, and compares byte-for-byte. It is the
//! only defense against importing a key that silently cannot be used at
//! runtime (the classic case being a private key locked behind a
//! passphrase).

use std::io::Read;

use openpgp::crypto::SessionKey;
use openpgp::packet::{PKESK, SKESK};
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageStructure, VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Armorer, Encryptor, LiteralWriter, Message, Recipient};
use openpgp::types::SymmetricAlgorithm;
use openpgp::{Cert, KeyHandle};
use sequoia_openpgp as openpgp;

use crate::error::{PgpError, Result};
use crate::validate::parse_cert;

/// The plaintext every probe round-trips.
pub const PROBE_PLAINTEXT: &[u8] = b"open source password manager for teams";

/// Encrypt `plaintext` to the given armored key, producing an armored
/// PGP message.
pub fn encrypt(armored_key: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cert = parse_cert(armored_key)?;
    encrypt_to_cert(&cert, plaintext)
}

/// Decrypt an armored PGP message with the secret material of the given
/// armored key.
pub fn decrypt(armored_key: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cert = parse_cert(armored_key)?;
    decrypt_with_cert(&cert, ciphertext)
}

/// Round-trip self-test for a candidate key.
///
/// Requires secret material: a key that cannot decrypt its own messages
/// must never become an encryption identity. The three failure kinds are
/// surfaced distinctly so the caller can tell the user what actually went
/// wrong.
pub fn probe(armored_key: &str) -> Result<()> {
    let cert = parse_cert(armored_key)?;
    let ciphertext = encrypt_to_cert(&cert, PROBE_PLAINTEXT)?;
    let decrypted = decrypt_with_cert(&cert, &ciphertext)?;
    if decrypted != PROBE_PLAINTEXT {
        return Err(PgpError::RoundTripMismatch);
    }
    Ok(())
}

pub(crate) fn encrypt_to_cert(cert: &Cert, plaintext: &[u8]) -> Result<Vec<u8>> {
    let policy = StandardPolicy::new();
    let recipients: Vec<Recipient<'_>> = cert
        .keys()
        .with_policy(&policy, None)
        .supported()
        .alive()
        .revoked(false)
        .for_transport_encryption()
        .map(|key| key.into())
        .collect();
    if recipients.is_empty() {
        return Err(PgpError::EncryptionFailed(
            "no encryption-capable keys found".to_string(),
        ));
    }

    let mut sink = Vec::new();
    let message = Message::new(&mut sink);
    let message = Armorer::new(message)
        .build()
        .map_err(|err| PgpError::EncryptionFailed(format!("armor failed: {err}")))?;
    let message = Encryptor::for_recipients(message, recipients)
        .build()
        .map_err(|err| PgpError::EncryptionFailed(format!("encryptor failed: {err}")))?;
    let mut message = LiteralWriter::new(message)
        .build()
        .map_err(|err| PgpError::EncryptionFailed(format!("literal writer failed: {err}")))?;
    std::io::Write::write_all(&mut message, plaintext)
        .map_err(|err| PgpError::EncryptionFailed(format!("write failed: {err}")))?;
    message
        .finalize()
        .map_err(|err| PgpError::EncryptionFailed(format!("finalize failed: {err}")))?;

    Ok(sink)
}

pub(crate) fn decrypt_with_cert(cert: &Cert, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let helper = ProbeHelper::new(cert.clone());
    let locked = helper.has_locked_secret;

    let policy = StandardPolicy::new();
    let mut decryptor = DecryptorBuilder::from_bytes(ciphertext)
        .map_err(|err| PgpError::DecryptionFailed(format!("parse failed: {err}")))?
        .with_policy(&policy, None, helper)
        .map_err(|err| decryption_error(err, locked))?;

    let mut out = Vec::new();
    decryptor
        .read_to_end(&mut out)
        .map_err(|err| decryption_error(err, locked))?;
    Ok(out)
}

fn decryption_error(err: impl std::fmt::Display, locked: bool) -> PgpError {
    if locked {
        PgpError::DecryptionFailed(
            "secret key is protected by a passphrase, which is not supported".to_string(),
        )
    } else {
        PgpError::DecryptionFailed(err.to_string())
    }
}

struct ProbeHelper {
    cert: Cert,
    has_locked_secret: bool,
}

impl ProbeHelper {
    fn new(cert: Cert) -> Self {
        let has_locked_secret = cert
            .keys()
            .secret()
            .any(|key| key.key().secret().is_encrypted());
        Self {
            cert,
            has_locked_secret,
        }
    }
}

impl VerificationHelper for ProbeHelper {
    fn get_certs(&mut self, ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        let fpr = self.cert.fingerprint();
        if ids.is_empty() || ids.iter().any(|id| fpr.aliases(id)) {
            Ok(vec![self.cert.clone()])
        } else {
            Ok(vec![])
        }
    }

    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        Ok(())
    }
}

impl DecryptionHelper for ProbeHelper {
    fn decrypt(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        decrypt: &mut dyn FnMut(Option<SymmetricAlgorithm>, &SessionKey) -> bool,
    ) -> openpgp::Result<Option<Cert>> {
        let policy = StandardPolicy::new();
        for pkesk in pkesks {
            for key in self
                .cert
                .keys()
                .secret()
                .with_policy(&policy, None)
                .supported()
                .alive()
                .revoked(false)
                .for_transport_encryption()
            {
                let key = key.key().clone();
                if key.secret().is_encrypted() {
                    // Passphrase-locked material is unsupported; skip it so
                    // the failure surfaces as DecryptionFailed with the
                    // passphrase cause.
                    continue;
                }
                let mut keypair = key.into_keypair()?;
                if let Some((algo, sk)) = pkesk.decrypt(&mut keypair, sym_algo) {
                    if decrypt(algo, &sk) {
                        return Ok(Some(self.cert.clone()));
                    }
                }
            }
        }
        Ok(None)
    }
}
