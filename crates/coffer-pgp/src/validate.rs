//! Armored key parsing and policy validation.
//!
//! Parsing is pure inspection: it never touches the keyring. The output
//! is a [`KeyInfo`] carrying everything the directory stores about a key.

use std::time::UNIX_EPOCH;

use openpgp::cert::prelude::*;
use openpgp::parse::{PacketParser, Parse};
use openpgp::policy::StandardPolicy;
use sequoia_openpgp as openpgp;

use coffer_core::{Fingerprint, KeyId};

use crate::error::{PgpError, Result};

/// Metadata extracted from one armored OpenPGP certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub fingerprint: Fingerprint,
    pub key_id: KeyId,
    /// Primary user id ("Name <email>"), empty if the key carries none.
    pub uid: String,
    pub bits: u32,
    pub algorithm: String,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds; `None` for keys that never expire.
    pub expires_at: Option<i64>,
    /// Whether the certificate carries secret key material.
    pub has_secret: bool,
}

/// Validation policy for imported keys.
#[derive(Debug, Clone, Copy)]
pub struct KeyPolicy {
    /// Reject keys that carry an expiry date. Always on in production:
    /// an expired key would strand every ciphertext encrypted to it.
    pub reject_expiring: bool,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            reject_expiring: true,
        }
    }
}

/// Parse a single armored certificate, public or private.
///
/// Fails with `MalformedKey` on anything that is not exactly one
/// well-formed OpenPGP certificate.
pub fn parse(armored: &str) -> Result<KeyInfo> {
    let cert = parse_cert(armored)?;
    key_info(&cert)
}

/// Parse an armored *public* key.
///
/// Fails with `UnsupportedKeyType` if the block carries secret material.
pub fn parse_public(armored: &str) -> Result<KeyInfo> {
    let info = parse(armored)?;
    if info.has_secret {
        return Err(PgpError::UnsupportedKeyType(
            "expected a public key, found secret key material".to_string(),
        ));
    }
    Ok(info)
}

/// Parse an armored *private* key.
///
/// Fails with `UnsupportedKeyType` if the block is public-only.
pub fn parse_private(armored: &str) -> Result<KeyInfo> {
    let info = parse(armored)?;
    if !info.has_secret {
        return Err(PgpError::UnsupportedKeyType(
            "expected a private key, found public-only material".to_string(),
        ));
    }
    Ok(info)
}

/// Apply the key policy to parsed metadata.
///
/// Returns the fingerprint on acceptance so call sites can thread it to
/// the keyring without re-parsing.
pub fn validate(info: &KeyInfo, policy: &KeyPolicy) -> Result<Fingerprint> {
    if policy.reject_expiring {
        if let Some(expires_at) = info.expires_at {
            return Err(PgpError::ExpiringKeyRejected { expires_at });
        }
    }
    Ok(info.fingerprint)
}

/// Parse exactly one certificate out of armored text.
pub(crate) fn parse_cert(armored: &str) -> Result<Cert> {
    let ppr = PacketParser::from_bytes(armored.as_bytes())
        .map_err(|err| PgpError::MalformedKey(format!("parse failed: {err}")))?;

    let mut parser = CertParser::from(ppr);
    let first = parser
        .next()
        .ok_or_else(|| PgpError::MalformedKey("no certificate found".to_string()))?
        .map_err(|err| PgpError::MalformedKey(format!("invalid certificate: {err}")))?;

    if parser.next().is_some() {
        return Err(PgpError::MalformedKey(
            "expected exactly one certificate".to_string(),
        ));
    }

    Ok(first)
}

/// Extract metadata from a parsed certificate.
pub(crate) fn key_info(cert: &Cert) -> Result<KeyInfo> {
    let fpr = cert.fingerprint();
    let fingerprint = Fingerprint::from_hex(&fpr.to_hex()).map_err(|_| {
        PgpError::UnsupportedKeyType(format!(
            "unsupported fingerprint shape ({} hex chars); only v4 keys are accepted",
            fpr.to_hex().len()
        ))
    })?;

    let primary = cert.primary_key().key();
    let created_at = primary
        .creation_time()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    // Expiry is a property of the primary key binding, so it needs the
    // standard policy. A certificate with no valid binding is unusable.
    let policy = StandardPolicy::new();
    let valid = cert
        .with_policy(&policy, None)
        .map_err(|err| PgpError::MalformedKey(format!("no valid self-signature: {err}")))?;
    let expires_at = valid
        .primary_key()
        .key_expiration_time()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64);

    let uid = cert
        .userids()
        .next()
        .map(|u| u.userid().to_string())
        .unwrap_or_default();

    Ok(KeyInfo {
        fingerprint,
        key_id: fingerprint.key_id(),
        uid,
        bits: primary.mpis().bits().unwrap_or(0) as u32,
        algorithm: format!("{:?}", primary.pk_algo()),
        created_at,
        expires_at,
        has_secret: cert.is_tsk(),
    })
}
