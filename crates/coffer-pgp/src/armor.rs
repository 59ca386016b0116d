//! Armoring helpers shared by the keyring and the probe.

use openpgp::armor::{Kind as ArmorKind, Writer as ArmorWriter};
use openpgp::serialize::Serialize;
use openpgp::Cert;
use sequoia_openpgp as openpgp;

use crate::error::{PgpError, Result};

/// Serialize the public half of a certificate as armored text.
pub fn armored_public(cert: &Cert) -> Result<String> {
    armored(cert, false)
}

/// Serialize the certificate including secret material as armored text.
///
/// Fails with `UnsupportedKeyType` when the certificate is public-only.
pub fn armored_private(cert: &Cert) -> Result<String> {
    if !cert.is_tsk() {
        return Err(PgpError::UnsupportedKeyType(
            "no secret key material to export".to_string(),
        ));
    }
    armored(cert, true)
}

fn armored(cert: &Cert, secret: bool) -> Result<String> {
    let kind = if secret {
        ArmorKind::SecretKey
    } else {
        ArmorKind::PublicKey
    };
    let mut writer = ArmorWriter::new(Vec::new(), kind)
        .map_err(|err| PgpError::ImportFailed(format!("armor failed: {err}")))?;
    if secret {
        cert.as_tsk()
            .serialize(&mut writer)
            .map_err(|err| PgpError::ImportFailed(format!("serialize failed: {err}")))?;
    } else {
        cert.serialize(&mut writer)
            .map_err(|err| PgpError::ImportFailed(format!("serialize failed: {err}")))?;
    }
    let bytes = writer
        .finalize()
        .map_err(|err| PgpError::ImportFailed(format!("armor finalize failed: {err}")))?;
    String::from_utf8(bytes)
        .map_err(|err| PgpError::ImportFailed(format!("armor output not utf-8: {err}")))
}
