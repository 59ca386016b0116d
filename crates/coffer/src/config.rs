//! Typed configuration.
//!
//! Every recognized option is an explicit field, validated when the
//! config is constructed. The server key section is *consumed* here: the
//! installer records the resolved fingerprint and key material paths,
//! and this core reads them back.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use coffer_core::Fingerprint;
use coffer_pgp::KeyPolicy;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Location of the server key material on disk.
#[derive(Debug, Clone)]
pub struct ServerKeyConfig {
    /// Fingerprint recorded at installation, if the server key is set.
    pub fingerprint: Option<Fingerprint>,
    /// Where the armored public key is exported.
    pub public_path: PathBuf,
    /// Where the armored private key is exported.
    pub private_path: PathBuf,
}

/// Fully validated configuration for the coffer core.
#[derive(Debug, Clone)]
pub struct CofferConfig {
    /// Root directory of the keyring.
    pub keyring_dir: PathBuf,
    /// SQLite database file.
    pub database_path: PathBuf,
    pub server_key: ServerKeyConfig,
    pub key_policy: KeyPolicy,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    keyring_dir: PathBuf,
    database_path: PathBuf,
    server_key: RawServerKey,
    #[serde(default)]
    key_policy: RawKeyPolicy,
}

#[derive(Debug, Deserialize)]
struct RawServerKey {
    fingerprint: Option<String>,
    public_path: PathBuf,
    private_path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct RawKeyPolicy {
    reject_expiring: Option<bool>,
}

impl CofferConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        for (name, path) in [
            ("keyring_dir", &raw.keyring_dir),
            ("database_path", &raw.database_path),
            ("server_key.public_path", &raw.server_key.public_path),
            ("server_key.private_path", &raw.server_key.private_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }

        let fingerprint = raw
            .server_key
            .fingerprint
            .as_deref()
            .map(Fingerprint::from_hex)
            .transpose()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;

        Ok(Self {
            keyring_dir: raw.keyring_dir,
            database_path: raw.database_path,
            server_key: ServerKeyConfig {
                fingerprint,
                public_path: raw.server_key.public_path,
                private_path: raw.server_key.private_path,
            },
            key_policy: KeyPolicy {
                reject_expiring: raw.key_policy.reject_expiring.unwrap_or(true),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        keyring_dir = "/var/lib/coffer/keyring"
        database_path = "/var/lib/coffer/coffer.db"

        [server_key]
        public_path = "/etc/coffer/serverkey.asc"
        private_path = "/etc/coffer/serverkey_private.asc"
    "#;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = CofferConfig::from_toml(MINIMAL).unwrap();
        assert!(config.key_policy.reject_expiring);
        assert!(config.server_key.fingerprint.is_none());
    }

    #[test]
    fn fingerprint_is_validated() {
        let text = MINIMAL.replace(
            "[server_key]",
            "[server_key]\nfingerprint = \"not-hex\"",
        );
        assert!(matches!(
            CofferConfig::from_toml(&text),
            Err(ConfigError::Invalid(_))
        ));

        let text = MINIMAL.replace(
            "[server_key]",
            "[server_key]\nfingerprint = \"2FC8945050D3F5D5A9ECBBE6EC744072C1E78A61\"",
        );
        let config = CofferConfig::from_toml(&text).unwrap();
        assert!(config.server_key.fingerprint.is_some());
    }

    #[test]
    fn empty_path_is_rejected() {
        let text = MINIMAL.replace("/var/lib/coffer/keyring", "");
        assert!(matches!(
            CofferConfig::from_toml(&text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn garbage_toml_is_a_parse_error() {
        assert!(matches!(
            CofferConfig::from_toml("not [ valid"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn key_policy_can_be_relaxed_explicitly() {
        let text = format!("{MINIMAL}\n[key_policy]\nreject_expiring = false\n");
        let config = CofferConfig::from_toml(&text).unwrap();
        assert!(!config.key_policy.reject_expiring);
    }
}
