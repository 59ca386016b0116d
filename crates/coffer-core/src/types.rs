//! Strong type definitions for the coffer core.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;

/// A canonical OpenPGP v4 fingerprint: 20 raw bytes, 40 hex characters.
///
/// This is the unique identity of a key within a keyring. Two keys with
/// the same fingerprint are the same key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 20]);

impl Fingerprint {
    /// Create a fingerprint from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Canonical form: 40 upper-hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Parse from a hex string (case-insensitive, exactly 40 characters).
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|_| CoreError::InvalidFingerprint(s.to_string()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidFingerprint(s.to_string()))?;
        Ok(Self(arr))
    }

    /// The long key id: the trailing 8 bytes of the fingerprint.
    pub fn key_id(&self) -> KeyId {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&self.0[12..]);
        KeyId(arr)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A long OpenPGP key id: the trailing 8 bytes of a v4 fingerprint,
/// 16 hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub [u8; 8]);

impl KeyId {
    /// Canonical form: 16 upper-hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Parse from a hex string (exactly 16 characters).
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|_| CoreError::InvalidKeyId(s.to_string()))?;
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidKeyId(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Declare a UUID-backed entity id newtype.
macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from the canonical hyphenated form.
            pub fn parse(s: &str) -> Result<Self, CoreError> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| CoreError::InvalidId(s.to_string()))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identifies a user record.
    UserId
);
entity_id!(
    /// Identifies a group record.
    GroupId
);
entity_id!(
    /// Identifies a resource (the logical secret entry).
    ResourceId
);
entity_id!(
    /// Identifies a permission row.
    PermissionId
);
entity_id!(
    /// Identifies a stored GPG key record.
    KeyRecordId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_hex_roundtrip() {
        let fpr = Fingerprint::from_bytes([0x42; 20]);
        let hex = fpr.to_hex();
        assert_eq!(hex.len(), 40);
        let recovered = Fingerprint::from_hex(&hex).unwrap();
        assert_eq!(fpr, recovered);
    }

    #[test]
    fn fingerprint_accepts_lowercase() {
        let fpr = Fingerprint::from_bytes([0xab; 20]);
        let recovered = Fingerprint::from_hex(&fpr.to_hex().to_lowercase()).unwrap();
        assert_eq!(fpr, recovered);
    }

    #[test]
    fn fingerprint_rejects_wrong_length() {
        assert!(Fingerprint::from_hex("abcd").is_err());
        assert!(Fingerprint::from_hex("").is_err());
    }

    #[test]
    fn key_id_is_fingerprint_tail() {
        let mut bytes = [0u8; 20];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let fpr = Fingerprint::from_bytes(bytes);
        let key_id = fpr.key_id();
        assert_eq!(key_id.to_hex(), "0C0D0E0F10111213");
        assert_eq!(fpr.to_hex().len(), 40);
        assert!(fpr.to_hex().ends_with(&key_id.to_hex()));
    }

    #[test]
    fn entity_ids_are_distinct() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(a, b);
        assert_eq!(UserId::parse(&a.to_string()).unwrap(), a);
    }
}
