//! Error types for the OpenPGP pipeline.

use thiserror::Error;

use coffer_core::Fingerprint;

/// Errors that can occur while validating, storing or probing keys.
///
/// Validation and probe failures are terminal for the operation that hit
/// them: a bad key stays bad, and the reason must reach the caller
/// verbatim. Only storage-level failures (`Io`) are candidates for retry.
#[derive(Debug, Error)]
pub enum PgpError {
    /// The input is not a well-formed armored OpenPGP block.
    #[error("malformed key: {0}")]
    MalformedKey(String),

    /// The key parsed but has a shape this call site does not accept,
    /// e.g. public-only material where a private key is required.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// The key carries an expiry date and policy forbids expiring keys.
    #[error("key expires at {expires_at} (unix ms); expiring keys are not supported")]
    ExpiringKeyRejected { expires_at: i64 },

    /// The keyring could not persist the key.
    #[error("import failed: {0}")]
    ImportFailed(String),

    /// No key with this fingerprint in the keyring.
    #[error("key not found in keyring: {0}")]
    KeyNotFound(Fingerprint),

    /// The probe could not encrypt with the candidate key.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// The probe could not decrypt its own ciphertext. This is the
    /// failure mode of passphrase-protected private keys, which are not
    /// supported.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Encrypt then decrypt did not return the original plaintext.
    #[error("round-trip mismatch: decrypted output differs from the probe plaintext")]
    RoundTripMismatch,

    /// Underlying I/O failure against keyring storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for OpenPGP operations.
pub type Result<T> = std::result::Result<T, PgpError>;
