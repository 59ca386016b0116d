//! # Coffer PGP
//!
//! The GPG key pipeline: parse and validate armored OpenPGP keys, store
//! them in a fingerprint-keyed keyring, and prove a candidate key usable
//! with an encrypt/decrypt round trip before it becomes an encryption
//! identity.
//!
//! ## Pipeline
//!
//! ```text
//! armored text -> validate::parse -> validate::validate (policy)
//!              -> probe::probe (round trip)
//!              -> Keyring::import (durable, keyed by fingerprint)
//! ```
//!
//! The steps are strictly sequential: each depends on the previous one
//! having succeeded. All of this work is CPU/IO-bound and synchronous;
//! callers on an async runtime run it on a blocking worker.
//!
//! ## Failure semantics
//!
//! Validation and probe failures are terminal and carry the underlying
//! reason. A passphrase-protected private key fails the probe with
//! `DecryptionFailed` naming the passphrase cause, which is exactly what
//! the caller must show the user.

pub mod armor;
pub mod error;
pub mod keyring;
pub mod probe;
pub mod validate;

pub use armor::{armored_private, armored_public};
pub use error::{PgpError, Result};
pub use keyring::Keyring;
pub use probe::{decrypt, encrypt, probe, PROBE_PLAINTEXT};
pub use validate::{parse, parse_private, parse_public, validate, KeyInfo, KeyPolicy};
