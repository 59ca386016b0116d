//! # Coffer Testkit
//!
//! Testing utilities for the coffer workspace.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Keys**: in-process OpenPGP key generation (no canned fixtures,
//!   no external gpg binary)
//! - **Fixtures**: a directory builder that seeds a [`MemoryStore`]
//!   with users, groups and resources
//! - **Generators**: proptest strategies for permission rows
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use coffer_testkit::TestDirectory;
//!
//! # async fn example() {
//! let mut dir = TestDirectory::new();
//! let ada = dir.add_user("ada");
//! let ops = dir.add_group("ops", &[ada]);
//! let store = dir.seed_memory().await;
//! # }
//! ```
//!
//! [`MemoryStore`]: coffer_store::MemoryStore

pub mod fixtures;
pub mod generators;
pub mod keys;

pub use fixtures::TestDirectory;
pub use keys::TestKey;
