//! Content-addressed membership sets for the handles ledger.
//!
//! A [`HashVault`] is a set of 32-byte hash keys with no payload: a key is
//! present if and only if the fact it stands for (membership, caption claim,
//! delegation) currently holds.
//!
//! # Storage Backends
//!
//! All backends implement the [`HashStore`] trait:
//!
//! - [`MemoryHashStore`] -- `BTreeSet`-based store for tests, clones, and
//!   memory-only nodes
//! - [`FileHashStore`] -- ordered in-memory index backed by a CRC-framed
//!   append-only journal on disk
//!
//! # Design Rules
//!
//! 1. Insert and remove are idempotent; only state changes reach the journal.
//! 2. The serialized image is canonical: keys in ascending order, so equal
//!    sets always produce identical bytes and identical content hashes.
//! 3. Clones are independent memory-backed snapshots.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod image;
pub mod memory;
pub mod traits;
pub mod vault;

pub use error::{VaultError, VaultResult};
pub use file::FileHashStore;
pub use memory::MemoryHashStore;
pub use traits::HashStore;
pub use vault::HashVault;
