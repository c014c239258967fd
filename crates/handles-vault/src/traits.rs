use handles_types::Hash;

use crate::error::VaultResult;

/// Keyed presence store backing a [`HashVault`](crate::HashVault).
///
/// All implementations must satisfy these invariants:
/// - `insert` and `remove` are idempotent and report whether they changed
///   the set.
/// - `exists` has no side effects and never fails; durable backends keep an
///   in-memory index for lookups.
/// - `keys` returns the full population in ascending order.
/// - Methods take `&self`; backends lock internally so snapshots can be taken
///   while the owner keeps mutating.
pub trait HashStore: Send + Sync {
    /// Mark `key` present. Returns `true` if it was absent.
    fn insert(&self, key: Hash) -> VaultResult<bool>;

    /// Mark `key` absent. Returns `true` if it was present.
    fn remove(&self, key: &Hash) -> VaultResult<bool>;

    /// Check whether `key` is present.
    fn exists(&self, key: &Hash) -> bool;

    /// Number of keys present.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys in ascending order.
    fn keys(&self) -> Vec<Hash>;

    /// Whether writes are still accepted.
    fn is_open(&self) -> bool;

    /// Drop superseded history from durable storage. The population is
    /// unchanged.
    fn compact(&self) -> VaultResult<()>;

    /// Release backing resources. A second call returns `VaultError::Closed`.
    fn close(&self) -> VaultResult<()>;

    /// Short backend label for logs.
    fn backend(&self) -> &'static str;
}
