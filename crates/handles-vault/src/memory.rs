use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use handles_types::Hash;

use crate::error::{VaultError, VaultResult};
use crate::traits::HashStore;

/// In-memory, `BTreeSet`-based hash store.
///
/// Used for memory-only nodes, tests, and every clone. Keys live behind a
/// `RwLock`; the ordered set makes `keys()` canonical without sorting.
pub struct MemoryHashStore {
    keys: RwLock<BTreeSet<Hash>>,
    closed: RwLock<bool>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::from_keys(BTreeSet::new())
    }

    /// Build a store that already holds `keys`.
    pub fn from_keys(keys: impl IntoIterator<Item = Hash>) -> Self {
        Self {
            keys: RwLock::new(keys.into_iter().collect()),
            closed: RwLock::new(false),
        }
    }

    fn ensure_open(&self) -> VaultResult<()> {
        if *self.closed.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(VaultError::Closed(self.backend().into()));
        }
        Ok(())
    }
}

impl Default for MemoryHashStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HashStore for MemoryHashStore {
    fn insert(&self, key: Hash) -> VaultResult<bool> {
        self.ensure_open()?;
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        Ok(keys.insert(key))
    }

    fn remove(&self, key: &Hash) -> VaultResult<bool> {
        self.ensure_open()?;
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        Ok(keys.remove(key))
    }

    fn exists(&self, key: &Hash) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn keys(&self) -> Vec<Hash> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    fn is_open(&self) -> bool {
        !*self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Nothing to compact in memory.
    fn compact(&self) -> VaultResult<()> {
        self.ensure_open()
    }

    fn close(&self) -> VaultResult<()> {
        let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Err(VaultError::Closed(self.backend().into()));
        }
        *closed = true;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryHashStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHashStore")
            .field("key_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> Hash {
        Hash::from_bytes(&[seed])
    }

    #[test]
    fn insert_is_idempotent() {
        let store = MemoryHashStore::new();
        assert!(store.insert(key(1)).unwrap());
        assert!(!store.insert(key(1)).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = MemoryHashStore::new();
        store.insert(key(1)).unwrap();
        assert!(store.remove(&key(1)).unwrap());
        assert!(!store.remove(&key(1)).unwrap());
        assert!(!store.exists(&key(1)));
        assert!(store.is_empty());
    }

    #[test]
    fn keys_are_sorted() {
        let store = MemoryHashStore::from_keys((0..16).map(key));
        let keys = store.keys();
        assert_eq!(keys.len(), 16);
        for w in keys.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn close_twice_errors() {
        let store = MemoryHashStore::new();
        assert!(store.is_open());
        store.close().unwrap();
        assert!(!store.is_open());
        assert!(matches!(store.close(), Err(VaultError::Closed(_))));
        assert!(matches!(store.insert(key(1)), Err(VaultError::Closed(_))));
    }

    #[test]
    fn debug_format() {
        let store = MemoryHashStore::from_keys([key(1)]);
        let debug = format!("{store:?}");
        assert!(debug.contains("MemoryHashStore"));
        assert!(debug.contains("key_count"));
    }
}
