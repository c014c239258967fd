use std::path::Path;
use std::sync::Arc;

use handles_crypto::ContentHasher;
use handles_types::Hash;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{VaultError, VaultResult};
use crate::file::FileHashStore;
use crate::image;
use crate::memory::MemoryHashStore;
use crate::traits::HashStore;

/// Named membership set over a [`HashStore`] backend.
///
/// `HashVault` does not implement `Clone`: copies are always deep, through
/// [`deep_clone`](Self::deep_clone) or [`clone_async`](Self::clone_async),
/// and always memory-backed.
pub struct HashVault {
    name: String,
    store: Arc<dyn HashStore>,
}

impl HashVault {
    /// Wrap an explicit store handle.
    pub fn with_store(name: impl Into<String>, store: Arc<dyn HashStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    /// Empty memory-backed vault.
    pub fn memory(name: impl Into<String>) -> Self {
        Self::with_store(name, Arc::new(MemoryHashStore::new()))
    }

    /// Open (or create) a journaled vault under `root`.
    pub fn open(root: &Path, name: &str) -> VaultResult<Self> {
        let store = FileHashStore::open(root, name)?;
        Ok(Self::with_store(name, Arc::new(store)))
    }

    /// Load a serialized image into a memory-backed vault.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> VaultResult<Self> {
        let keys = image::decode(bytes)?;
        Ok(Self::with_store(name, Arc::new(MemoryHashStore::from_keys(keys))))
    }

    /// Load a serialized image into a fresh journal under `root`, replacing
    /// any journal already there.
    pub fn from_bytes_at(root: &Path, name: &str, bytes: &[u8]) -> VaultResult<Self> {
        let keys = image::decode(bytes)?;
        let store = FileHashStore::create_from_keys(root, name, &keys)?;
        Ok(Self::with_store(name, Arc::new(store)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Mark `key` present. Returns `true` if it was absent.
    pub fn insert(&self, key: Hash) -> VaultResult<bool> {
        self.store.insert(key)
    }

    /// Mark `key` absent. Returns `true` if it was present.
    pub fn remove(&self, key: &Hash) -> VaultResult<bool> {
        self.store.remove(key)
    }

    pub fn exists(&self, key: &Hash) -> bool {
        self.store.exists(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Canonical byte image (see [`image`]).
    pub fn to_bytes(&self) -> Vec<u8> {
        image::encode(&self.store.keys())
    }

    /// Digest of the canonical image. Equal populations always agree.
    pub fn content_hash(&self) -> Hash {
        ContentHasher::VAULT.hash(&self.to_bytes())
    }

    /// Independent memory-backed copy, taken on the calling thread.
    pub fn deep_clone(&self) -> HashVault {
        snapshot(&self.name, self.store.as_ref())
    }

    /// Independent memory-backed copy, taken on the blocking pool.
    ///
    /// The returned handle resolves once the copy is complete. The source
    /// keeps accepting mutations meanwhile; the copy reflects the population
    /// at the moment it read the index.
    pub fn clone_async(&self) -> JoinHandle<HashVault> {
        let name = self.name.clone();
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || snapshot(&name, store.as_ref()))
    }

    /// Await a [`clone_async`](Self::clone_async) handle, mapping a failed
    /// task into a vault error.
    pub async fn join_clone(name: &str, handle: JoinHandle<HashVault>) -> VaultResult<HashVault> {
        handle.await.map_err(|e| VaultError::Clone {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.store.is_open()
    }

    /// Rewrite durable history down to the current population.
    pub fn compact(&self) -> VaultResult<()> {
        self.store.compact()
    }

    /// Release backing resources.
    pub fn close(&self) -> VaultResult<()> {
        debug!(vault = %self.name, backend = self.backend(), "closing vault");
        self.store.close()
    }
}

fn snapshot(name: &str, store: &dyn HashStore) -> HashVault {
    HashVault::with_store(name, Arc::new(MemoryHashStore::from_keys(store.keys())))
}

impl std::fmt::Debug for HashVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashVault")
            .field("name", &self.name)
            .field("backend", &self.backend())
            .field("key_count", &self.len())
            .finish()
    }
}
