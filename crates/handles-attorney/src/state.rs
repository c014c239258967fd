use std::path::Path;

use handles_crypto::{caption_key, delegation_key, member_key, ContentHasher};
use handles_types::{Hash, Token};
use handles_vault::{HashVault, VaultError, VaultResult};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AttorneyError;
use crate::mutations::Mutations;
use crate::overlay::MutatingState;

pub const MEMBERS: &str = "members";
pub const CAPTIONS: &str = "captions";
pub const ATTORNEYS: &str = "attorneys";

const LENGTH_PREFIX: usize = 8;

/// A set change made while applying a batch: the vault, the key, and
/// whether the key was inserted (else removed).
type Applied<'s> = (&'s HashVault, Hash, bool);

/// The durable ledger: members, claimed captions, and delegations.
///
/// Delegation is stored as `H(token || attorney)` in the attorneys set.
/// Self power of attorney is implicit and never stored.
#[derive(Debug)]
pub struct State {
    members: HashVault,
    captions: HashVault,
    attorneys: HashVault,
}

impl State {
    /// Empty memory-backed state.
    pub fn genesis_memory() -> Self {
        Self::from_vaults(
            HashVault::memory(MEMBERS),
            HashVault::memory(CAPTIONS),
            HashVault::memory(ATTORNEYS),
        )
    }

    /// Empty journaled state under `root`. Fails if any journal already
    /// holds keys.
    pub fn genesis(root: &Path) -> Result<Self, AttorneyError> {
        let state = Self::open(root)?;
        for vault in state.vaults() {
            if !vault.is_empty() {
                return Err(AttorneyError::GenesisNotEmpty {
                    name: vault.name().to_string(),
                    count: vault.len(),
                });
            }
        }
        info!(root = %root.display(), "created genesis state");
        Ok(state)
    }

    /// Open the journaled state under `root`, creating empty journals as
    /// needed.
    pub fn open(root: &Path) -> Result<Self, AttorneyError> {
        let members = HashVault::open(root, MEMBERS)?;
        let captions = HashVault::open(root, CAPTIONS)?;
        let attorneys = HashVault::open(root, ATTORNEYS)?;
        let state = Self::from_vaults(members, captions, attorneys);
        debug!(
            root = %root.display(),
            members = state.members.len(),
            captions = state.captions.len(),
            attorneys = state.attorneys.len(),
            "opened state"
        );
        Ok(state)
    }

    pub fn from_vaults(members: HashVault, captions: HashVault, attorneys: HashVault) -> Self {
        Self {
            members,
            captions,
            attorneys,
        }
    }

    /// Overlay for validating actions against this state.
    ///
    /// The first batch, if any, becomes the working batch and the rest are
    /// merged into it in order.
    pub fn validator(&self, batches: Vec<Mutations>) -> MutatingState<'_> {
        let mut batches = batches.into_iter();
        let mut working = batches.next().unwrap_or_default();
        working.merge(batches);
        MutatingState::new(self, working)
    }

    /// Apply a batch: grants, then revokes, then members, then captions.
    ///
    /// A key both granted and revoked in the same batch ends up absent.
    /// The batch lands whole or not at all: closed sets are refused up
    /// front, and a storage error partway through undoes the changes
    /// already made.
    pub fn incorporate(&mut self, batch: &Mutations) -> Result<(), AttorneyError> {
        if batch.is_empty() {
            return Ok(());
        }
        if let Some(vault) = self.vaults().into_iter().find(|vault| !vault.is_open()) {
            return Err(VaultError::Closed(vault.name().to_string()).into());
        }

        let mut applied = Vec::new();
        if let Err(err) = self.apply_batch(batch, &mut applied) {
            warn!(error = %err, undo = applied.len(), "batch failed; rolling back");
            roll_back(applied);
            return Err(err.into());
        }
        debug!(
            grants = batch.grant_power.len(),
            revokes = batch.revoke_power.len(),
            members = batch.new_members.len(),
            captions = batch.new_captions.len(),
            "incorporated batch"
        );
        Ok(())
    }

    fn apply_batch<'s>(
        &'s self,
        batch: &Mutations,
        applied: &mut Vec<Applied<'s>>,
    ) -> VaultResult<()> {
        for key in batch.grant_power.keys() {
            if self.attorneys.insert(*key)? {
                applied.push((&self.attorneys, *key, true));
            }
        }
        for key in batch.revoke_power.keys() {
            if self.attorneys.remove(key)? {
                applied.push((&self.attorneys, *key, false));
            }
        }
        for key in batch.new_members.keys() {
            if self.members.insert(*key)? {
                applied.push((&self.members, *key, true));
            }
        }
        for key in batch.new_captions.keys() {
            if self.captions.insert(*key)? {
                applied.push((&self.captions, *key, true));
            }
        }
        Ok(())
    }

    /// Compact the durable journals. Memory-backed sets only check that
    /// they are open.
    pub fn compact(&self) -> Result<(), AttorneyError> {
        for vault in self.vaults() {
            vault.compact()?;
        }
        Ok(())
    }

    /// Digest over the content hashes of members, captions and attorneys.
    pub fn checksum(&self) -> Hash {
        let members = self.members.content_hash();
        let captions = self.captions.content_hash();
        let attorneys = self.attorneys.content_hash();
        ContentHasher::CHECKSUM.hash_parts(&[
            members.as_bytes(),
            captions.as_bytes(),
            attorneys.as_bytes(),
        ])
    }

    /// Root hash of a checkpoint of this state for the given protocol pair.
    pub fn genesis_hash(&self, node_protocol: u32, parent_protocol: u32) -> Hash {
        let checksum = self.checksum();
        ContentHasher::GENESIS.hash_parts(&[
            &node_protocol.to_be_bytes(),
            &parent_protocol.to_be_bytes(),
            checksum.as_bytes(),
        ])
    }

    pub fn power_of_attorney(&self, token: &Token, attorney: &Token) -> bool {
        token == attorney || self.attorneys.exists(&delegation_key(token, attorney))
    }

    pub fn has_member(&self, token: &Token) -> bool {
        self.members.exists(&member_key(token))
    }

    pub fn has_handle(&self, caption: &str) -> bool {
        self.captions.exists(&caption_key(caption))
    }

    pub fn members(&self) -> &HashVault {
        &self.members
    }

    pub fn captions(&self) -> &HashVault {
        &self.captions
    }

    pub fn attorneys(&self) -> &HashVault {
        &self.attorneys
    }

    fn vaults(&self) -> [&HashVault; 3] {
        [&self.members, &self.captions, &self.attorneys]
    }

    /// Independent memory-backed copy, taken on the calling thread.
    pub fn deep_clone(&self) -> State {
        Self::from_vaults(
            self.members.deep_clone(),
            self.captions.deep_clone(),
            self.attorneys.deep_clone(),
        )
    }

    /// Copy all three sets on the blocking pool.
    ///
    /// The receiver resolves once every set copy has finished. Must be called
    /// from within a Tokio runtime.
    pub fn clone_async(&self) -> oneshot::Receiver<Result<State, AttorneyError>> {
        let (tx, rx) = oneshot::channel();
        let members = self.members.clone_async();
        let captions = self.captions.clone_async();
        let attorneys = self.attorneys.clone_async();
        tokio::spawn(async move {
            let result = join_clones(members, captions, attorneys).await;
            // the caller may have stopped waiting
            let _ = tx.send(result);
        });
        rx
    }

    /// Three length-prefixed set images: members, captions, attorneys.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for vault in self.vaults() {
            let image = vault.to_bytes();
            bytes.extend_from_slice(&(image.len() as u64).to_be_bytes());
            bytes.extend_from_slice(&image);
        }
        bytes
    }

    /// Inverse of [`to_bytes`](Self::to_bytes). With `root`, each set is
    /// written to a fresh journal there; without, the state is memory-backed.
    pub fn from_bytes(bytes: &[u8], root: Option<&Path>) -> Result<Self, AttorneyError> {
        let (members, rest) = split_segment(bytes, MEMBERS)?;
        let (captions, rest) = split_segment(rest, CAPTIONS)?;
        let (attorneys, rest) = split_segment(rest, ATTORNEYS)?;
        if !rest.is_empty() {
            return Err(AttorneyError::MalformedState(format!(
                "{} trailing bytes",
                rest.len()
            )));
        }

        let load = |name: &str, image: &[u8]| match root {
            Some(root) => HashVault::from_bytes_at(root, name, image),
            None => HashVault::from_bytes(name, image),
        };
        Ok(Self::from_vaults(
            load(MEMBERS, members)?,
            load(CAPTIONS, captions)?,
            load(ATTORNEYS, attorneys)?,
        ))
    }

    /// Close all three sets. Every set is closed even if an earlier one fails.
    pub fn close(&self) -> Result<(), AttorneyError> {
        let members = self.members.close();
        let captions = self.captions.close();
        let attorneys = self.attorneys.close();
        members?;
        captions?;
        attorneys?;
        Ok(())
    }
}

async fn join_clones(
    members: JoinHandle<HashVault>,
    captions: JoinHandle<HashVault>,
    attorneys: JoinHandle<HashVault>,
) -> Result<State, AttorneyError> {
    let (members, captions, attorneys) = tokio::join!(
        HashVault::join_clone(MEMBERS, members),
        HashVault::join_clone(CAPTIONS, captions),
        HashVault::join_clone(ATTORNEYS, attorneys),
    );
    Ok(State::from_vaults(members?, captions?, attorneys?))
}

fn roll_back(applied: Vec<Applied<'_>>) {
    for (vault, key, inserted) in applied.into_iter().rev() {
        let undone = if inserted {
            vault.remove(&key)
        } else {
            vault.insert(key)
        };
        if let Err(err) = undone {
            warn!(vault = vault.name(), key = %key.short_hex(), error = %err, "cannot undo change");
        }
    }
}

fn split_segment<'b>(bytes: &'b [u8], name: &str) -> Result<(&'b [u8], &'b [u8]), AttorneyError> {
    let Some((prefix, rest)) = bytes.split_first_chunk::<LENGTH_PREFIX>() else {
        return Err(AttorneyError::MalformedState(format!(
            "{name}: missing length prefix"
        )));
    };
    let declared = u64::from_be_bytes(*prefix);
    let len = usize::try_from(declared)
        .ok()
        .filter(|len| *len <= rest.len())
        .ok_or_else(|| {
            AttorneyError::MalformedState(format!(
                "{name}: segment of {declared} bytes exceeds remaining {}",
                rest.len()
            ))
        })?;
    Ok(rest.split_at(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use handles_vault::{HashStore, MemoryHashStore};

    /// Memory store whose inserts of one key fail.
    struct FailingStore {
        inner: MemoryHashStore,
        poison: Hash,
    }

    impl HashStore for FailingStore {
        fn insert(&self, key: Hash) -> VaultResult<bool> {
            if key == self.poison {
                return Err(VaultError::Io(std::io::Error::other("disk full")));
            }
            self.inner.insert(key)
        }

        fn remove(&self, key: &Hash) -> VaultResult<bool> {
            self.inner.remove(key)
        }

        fn exists(&self, key: &Hash) -> bool {
            self.inner.exists(key)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }

        fn keys(&self) -> Vec<Hash> {
            self.inner.keys()
        }

        fn is_open(&self) -> bool {
            self.inner.is_open()
        }

        fn compact(&self) -> VaultResult<()> {
            self.inner.compact()
        }

        fn close(&self) -> VaultResult<()> {
            self.inner.close()
        }

        fn backend(&self) -> &'static str {
            "failing"
        }
    }

    fn token(seed: u8) -> Token {
        Token::from_raw([seed; 32])
    }

    fn h(seed: u8) -> Hash {
        Hash::from_bytes(&[seed])
    }

    fn populated() -> State {
        let mut state = State::genesis_memory();
        let mut batch = Mutations::new();
        batch.new_members.insert(member_key(&token(1)), h(1));
        batch.new_members.insert(member_key(&token(2)), h(2));
        batch.new_captions.insert(caption_key("alice"), h(1));
        batch.new_captions.insert(caption_key("bob"), h(2));
        batch.grant_power.insert(delegation_key(&token(1), &token(2)), h(3));
        state.incorporate(&batch).unwrap();
        state
    }

    #[test]
    fn self_power_of_attorney_needs_no_entry() {
        let state = State::genesis_memory();
        assert!(state.power_of_attorney(&token(7), &token(7)));
        assert!(!state.power_of_attorney(&token(7), &token(8)));
        assert!(state.attorneys().is_empty());
    }

    #[test]
    fn delegation_is_directed() {
        let state = populated();
        assert!(state.power_of_attorney(&token(1), &token(2)));
        assert!(!state.power_of_attorney(&token(2), &token(1)));
    }

    #[test]
    fn incorporate_inserts_members_and_captions() {
        let state = populated();
        assert!(state.has_member(&token(1)));
        assert!(state.has_handle("bob"));
        assert!(!state.has_handle("carol"));
        assert_eq!(state.captions().len(), 2);
    }

    #[test]
    fn grant_and_revoke_of_same_key_nets_to_absent() {
        let mut state = State::genesis_memory();
        let key = delegation_key(&token(1), &token(2));
        let mut batch = Mutations::new();
        batch.grant_power.insert(key, h(1));
        batch.revoke_power.insert(key, h(2));
        state.incorporate(&batch).unwrap();
        assert!(!state.power_of_attorney(&token(1), &token(2)));
    }

    #[test]
    fn empty_batch_leaves_checksum_alone() {
        let mut state = populated();
        let before = state.checksum();
        state.incorporate(&Mutations::new()).unwrap();
        assert_eq!(state.checksum(), before);
    }

    #[test]
    fn checksum_tracks_content() {
        let a = populated();
        let b = populated();
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), State::genesis_memory().checksum());
        assert_ne!(a.genesis_hash(1, 0), a.genesis_hash(2, 0));
        assert_ne!(a.genesis_hash(1, 0), a.genesis_hash(1, 1));
    }

    #[test]
    fn memory_roundtrip_preserves_checksum() {
        let state = populated();
        let bytes = state.to_bytes();
        let restored = State::from_bytes(&bytes, None).unwrap();
        assert_eq!(restored.checksum(), state.checksum());
        assert_eq!(restored.to_bytes(), bytes);
        assert_eq!(restored.members().backend(), "memory");
    }

    #[test]
    fn file_roundtrip_persists() {
        let dir = tempfile::tempdir().unwrap();
        let state = populated();
        let restored = State::from_bytes(&state.to_bytes(), Some(dir.path())).unwrap();
        assert_eq!(restored.checksum(), state.checksum());
        restored.close().unwrap();

        let reopened = State::open(dir.path()).unwrap();
        assert_eq!(reopened.checksum(), state.checksum());
        assert!(reopened.power_of_attorney(&token(1), &token(2)));
    }

    #[test]
    fn rejects_truncated_and_trailing_bytes() {
        let bytes = populated().to_bytes();
        assert!(matches!(
            State::from_bytes(&bytes[..bytes.len() - 1], None),
            Err(AttorneyError::MalformedState(_))
        ));
        assert!(matches!(
            State::from_bytes(&bytes[..4], None),
            Err(AttorneyError::MalformedState(_))
        ));

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(
            State::from_bytes(&padded, None),
            Err(AttorneyError::MalformedState(_))
        ));
    }

    #[test]
    fn genesis_on_disk_requires_empty_journals() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = State::genesis(dir.path()).unwrap();
        assert_eq!(state.checksum(), State::genesis_memory().checksum());

        let mut batch = Mutations::new();
        batch.new_members.insert(member_key(&token(1)), h(1));
        state.incorporate(&batch).unwrap();
        state.close().unwrap();

        assert!(matches!(
            State::genesis(dir.path()),
            Err(AttorneyError::GenesisNotEmpty { count: 1, .. })
        ));
    }

    #[test]
    fn second_close_errors() {
        let state = State::genesis_memory();
        state.close().unwrap();
        assert!(state.close().is_err());
    }

    #[tokio::test]
    async fn clone_async_is_isolated_from_later_mutation() {
        let mut state = populated();
        let before = state.checksum();

        let copy = state.clone_async().await.unwrap().unwrap();

        let mut batch = Mutations::new();
        batch.new_members.insert(member_key(&token(9)), h(9));
        state.incorporate(&batch).unwrap();

        assert_eq!(copy.checksum(), before);
        assert!(!copy.has_member(&token(9)));
        assert!(state.has_member(&token(9)));
    }

    #[test]
    fn deep_clone_of_file_state_is_memory_backed() {
        let dir = tempfile::tempdir().unwrap();
        let state = State::from_bytes(&populated().to_bytes(), Some(dir.path())).unwrap();
        let copy = state.deep_clone();
        assert_eq!(copy.attorneys().backend(), "memory");
        assert_eq!(copy.checksum(), state.checksum());
    }

    #[test]
    fn closed_set_refuses_whole_batch() {
        let mut state = State::genesis_memory();
        state.captions().close().unwrap();

        let mut batch = Mutations::new();
        batch.new_members.insert(member_key(&token(1)), h(1));
        batch.new_captions.insert(caption_key("alice"), h(1));
        assert!(matches!(
            state.incorporate(&batch),
            Err(AttorneyError::Vault(VaultError::Closed(_)))
        ));
        assert!(!state.has_member(&token(1)));
    }

    #[test]
    fn storage_error_rolls_back_batch() {
        let poison = caption_key("alice");
        let captions = HashVault::with_store(
            CAPTIONS,
            Arc::new(FailingStore {
                inner: MemoryHashStore::new(),
                poison,
            }),
        );
        let mut state = State::from_vaults(
            HashVault::memory(MEMBERS),
            captions,
            HashVault::memory(ATTORNEYS),
        );
        let before = state.checksum();

        let mut batch = Mutations::new();
        batch.grant_power.insert(delegation_key(&token(1), &token(2)), h(1));
        batch.new_members.insert(member_key(&token(1)), h(1));
        batch.new_captions.insert(caption_key("aaron"), h(1));
        batch.new_captions.insert(poison, h(1));

        assert!(matches!(
            state.incorporate(&batch),
            Err(AttorneyError::Vault(VaultError::Io(_)))
        ));
        assert_eq!(state.checksum(), before);
        assert!(state.members().is_empty());
        assert!(state.captions().is_empty());
        assert!(!state.power_of_attorney(&token(1), &token(2)));
    }

    #[test]
    fn compact_keeps_population() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = State::open(dir.path()).unwrap();
        let key = delegation_key(&token(1), &token(2));
        let mut batch = Mutations::new();
        batch.grant_power.insert(key, h(1));
        state.incorporate(&batch).unwrap();
        let mut batch = Mutations::new();
        batch.revoke_power.insert(key, h(2));
        batch.new_members.insert(member_key(&token(1)), h(2));
        state.incorporate(&batch).unwrap();

        let before = state.checksum();
        state.compact().unwrap();
        assert_eq!(state.checksum(), before);
        state.close().unwrap();

        let reopened = State::open(dir.path()).unwrap();
        assert_eq!(reopened.checksum(), before);
        assert!(reopened.attorneys().is_empty());
    }
}
