use std::collections::HashMap;

use handles_attorney::{GrantPowerOfAttorney, JoinNetwork, RevokePowerOfAttorney, UpdateInfo, Void};
use handles_types::{Epoch, Hash};

/// A protocol block as delivered by the ordering engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SocialBlock {
    pub epoch: Epoch,
    pub seal_hash: Hash,
    /// Raw action payloads in block order.
    pub actions: Vec<Vec<u8>>,
    /// Action hashes already known to be invalid.
    pub invalidated: Vec<Hash>,
    /// Zero while the block is uncommitted.
    pub commit_hash: Hash,
}

/// Commit notification for a previously delivered block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockCommit {
    pub seal_hash: Hash,
    /// Action hashes invalidated by the commit.
    pub invalidated: Vec<Hash>,
}

/// One protocol block with its handles actions partitioned by kind.
#[derive(Clone, Debug, Default)]
pub struct HandlesBlock {
    pub epoch: Epoch,
    pub seal: Hash,
    pub grant: HashMap<Hash, GrantPowerOfAttorney>,
    pub revoke: HashMap<Hash, RevokePowerOfAttorney>,
    pub join: HashMap<Hash, JoinNetwork>,
    pub update: HashMap<Hash, UpdateInfo>,
    pub void: HashMap<Hash, Void>,
    pub committed: bool,
    /// Hashes of the retained actions, in block order.
    pub order: Vec<Hash>,
}

impl HandlesBlock {
    pub fn new(epoch: Epoch, seal: Hash, committed: bool) -> Self {
        Self {
            epoch,
            seal,
            committed,
            ..Self::default()
        }
    }

    /// Drop every action whose hash is in `invalidated`. Returns how many
    /// were removed.
    pub fn prune(&mut self, invalidated: &[Hash]) -> usize {
        let mut removed = 0;
        for hash in invalidated {
            let hit = self.grant.remove(hash).is_some()
                | self.revoke.remove(hash).is_some()
                | self.join.remove(hash).is_some()
                | self.update.remove(hash).is_some()
                | self.void.remove(hash).is_some();
            if hit {
                removed += 1;
            }
        }
        if removed > 0 {
            self.order.retain(|hash| !invalidated.contains(hash));
        }
        removed
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.grant.contains_key(hash)
            || self.revoke.contains_key(hash)
            || self.join.contains_key(hash)
            || self.update.contains_key(hash)
            || self.void.contains_key(hash)
    }

    /// Number of retained actions.
    pub fn len(&self) -> usize {
        self.grant.len() + self.revoke.len() + self.join.len() + self.update.len() + self.void.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
