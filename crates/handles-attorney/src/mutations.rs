use std::collections::BTreeMap;

use handles_types::Hash;

/// Pending deltas against the ledger state.
///
/// Each namespace maps a set key to the hash of the action that produced it.
/// A batch is declarative: nothing reaches the ledger until
/// [`State::incorporate`](crate::State::incorporate) applies it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mutations {
    pub grant_power: BTreeMap<Hash, Hash>,
    pub revoke_power: BTreeMap<Hash, Hash>,
    pub new_members: BTreeMap<Hash, Hash>,
    pub new_captions: BTreeMap<Hash, Hash>,
}

impl Mutations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `others` into `self` in order. Within a namespace the later
    /// batch wins for a shared key.
    pub fn merge(&mut self, others: impl IntoIterator<Item = Mutations>) {
        for other in others {
            self.grant_power.extend(other.grant_power);
            self.revoke_power.extend(other.revoke_power);
            self.new_members.extend(other.new_members);
            self.new_captions.extend(other.new_captions);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total entries across all namespaces.
    pub fn len(&self) -> usize {
        self.grant_power.len()
            + self.revoke_power.len()
            + self.new_members.len()
            + self.new_captions.len()
    }
}
