use handles_crypto::{caption_key, delegation_key, member_key};
use handles_types::{Hash, Token};

use crate::action::{GrantPowerOfAttorney, JoinNetwork, RevokePowerOfAttorney, UpdateInfo, Void};
use crate::mutations::Mutations;
use crate::state::State;

/// Validating overlay over a read-only [`State`].
///
/// Queries see the base state with the pending batch layered on top.
/// Accepted actions record their deltas in the batch, so later actions in
/// the same pass observe earlier ones.
#[derive(Debug)]
pub struct MutatingState<'a> {
    state: &'a State,
    mutations: Mutations,
}

impl<'a> MutatingState<'a> {
    pub(crate) fn new(state: &'a State, mutations: Mutations) -> Self {
        Self { state, mutations }
    }

    pub fn has_member(&self, token: &Token) -> bool {
        let key = member_key(token);
        self.state.members().exists(&key) || self.mutations.new_members.contains_key(&key)
    }

    pub fn has_handle(&self, caption: &str) -> bool {
        let key = caption_key(caption);
        self.state.captions().exists(&key) || self.mutations.new_captions.contains_key(&key)
    }

    /// Whether `attorney` may act for `token`, pending deltas included.
    pub fn power_of_attorney(&self, token: &Token, attorney: &Token) -> bool {
        if token == attorney {
            return true;
        }
        let key = delegation_key(token, attorney);
        if self.mutations.revoke_power.contains_key(&key) {
            return false;
        }
        if self.mutations.grant_power.contains_key(&key) {
            return true;
        }
        self.state.attorneys().exists(&key)
    }

    pub fn validate_join(&mut self, hash: Hash, join: &JoinNetwork) -> bool {
        if join.handle.is_empty() || self.has_member(&join.author) || self.has_handle(&join.handle) {
            return false;
        }
        self.mutations
            .new_members
            .insert(member_key(&join.author), hash);
        self.mutations
            .new_captions
            .insert(caption_key(&join.handle), hash);
        true
    }

    pub fn validate_grant(&mut self, hash: Hash, grant: &GrantPowerOfAttorney) -> bool {
        if grant.author == grant.attorney
            || !self.has_member(&grant.author)
            || !self.power_of_attorney(&grant.author, &grant.signer)
            || self.power_of_attorney(&grant.author, &grant.attorney)
        {
            return false;
        }
        let key = delegation_key(&grant.author, &grant.attorney);
        self.mutations.revoke_power.remove(&key);
        self.mutations.grant_power.insert(key, hash);
        true
    }

    pub fn validate_revoke(&mut self, hash: Hash, revoke: &RevokePowerOfAttorney) -> bool {
        if revoke.author == revoke.attorney
            || !self.has_member(&revoke.author)
            || !self.power_of_attorney(&revoke.author, &revoke.signer)
            || !self.power_of_attorney(&revoke.author, &revoke.attorney)
        {
            return false;
        }
        let key = delegation_key(&revoke.author, &revoke.attorney);
        self.mutations.grant_power.remove(&key);
        self.mutations.revoke_power.insert(key, hash);
        true
    }

    pub fn validate_update(&self, update: &UpdateInfo) -> bool {
        self.has_member(&update.author) && self.power_of_attorney(&update.author, &update.signer)
    }

    pub fn validate_void(&self, void: &Void) -> bool {
        self.has_member(&void.author) && self.power_of_attorney(&void.author, &void.signer)
    }

    pub fn mutations(&self) -> &Mutations {
        &self.mutations
    }

    /// Hand back the accumulated batch.
    pub fn finish(self) -> Mutations {
        self.mutations
    }
}
