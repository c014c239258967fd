use std::collections::HashSet;

use handles_attorney::Action;
use handles_crypto::action_key;
use handles_types::Hash;
use tracing::debug;

use crate::block::{HandlesBlock, SocialBlock};

/// Partition a protocol block's actions by kind.
///
/// Invalidated actions are skipped before parsing. Actions of other
/// protocols, unknown kinds, or malformed bodies are dropped without
/// affecting the rest of the block. A payload repeated within the block is
/// kept once, at its first position.
pub fn classify(block: &SocialBlock) -> HandlesBlock {
    let mut handles = HandlesBlock::new(block.epoch, block.seal_hash, !block.commit_hash.is_zero());
    let invalidated: HashSet<&Hash> = block.invalidated.iter().collect();

    for action in &block.actions {
        let hash = action_key(action);
        if invalidated.contains(&hash) || handles.contains(&hash) {
            continue;
        }
        match Action::parse(action) {
            Ok(action) => {
                if insert(&mut handles, hash, action) {
                    handles.order.push(hash);
                }
            }
            Err(err) => debug!(
                epoch = block.epoch,
                action = %hash.short_hex(),
                error = %err,
                "dropping action"
            ),
        }
    }
    handles
}

/// File `action` under its kind. Returns `false` if `hash` was already filed.
fn insert(block: &mut HandlesBlock, hash: Hash, action: Action) -> bool {
    match action {
        Action::Grant(grant) => block.grant.insert(hash, grant).is_none(),
        Action::Revoke(revoke) => block.revoke.insert(hash, revoke).is_none(),
        Action::Join(join) => block.join.insert(hash, join).is_none(),
        Action::UpdateInfo(update) => block.update.insert(hash, update).is_none(),
        Action::Void(void) => block.void.insert(hash, void).is_none(),
    }
}
