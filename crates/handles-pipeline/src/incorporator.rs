use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use handles_attorney::State;
use handles_types::{Epoch, Hash};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::block::HandlesBlock;
use crate::error::{PipelineError, PipelineResult};

/// Epochs between checkpoints when none is configured.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 900;

#[derive(Clone, Debug)]
pub struct IncorporatorConfig {
    /// Take a checkpoint every this many epochs. Zero disables checkpoints.
    pub checkpoint_interval: u64,
    /// Where checkpoint files are written. Without one, the state is still
    /// cloned on schedule but nothing is persisted.
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for IncorporatorConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            checkpoint_dir: None,
        }
    }
}

/// Outcome of applying one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockReport {
    pub epoch: Epoch,
    pub accepted: usize,
    pub rejected: usize,
    pub checksum: Hash,
}

type CheckpointTask = JoinHandle<PipelineResult<PathBuf>>;

/// Sole writer of the ledger state.
///
/// Each emitted block is validated in block order against an overlay of the
/// current state, and the accepted deltas are incorporated in one batch.
pub struct Incorporator {
    state: State,
    config: IncorporatorConfig,
    /// The checkpoint write still in flight, if any.
    writing: Option<(Epoch, CheckpointTask)>,
}

impl Incorporator {
    pub fn new(state: State, config: IncorporatorConfig) -> Self {
        Self {
            state,
            config,
            writing: None,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Validate and incorporate one block.
    pub fn apply_block(&mut self, block: &HandlesBlock) -> PipelineResult<BlockReport> {
        let mut overlay = self.state.validator(Vec::new());
        let mut accepted = 0;
        let mut rejected = 0;

        for hash in &block.order {
            let ok = if let Some(grant) = block.grant.get(hash) {
                overlay.validate_grant(*hash, grant)
            } else if let Some(revoke) = block.revoke.get(hash) {
                overlay.validate_revoke(*hash, revoke)
            } else if let Some(join) = block.join.get(hash) {
                overlay.validate_join(*hash, join)
            } else if let Some(update) = block.update.get(hash) {
                overlay.validate_update(update)
            } else if let Some(void) = block.void.get(hash) {
                overlay.validate_void(void)
            } else {
                continue;
            };
            if ok {
                accepted += 1;
            } else {
                rejected += 1;
                debug!(epoch = block.epoch, action = %hash.short_hex(), "action rejected");
            }
        }

        let batch = overlay.finish();
        self.state.incorporate(&batch)?;

        let report = BlockReport {
            epoch: block.epoch,
            accepted,
            rejected,
            checksum: self.state.checksum(),
        };
        debug!(
            epoch = report.epoch,
            accepted,
            rejected,
            checksum = %report.checksum.short_hex(),
            "block incorporated"
        );
        Ok(report)
    }

    /// Whether a checkpoint is due after incorporating `epoch`.
    pub fn checkpoint_due(&self, epoch: Epoch) -> bool {
        let interval = self.config.checkpoint_interval;
        interval > 0 && epoch % interval == 0
    }

    /// Clone the state on the blocking pool and write it out in the
    /// background. The clone completes before this returns, so the
    /// checkpoint reflects exactly the blocks applied so far.
    ///
    /// At most one write is in flight: the previous one is awaited first and
    /// its failure is returned here. Durable journals are compacted once the
    /// clone is taken.
    pub async fn checkpoint(&mut self, epoch: Epoch) -> PipelineResult<()> {
        if let Some((previous, task)) = self.writing.take() {
            settle(previous, task).await?;
        }
        info!(epoch, "starting checkpoint");
        let state = self
            .state
            .clone_async()
            .await
            .map_err(|_| PipelineError::CloneAborted(epoch))??;
        self.state.compact()?;
        let Some(dir) = self.config.checkpoint_dir.clone() else {
            return Ok(());
        };
        let task = tokio::task::spawn_blocking(move || write_checkpoint(&dir, epoch, &state));
        self.writing = Some((epoch, task));
        Ok(())
    }

    /// Consume blocks until the stream closes, then wait for an outstanding
    /// checkpoint and hand back the state.
    pub async fn run(mut self, mut blocks: mpsc::Receiver<HandlesBlock>) -> PipelineResult<State> {
        while let Some(block) = blocks.recv().await {
            self.apply_block(&block)?;
            if self.checkpoint_due(block.epoch) {
                self.checkpoint(block.epoch).await?;
            }
        }
        self.finish().await
    }

    /// Wait for an outstanding checkpoint and hand back the state.
    pub async fn finish(mut self) -> PipelineResult<State> {
        if let Some((epoch, task)) = self.writing.take() {
            settle(epoch, task).await?;
        }
        Ok(self.state)
    }
}

async fn settle(epoch: Epoch, task: CheckpointTask) -> PipelineResult<PathBuf> {
    let path = task.await.map_err(|e| PipelineError::Checkpoint {
        path: PathBuf::from(format!("checkpoint-{epoch}.state")),
        reason: e.to_string(),
    })??;
    info!(epoch, path = %path.display(), "checkpoint written");
    Ok(path)
}

/// File name of the checkpoint taken at `epoch`.
pub fn checkpoint_path(dir: &Path, epoch: Epoch) -> PathBuf {
    dir.join(format!("checkpoint-{epoch}.state"))
}

fn write_checkpoint(dir: &Path, epoch: Epoch, state: &State) -> PipelineResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = checkpoint_path(dir, epoch);
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&state.to_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(&path).map_err(|e| PipelineError::Checkpoint {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SocialBlock;
    use crate::classifier::classify;
    use handles_attorney::{
        GrantPowerOfAttorney, JoinNetwork, RevokePowerOfAttorney, Signature, TypedAction, Void,
    };
    use handles_crypto::action_key;
    use handles_types::Token;

    fn token(seed: u8) -> Token {
        Token::from_raw([seed; 32])
    }

    fn with_join(block: &mut HandlesBlock, seed: u8, handle: &str) -> Hash {
        let join = JoinNetwork {
            epoch: block.epoch,
            author: token(seed),
            handle: handle.into(),
            details: String::new(),
            signature: Signature::default(),
        };
        let hash = action_key(&join.encode().unwrap());
        block.join.insert(hash, join);
        block.order.push(hash);
        hash
    }

    fn with_grant(block: &mut HandlesBlock, author: u8, attorney: u8) -> Hash {
        let grant = GrantPowerOfAttorney {
            epoch: block.epoch,
            author: token(author),
            attorney: token(attorney),
            signer: token(author),
            fingerprint: Vec::new(),
            signature: Signature::default(),
        };
        let hash = action_key(&grant.encode().unwrap());
        block.grant.insert(hash, grant);
        block.order.push(hash);
        hash
    }

    fn disabled() -> IncorporatorConfig {
        IncorporatorConfig {
            checkpoint_interval: 0,
            checkpoint_dir: None,
        }
    }

    #[test]
    fn validates_in_block_order() {
        let mut incorporator = Incorporator::new(State::genesis_memory(), disabled());

        let mut block = HandlesBlock::new(1, Hash::zero(), true);
        // grant precedes the join, so the author is not yet a member
        with_grant(&mut block, 1, 2);
        with_join(&mut block, 1, "alice");
        with_grant(&mut block, 1, 3);
        with_join(&mut block, 2, "alice");

        let report = incorporator.apply_block(&block).unwrap();
        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.checksum, incorporator.state().checksum());

        let state = incorporator.state();
        assert!(state.has_member(&token(1)));
        assert!(!state.has_member(&token(2)));
        assert!(state.power_of_attorney(&token(1), &token(3)));
        assert!(!state.power_of_attorney(&token(1), &token(2)));
    }

    #[test]
    fn unknown_order_entries_are_ignored() {
        let mut incorporator = Incorporator::new(State::genesis_memory(), disabled());
        let mut block = HandlesBlock::new(1, Hash::zero(), true);
        block.order.push(Hash::from_bytes(b"pruned"));
        let report = incorporator.apply_block(&block).unwrap();
        assert_eq!((report.accepted, report.rejected), (0, 0));
    }

    #[tokio::test]
    async fn run_writes_checkpoints_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = IncorporatorConfig {
            checkpoint_interval: 2,
            checkpoint_dir: Some(dir.path().to_path_buf()),
        };
        let incorporator = Incorporator::new(State::genesis_memory(), config);

        let (tx, rx) = mpsc::channel(8);
        for epoch in 1..=4u64 {
            let mut block = HandlesBlock::new(epoch, Hash::zero(), true);
            with_join(&mut block, epoch as u8, &format!("user{epoch}"));
            tx.send(block).await.unwrap();
        }
        drop(tx);

        let state = incorporator.run(rx).await.unwrap();
        assert_eq!(state.members().len(), 4);

        assert!(!checkpoint_path(dir.path(), 1).exists());
        assert!(!checkpoint_path(dir.path(), 3).exists());

        let second = fs::read(checkpoint_path(dir.path(), 2)).unwrap();
        let restored = State::from_bytes(&second, None).unwrap();
        assert_eq!(restored.members().len(), 2);

        let fourth = fs::read(checkpoint_path(dir.path(), 4)).unwrap();
        let restored = State::from_bytes(&fourth, None).unwrap();
        assert_eq!(restored.checksum(), state.checksum());
    }

    #[tokio::test]
    async fn disabled_interval_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = IncorporatorConfig {
            checkpoint_interval: 0,
            checkpoint_dir: Some(dir.path().to_path_buf()),
        };
        let incorporator = Incorporator::new(State::genesis_memory(), config);
        let (tx, rx) = mpsc::channel(4);
        for epoch in 1..=3 {
            tx.send(HandlesBlock::new(epoch, Hash::zero(), true))
                .await
                .unwrap();
        }
        drop(tx);
        incorporator.run(rx).await.unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn repeated_payload_counts_once() {
        let join = JoinNetwork {
            epoch: 1,
            author: token(1),
            handle: "alice".into(),
            details: String::new(),
            signature: Signature::default(),
        }
        .encode()
        .unwrap();
        let void = Void {
            epoch: 1,
            author: token(1),
            signer: token(1),
            reason: String::new(),
            signature: Signature::default(),
        }
        .encode()
        .unwrap();
        let block = classify(&SocialBlock {
            epoch: 1,
            actions: vec![join, void.clone(), void],
            commit_hash: Hash::from_bytes(b"commit"),
            ..SocialBlock::default()
        });

        let mut incorporator = Incorporator::new(State::genesis_memory(), disabled());
        let report = incorporator.apply_block(&block).unwrap();
        assert_eq!((report.accepted, report.rejected), (2, 0));
    }

    #[tokio::test]
    async fn failed_write_surfaces_at_next_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        let config = IncorporatorConfig {
            checkpoint_interval: 2,
            checkpoint_dir: Some(blocker),
        };
        let mut incorporator = Incorporator::new(State::genesis_memory(), config);

        incorporator.checkpoint(2).await.unwrap();
        assert!(matches!(
            incorporator.checkpoint(4).await,
            Err(PipelineError::Io(_))
        ));
        // reported once, and nothing else is in flight
        assert!(incorporator.finish().await.is_ok());
    }

    #[tokio::test]
    async fn checkpoint_compacts_durable_journals() {
        let dir = tempfile::tempdir().unwrap();
        let mut incorporator = Incorporator::new(State::open(dir.path()).unwrap(), disabled());

        let mut block = HandlesBlock::new(1, Hash::zero(), true);
        with_join(&mut block, 1, "alice");
        with_grant(&mut block, 1, 2);
        incorporator.apply_block(&block).unwrap();

        let mut block = HandlesBlock::new(2, Hash::zero(), true);
        let revoke = RevokePowerOfAttorney {
            epoch: 2,
            author: token(1),
            attorney: token(2),
            signer: token(1),
            signature: Signature::default(),
        };
        let hash = action_key(&revoke.encode().unwrap());
        block.revoke.insert(hash, revoke);
        block.order.push(hash);
        incorporator.apply_block(&block).unwrap();

        let journal = dir.path().join("attorneys.vault");
        assert!(fs::metadata(&journal).unwrap().len() > 0);
        incorporator.checkpoint(2).await.unwrap();
        assert_eq!(fs::metadata(&journal).unwrap().len(), 0);

        let state = incorporator.finish().await.unwrap();
        assert!(state.has_member(&token(1)));
        assert!(!state.power_of_attorney(&token(1), &token(2)));
    }
}
