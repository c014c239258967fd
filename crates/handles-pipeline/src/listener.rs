use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::block::{BlockCommit, HandlesBlock, SocialBlock};
use crate::classifier::classify;

/// Emitted blocks are handed over one at a time.
pub const OUTPUT_CAPACITY: usize = 1;

enum Event {
    Shutdown,
    Block(Option<SocialBlock>),
    Commit(Option<BlockCommit>),
}

/// Start the reconciliation worker.
///
/// Committed blocks are emitted as they arrive. Uncommitted blocks wait in a
/// pending buffer until a commit with a matching seal arrives; the commit's
/// invalidated actions are pruned and the block is emitted. Each block is
/// emitted at most once.
///
/// The worker stops and closes the returned stream when `shutdown` turns
/// `true` (or its sender is dropped), when either input stream closes, or
/// when the consumer goes away. Pending blocks are dropped.
pub fn spawn_listener(
    blocks: mpsc::Receiver<SocialBlock>,
    commits: mpsc::Receiver<BlockCommit>,
    shutdown: watch::Receiver<bool>,
) -> mpsc::Receiver<HandlesBlock> {
    let (tx, rx) = mpsc::channel(OUTPUT_CAPACITY);
    tokio::spawn(listen(blocks, commits, shutdown, tx));
    rx
}

async fn listen(
    mut blocks: mpsc::Receiver<SocialBlock>,
    mut commits: mpsc::Receiver<BlockCommit>,
    mut shutdown: watch::Receiver<bool>,
    tx: mpsc::Sender<HandlesBlock>,
) {
    info!("handles listener started");
    let mut pending: Vec<HandlesBlock> = Vec::new();

    loop {
        let event = tokio::select! {
            biased;
            _ = cancelled(&mut shutdown) => Event::Shutdown,
            block = blocks.recv() => Event::Block(block),
            commit = commits.recv() => Event::Commit(commit),
        };

        match event {
            Event::Shutdown => {
                debug!("listener cancelled");
                break;
            }
            Event::Block(None) => {
                debug!("block stream closed");
                break;
            }
            Event::Commit(None) => {
                debug!("commit stream closed");
                break;
            }
            Event::Block(Some(block)) => {
                let handles = classify(&block);
                if handles.committed {
                    if !emit(&tx, handles, &mut shutdown).await {
                        break;
                    }
                } else {
                    debug!(
                        epoch = handles.epoch,
                        seal = %handles.seal.short_hex(),
                        actions = handles.len(),
                        "block pending commit"
                    );
                    pending.push(handles);
                }
            }
            Event::Commit(Some(commit)) => {
                let (matched, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut pending)
                    .into_iter()
                    .partition(|block| block.seal == commit.seal_hash);
                pending = rest;

                if matched.is_empty() {
                    debug!(seal = %commit.seal_hash.short_hex(), "commit matches no pending block");
                    continue;
                }
                let mut open = true;
                for mut block in matched {
                    let pruned = block.prune(&commit.invalidated);
                    block.committed = true;
                    debug!(
                        epoch = block.epoch,
                        seal = %block.seal.short_hex(),
                        pruned,
                        "pending block committed"
                    );
                    if !emit(&tx, block, &mut shutdown).await {
                        open = false;
                        break;
                    }
                }
                if !open {
                    break;
                }
            }
        }
    }

    if !pending.is_empty() {
        debug!(count = pending.len(), "dropping uncommitted blocks");
    }
    info!("handles listener stopped");
}

/// Resolves once shutdown is requested or can no longer be signalled.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Send downstream unless cancelled first. Returns `false` when the worker
/// should stop.
async fn emit(
    tx: &mpsc::Sender<HandlesBlock>,
    block: HandlesBlock,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        biased;
        _ = cancelled(shutdown) => {
            debug!("emission abandoned on shutdown");
            false
        }
        sent = tx.send(block) => {
            if sent.is_err() {
                debug!("block consumer went away");
            }
            sent.is_ok()
        }
    }
}
