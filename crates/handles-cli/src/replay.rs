//! Recorded event streams for offline replay.
//!
//! One JSON object per line:
//!
//! ```text
//! {"type":"block","epoch":1,"seal":"<hex>","actions":["<hex>"],"invalidated":[],"commit":"<hex>"}
//! {"type":"commit","seal":"<hex>","invalidated":["<hex>"]}
//! ```
//!
//! `commit` may be omitted on uncommitted blocks. Blank lines and lines
//! starting with `#` are skipped.

use std::fs;
use std::path::Path;

use anyhow::Context;
use handles_pipeline::{BlockCommit, SocialBlock};
use handles_types::Hash;
use serde::Deserialize;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEvent {
    Block {
        epoch: u64,
        seal: String,
        #[serde(default)]
        actions: Vec<String>,
        #[serde(default)]
        invalidated: Vec<String>,
        #[serde(default)]
        commit: Option<String>,
    },
    Commit {
        seal: String,
        #[serde(default)]
        invalidated: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Block(SocialBlock),
    Commit(BlockCommit),
}

pub fn load_events(path: &Path) -> anyhow::Result<Vec<Event>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read events from {}", path.display()))?;
    parse_events(&text)
}

pub fn parse_events(text: &str) -> anyhow::Result<Vec<Event>> {
    let mut events = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let raw: RawEvent =
            serde_json::from_str(line).with_context(|| format!("line {}", index + 1))?;
        let event = convert(raw).with_context(|| format!("line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn convert(raw: RawEvent) -> anyhow::Result<Event> {
    Ok(match raw {
        RawEvent::Block {
            epoch,
            seal,
            actions,
            invalidated,
            commit,
        } => Event::Block(SocialBlock {
            epoch,
            seal_hash: Hash::from_hex(&seal)?,
            actions: actions
                .iter()
                .map(hex::decode)
                .collect::<Result<_, _>>()
                .context("bad action hex")?,
            invalidated: hashes(&invalidated)?,
            commit_hash: match commit {
                Some(commit) => Hash::from_hex(&commit)?,
                None => Hash::zero(),
            },
        }),
        RawEvent::Commit { seal, invalidated } => Event::Commit(BlockCommit {
            seal_hash: Hash::from_hex(&seal)?,
            invalidated: hashes(&invalidated)?,
        }),
    })
}

fn hashes(hex: &[String]) -> anyhow::Result<Vec<Hash>> {
    Ok(hex
        .iter()
        .map(|h| Hash::from_hex(h))
        .collect::<Result<_, _>>()?)
}

/// Seal of the marker block that closes a replay.
pub fn end_seal() -> Hash {
    Hash::from_bytes(b"handles-replay-end")
}

/// Send `events` in order, then an uncommitted marker block and its commit.
///
/// The listener drains each stream in order and services blocks before
/// commits, so the marker is emitted only after every event ahead of it has
/// been handled. Both streams stay open until the listener stops.
pub async fn feed(
    events: Vec<Event>,
    blocks: mpsc::Sender<SocialBlock>,
    commits: mpsc::Sender<BlockCommit>,
) {
    for event in events {
        let sent = match event {
            Event::Block(block) => blocks.send(block).await.is_ok(),
            Event::Commit(commit) => commits.send(commit).await.is_ok(),
        };
        if !sent {
            return;
        }
    }

    let marker = SocialBlock {
        seal_hash: end_seal(),
        ..SocialBlock::default()
    };
    let commit = BlockCommit {
        seal_hash: end_seal(),
        invalidated: Vec::new(),
    };
    if blocks.send(marker).await.is_ok() && commits.send(commit).await.is_ok() {
        blocks.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handles_pipeline::spawn_listener;
    use tokio::sync::watch;

    #[test]
    fn parses_blocks_and_commits() {
        let seal = Hash::from_bytes(b"seal");
        let gone = Hash::from_bytes(b"gone");
        let text = format!(
            "# recorded\n\
             {{\"type\":\"block\",\"epoch\":3,\"seal\":\"{seal}\",\"actions\":[\"00ff\"]}}\n\
             \n\
             {{\"type\":\"commit\",\"seal\":\"{seal}\",\"invalidated\":[\"{gone}\"]}}\n"
        );

        let events = parse_events(&text).unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            Event::Block(block) => {
                assert_eq!(block.epoch, 3);
                assert_eq!(block.seal_hash, seal);
                assert_eq!(block.actions, vec![vec![0x00, 0xff]]);
                assert!(block.commit_hash.is_zero());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            events[1],
            Event::Commit(BlockCommit {
                seal_hash: seal,
                invalidated: vec![gone],
            })
        );
    }

    #[test]
    fn reports_line_of_bad_event() {
        let err = parse_events("{\"type\":\"commit\",\"seal\":\"zz\"}\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 1"));

        let err = parse_events("\n{\"type\":\"nope\"}").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[tokio::test]
    async fn marker_follows_every_event() {
        let (block_tx, block_rx) = mpsc::channel(4);
        let (commit_tx, commit_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut output = spawn_listener(block_rx, commit_rx, shutdown_rx);

        let pending = Hash::from_bytes(b"pending");
        let events = vec![
            Event::Block(SocialBlock {
                epoch: 1,
                seal_hash: pending,
                ..SocialBlock::default()
            }),
            Event::Block(SocialBlock {
                epoch: 2,
                seal_hash: Hash::from_bytes(b"committed"),
                commit_hash: Hash::from_bytes(b"commit"),
                ..SocialBlock::default()
            }),
            Event::Commit(BlockCommit {
                seal_hash: pending,
                invalidated: Vec::new(),
            }),
        ];
        let feeder = tokio::spawn(feed(events, block_tx, commit_tx));

        let mut epochs = Vec::new();
        while let Some(block) = output.recv().await {
            if block.seal == end_seal() {
                break;
            }
            epochs.push(block.epoch);
        }
        assert_eq!(epochs, vec![2, 1]);

        // the feeder holds its streams until the listener stops
        assert!(!feeder.is_finished());
        shutdown_tx.send_replace(true);
        feeder.await.unwrap();
    }
}
