//! Block pipeline for the handles ledger.
//!
//! Protocol blocks flow through three stages:
//!
//! 1. [`classify`] partitions a block's actions by kind, dropping actions
//!    that were invalidated or fail to parse.
//! 2. [`spawn_listener`] holds uncommitted blocks until their commit
//!    notification arrives, prunes actions the commit invalidated, and
//!    emits every block downstream exactly once.
//! 3. [`Incorporator`] validates each emitted block against the ledger
//!    state, incorporates the accepted deltas, and writes periodic
//!    checkpoints from asynchronous state clones.

pub mod block;
pub mod classifier;
pub mod error;
pub mod incorporator;
pub mod listener;

pub use block::{BlockCommit, HandlesBlock, SocialBlock};
pub use classifier::classify;
pub use error::{PipelineError, PipelineResult};
pub use incorporator::{
    checkpoint_path, BlockReport, Incorporator, IncorporatorConfig, DEFAULT_CHECKPOINT_INTERVAL,
};
pub use listener::{spawn_listener, OUTPUT_CAPACITY};
