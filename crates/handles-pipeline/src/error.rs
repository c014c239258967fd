use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ledger error: {0}")]
    Attorney(#[from] handles_attorney::AttorneyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint {path} failed: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error("state clone for epoch {0} was abandoned")]
    CloneAborted(u64),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
