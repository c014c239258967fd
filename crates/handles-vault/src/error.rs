use std::path::PathBuf;

/// Errors from membership-set operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// I/O error from the journal file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A journal record before the tail failed validation.
    #[error("corrupt journal {path} at offset {offset}: {reason}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// A serialized set image is not in canonical form.
    #[error("malformed vault image: {0}")]
    MalformedImage(String),

    /// The backing store has been closed.
    #[error("vault {0} is closed")]
    Closed(String),

    /// A background clone task did not complete.
    #[error("clone of vault {name} failed: {reason}")]
    Clone { name: String, reason: String },
}

/// Result alias for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
