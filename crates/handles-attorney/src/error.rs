use handles_vault::VaultError;

use crate::action::ActionKind;

/// Errors produced by ledger-state operations.
#[derive(Debug, thiserror::Error)]
pub enum AttorneyError {
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("malformed state image: {0}")]
    MalformedState(String),

    #[error("genesis requires empty vaults, but {name} holds {count} keys")]
    GenesisNotEmpty { name: String, count: usize },
}

/// Errors produced while encoding or parsing an action payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("action payload of {0} bytes is shorter than its header")]
    Truncated(usize),

    #[error("unsupported action version {0}")]
    UnsupportedVersion(u8),

    #[error("action belongs to protocol {0}")]
    ForeignProtocol(u32),

    #[error("unknown action kind {0:#04x}")]
    UnknownKind(u8),

    #[error("expected a {expected} action, found {found}")]
    KindMismatch {
        expected: ActionKind,
        found: ActionKind,
    },

    #[error("action body decode failed: {0}")]
    Decode(String),

    #[error("action body encode failed: {0}")]
    Encode(String),
}
