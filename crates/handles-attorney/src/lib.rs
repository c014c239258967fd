//! Ledger state for the handles network.
//!
//! This crate is the heart of the handles ledger. It provides:
//! - The action codec for grant / revoke / join / update / void payloads
//! - [`Mutations`], the mergeable batch of pending set deltas
//! - [`MutatingState`], the validating overlay used within one epoch
//! - [`State`], the durable aggregate of the members, captions, and
//!   attorneys sets with checksum, clone, and serialization

pub mod action;
pub mod error;
pub mod mutations;
pub mod overlay;
pub mod state;

pub use action::{
    kind_of, Action, ActionKind, GrantPowerOfAttorney, JoinNetwork, RevokePowerOfAttorney,
    Signature, TypedAction, UpdateInfo, Void, HANDLES_PROTOCOL,
};
pub use error::{ActionError, AttorneyError};
pub use mutations::Mutations;
pub use overlay::MutatingState;
pub use state::State;
