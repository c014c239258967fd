//! Hashing primitives for the handles ledger.
//!
//! Provides domain-separated BLAKE3 hashing for content digests and the
//! raw key derivations that map protocol facts onto membership-set keys.
//!
//! All crypto operations wrap established libraries.

pub mod hasher;
pub mod keys;

pub use hasher::ContentHasher;
pub use keys::{action_key, caption_key, delegation_key, member_key};
