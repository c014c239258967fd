//! Foundation types for the handles ledger.
//!
//! Every other handles crate depends on `handles-types`.
//!
//! # Key Types
//!
//! - [`Hash`]: 256-bit BLAKE3 digest, the sole identity of every set member
//! - [`Token`]: 32-byte account public key
//! - [`Epoch`]: block height assigned by the external ordering engine

pub mod error;
pub mod hash;
pub mod token;

pub use error::TypeError;
pub use hash::Hash;
pub use token::Token;

/// Block height assigned by the ordering engine.
pub type Epoch = u64;
