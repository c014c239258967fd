//! Action payload codec.
//!
//! Layout of every action:
//! ```text
//! [1 byte:  version (0)]
//! [4 bytes: protocol code (big-endian u32, 1 = handles)]
//! [1 byte:  kind tag]
//! [N bytes: body (bincode, fixed-width ints, no trailing bytes)]
//! ```
//!
//! The body carries the typed fields including the epoch and a 64-byte
//! signature. Signatures are opaque here: the ledger keys actions by the
//! hash of the whole payload and never verifies them.

use std::fmt;

use bincode::Options;
use serde::de::{self, DeserializeOwned, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use handles_types::{Epoch, Token};

use crate::error::ActionError;

pub const ACTION_VERSION: u8 = 0;
pub const HANDLES_PROTOCOL: u32 = 1;

const HEADER_SIZE: usize = 6;
const MAX_BODY_SIZE: u64 = 64 * 1024;
const SIGNATURE_SIZE: usize = 64;

/// Type discriminator embedded at byte 5 of every action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Grant,
    Revoke,
    Join,
    UpdateInfo,
    Void,
}

impl ActionKind {
    pub fn tag(self) -> u8 {
        match self {
            Self::Grant => 1,
            Self::Revoke => 2,
            Self::Join => 3,
            Self::UpdateInfo => 4,
            Self::Void => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Grant),
            2 => Some(Self::Revoke),
            3 => Some(Self::Join),
            4 => Some(Self::UpdateInfo),
            5 => Some(Self::Void),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Grant => "grant",
            Self::Revoke => "revoke",
            Self::Join => "join",
            Self::UpdateInfo => "update",
            Self::Void => "void",
        };
        write!(f, "{s}")
    }
}

/// Read the kind of a raw action without decoding its body.
pub fn kind_of(action: &[u8]) -> Result<ActionKind, ActionError> {
    let Some(header) = action.first_chunk::<HEADER_SIZE>() else {
        return Err(ActionError::Truncated(action.len()));
    };
    if header[0] != ACTION_VERSION {
        return Err(ActionError::UnsupportedVersion(header[0]));
    }
    let protocol = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if protocol != HANDLES_PROTOCOL {
        return Err(ActionError::ForeignProtocol(protocol));
    }
    ActionKind::from_tag(header[5]).ok_or(ActionError::UnknownKind(header[5]))
}

fn body_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_BODY_SIZE)
        .reject_trailing_bytes()
}

/// An action type with a fixed kind tag and a bincode body.
pub trait TypedAction: Serialize + DeserializeOwned {
    const KIND: ActionKind;

    /// Encode header and body.
    fn encode(&self) -> Result<Vec<u8>, ActionError> {
        let body = body_options()
            .serialize(self)
            .map_err(|e| ActionError::Encode(e.to_string()))?;
        let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
        bytes.push(ACTION_VERSION);
        bytes.extend_from_slice(&HANDLES_PROTOCOL.to_be_bytes());
        bytes.push(Self::KIND.tag());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Parse a payload that must carry this type's kind tag.
    fn parse(action: &[u8]) -> Result<Self, ActionError> {
        let found = kind_of(action)?;
        if found != Self::KIND {
            return Err(ActionError::KindMismatch {
                expected: Self::KIND,
                found,
            });
        }
        body_options()
            .deserialize(&action[HEADER_SIZE..])
            .map_err(|e| ActionError::Decode(e.to_string()))
    }
}

/// Opaque 64-byte signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub const fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_SIZE])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0[..4]))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SignatureVisitor;

        impl<'de> Visitor<'de> for SignatureVisitor {
            type Value = Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{SIGNATURE_SIZE} signature bytes")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Signature, E> {
                <[u8; SIGNATURE_SIZE]>::try_from(v)
                    .map(Signature)
                    .map_err(|_| E::invalid_length(v.len(), &self))
            }
        }

        deserializer.deserialize_bytes(SignatureVisitor)
    }
}

/// `author` lets `attorney` act on its behalf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantPowerOfAttorney {
    pub epoch: Epoch,
    pub author: Token,
    pub attorney: Token,
    pub signer: Token,
    /// Opaque client fingerprint recorded by the granting wallet.
    pub fingerprint: Vec<u8>,
    pub signature: Signature,
}

impl TypedAction for GrantPowerOfAttorney {
    const KIND: ActionKind = ActionKind::Grant;
}

/// `author` withdraws a power of attorney previously granted to `attorney`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokePowerOfAttorney {
    pub epoch: Epoch,
    pub author: Token,
    pub attorney: Token,
    pub signer: Token,
    pub signature: Signature,
}

impl TypedAction for RevokePowerOfAttorney {
    const KIND: ActionKind = ActionKind::Revoke;
}

/// `author` joins the network and claims `handle`. Always self-signed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinNetwork {
    pub epoch: Epoch,
    pub author: Token,
    pub handle: String,
    pub details: String,
    pub signature: Signature,
}

impl TypedAction for JoinNetwork {
    const KIND: ActionKind = ActionKind::Join;
}

/// Replace the public profile details of `author`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub epoch: Epoch,
    pub author: Token,
    pub signer: Token,
    pub details: String,
    pub signature: Signature,
}

impl TypedAction for UpdateInfo {
    const KIND: ActionKind = ActionKind::UpdateInfo;
}

/// A signed no-op, used by wallets to burn a nonce or mark intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Void {
    pub epoch: Epoch,
    pub author: Token,
    pub signer: Token,
    pub reason: String,
    pub signature: Signature,
}

impl TypedAction for Void {
    const KIND: ActionKind = ActionKind::Void;
}

/// Any decoded handles action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Grant(GrantPowerOfAttorney),
    Revoke(RevokePowerOfAttorney),
    Join(JoinNetwork),
    UpdateInfo(UpdateInfo),
    Void(Void),
}

impl Action {
    /// Dispatch on the kind tag and parse with the matching typed parser.
    pub fn parse(action: &[u8]) -> Result<Self, ActionError> {
        Ok(match kind_of(action)? {
            ActionKind::Grant => Self::Grant(GrantPowerOfAttorney::parse(action)?),
            ActionKind::Revoke => Self::Revoke(RevokePowerOfAttorney::parse(action)?),
            ActionKind::Join => Self::Join(JoinNetwork::parse(action)?),
            ActionKind::UpdateInfo => Self::UpdateInfo(UpdateInfo::parse(action)?),
            ActionKind::Void => Self::Void(Void::parse(action)?),
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Grant(_) => ActionKind::Grant,
            Self::Revoke(_) => ActionKind::Revoke,
            Self::Join(_) => ActionKind::Join,
            Self::UpdateInfo(_) => ActionKind::UpdateInfo,
            Self::Void(_) => ActionKind::Void,
        }
    }
}
