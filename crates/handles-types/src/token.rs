use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{decode_32, TypeError};

/// Account public key on the social protocol.
///
/// Tokens identify members, authors, and attorneys. They never enter a
/// membership set directly: the ledger always stores a hash derived from them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token([u8; 32]);

impl Token {
    pub const fn from_raw(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short identifier (`tk:` plus 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("tk:{}", hex::encode(&self.0[..4]))
    }

    /// Parse from 64 hex characters, with or without the `tk:` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix("tk:").unwrap_or(s);
        decode_32(s).map(Self)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.short_id())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip_with_prefix() {
        let token = Token::from_raw([7; 32]);
        assert_eq!(Token::from_hex(&token.to_hex()).unwrap(), token);
        assert_eq!(
            Token::from_hex(&format!("tk:{}", token.to_hex())).unwrap(),
            token
        );
    }

    #[test]
    fn short_id_format() {
        let short = Token::from_raw([0; 32]).short_id();
        assert_eq!(short, "tk:00000000");
    }
}
