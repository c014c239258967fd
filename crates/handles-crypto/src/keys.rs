//! Set-key derivation.
//!
//! These are raw (undomained) BLAKE3 digests: they are part of the protocol
//! contract shared with other nodes and must not change between versions.

use handles_types::{Hash, Token};

/// Identity of a raw action payload.
pub fn action_key(action: &[u8]) -> Hash {
    Hash::from_bytes(action)
}

/// Key of a member token in the members set.
pub fn member_key(token: &Token) -> Hash {
    Hash::from_bytes(token.as_bytes())
}

/// Key of a caption in the captions set.
pub fn caption_key(caption: &str) -> Hash {
    Hash::from_bytes(caption.as_bytes())
}

/// Key of the directed relation "`attorney` acts for `token`": `H(token || attorney)`.
pub fn delegation_key(token: &Token, attorney: &Token) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(token.as_bytes());
    hasher.update(attorney.as_bytes());
    Hash::from_hash(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delegation_is_directed() {
        let a = Token::from_raw([1; 32]);
        let b = Token::from_raw([2; 32]);
        assert_ne!(delegation_key(&a, &b), delegation_key(&b, &a));
    }

    #[test]
    fn delegation_hashes_concatenation() {
        let a = Token::from_raw([1; 32]);
        let b = Token::from_raw([2; 32]);
        let mut joined = Vec::new();
        joined.extend_from_slice(a.as_bytes());
        joined.extend_from_slice(b.as_bytes());
        assert_eq!(delegation_key(&a, &b), Hash::from_bytes(&joined));
    }

    #[test]
    fn member_and_caption_keys_hash_content() {
        let token = Token::from_raw([9; 32]);
        assert_eq!(member_key(&token), Hash::from_bytes(&[9; 32]));
        assert_eq!(caption_key("alice"), Hash::from_bytes(b"alice"));
        assert_eq!(action_key(b"payload"), Hash::from_bytes(b"payload"));
    }
}
