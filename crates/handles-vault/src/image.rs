//! Canonical byte image of a membership set.
//!
//! Layout:
//! ```text
//! [8 bytes: key count (big-endian u64)]
//! [count * 32 bytes: keys in strictly ascending order]
//! ```
//!
//! Only the canonical form decodes, so `encode(decode(b)) == b` for every
//! accepted `b`.

use handles_types::Hash;

use crate::error::{VaultError, VaultResult};

const COUNT_SIZE: usize = 8;

/// Encode keys that are already in ascending order.
pub fn encode(keys: &[Hash]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(COUNT_SIZE + keys.len() * Hash::LEN);
    bytes.extend_from_slice(&(keys.len() as u64).to_be_bytes());
    for key in keys {
        bytes.extend_from_slice(key.as_bytes());
    }
    bytes
}

/// Decode a canonical image back into its ascending key list.
pub fn decode(bytes: &[u8]) -> VaultResult<Vec<Hash>> {
    let Some((count, body)) = bytes.split_first_chunk::<COUNT_SIZE>() else {
        return Err(VaultError::MalformedImage(format!(
            "image of {} bytes has no count header",
            bytes.len()
        )));
    };
    let count = u64::from_be_bytes(*count);
    let expected = count
        .checked_mul(Hash::LEN as u64)
        .filter(|len| *len == body.len() as u64)
        .ok_or_else(|| {
            VaultError::MalformedImage(format!(
                "header declares {count} keys but body has {} bytes",
                body.len()
            ))
        })?;

    let mut keys: Vec<Hash> = Vec::with_capacity((expected / Hash::LEN as u64) as usize);
    for chunk in body.chunks_exact(Hash::LEN) {
        let mut raw = [0u8; 32];
        raw.copy_from_slice(chunk);
        let key = Hash::from_hash(raw);
        if let Some(previous) = keys.last() {
            if *previous >= key {
                return Err(VaultError::MalformedImage(format!(
                    "key {} out of order after {}",
                    key.short_hex(),
                    previous.short_hex()
                )));
            }
        }
        keys.push(key);
    }
    Ok(keys)
}
