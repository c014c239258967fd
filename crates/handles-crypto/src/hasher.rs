use handles_types::Hash;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a vault image and a state checksum with identical bytes
/// never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for membership-set images.
    pub const VAULT: Self = Self {
        domain: "handles-vault-v1",
    };
    /// Hasher for the combined ledger-state checksum.
    pub const CHECKSUM: Self = Self {
        domain: "handles-checksum-v1",
    };
    /// Hasher for genesis checkpoints.
    pub const GENESIS: Self = Self {
        domain: "handles-genesis-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Hash {
        self.hash_parts(&[data])
    }

    /// Hash the concatenation of several byte slices with domain separation.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(part);
        }
        Hash::from_hash(*hasher.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(
            ContentHasher::VAULT.hash(b"data"),
            ContentHasher::VAULT.hash(b"data")
        );
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        assert_ne!(
            ContentHasher::VAULT.hash(data),
            ContentHasher::CHECKSUM.hash(data)
        );
        assert_ne!(
            ContentHasher::CHECKSUM.hash(data),
            ContentHasher::GENESIS.hash(data)
        );
    }

    #[test]
    fn parts_match_concatenation() {
        let joined = ContentHasher::CHECKSUM.hash(b"abcdef");
        let parts = ContentHasher::CHECKSUM.hash_parts(&[b"ab", b"cd", b"ef"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn domain_separated_differs_from_raw() {
        assert_ne!(ContentHasher::VAULT.hash(b"k"), Hash::from_bytes(b"k"));
    }
}
