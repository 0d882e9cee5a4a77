use danode_types::{BatchHash, BatchHeader, TypeError};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so hashes from different domains never collide even when
/// the input bytes are identical.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for batch headers.
    pub const BATCH_HEADER: Self = Self {
        domain: "danode-batch-header-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &[u8; 32]) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Hash identifying a batch. Fails if the header is malformed.
pub fn batch_header_hash(header: &BatchHeader) -> Result<BatchHash, TypeError> {
    let bytes = header.canonical_bytes()?;
    Ok(BatchHash::from_hash(ContentHasher::BATCH_HEADER.hash(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let id1 = ContentHasher::BATCH_HEADER.hash(b"hello world");
        let id2 = ContentHasher::BATCH_HEADER.hash(b"hello world");
        assert_eq!(id1, id2);
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        assert_ne!(
            ContentHasher::new("custom-v1").hash(data),
            ContentHasher::BATCH_HEADER.hash(data)
        );
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentHasher::BATCH_HEADER.hash(b"original");
        assert!(ContentHasher::BATCH_HEADER.verify(b"original", &id));
        assert!(!ContentHasher::BATCH_HEADER.verify(b"tampered", &id));
    }

    #[test]
    fn batch_hash_depends_on_every_field() {
        let base = batch_header_hash(&BatchHeader::new(10, [1; 32])).unwrap();
        let other_block = batch_header_hash(&BatchHeader::new(11, [1; 32])).unwrap();
        let other_root = batch_header_hash(&BatchHeader::new(10, [2; 32])).unwrap();
        assert_ne!(base, other_block);
        assert_ne!(base, other_root);
        assert_eq!(base, batch_header_hash(&BatchHeader::new(10, [1; 32])).unwrap());
    }

    #[test]
    fn malformed_header_fails() {
        let err = batch_header_hash(&BatchHeader::new(10, [0; 32])).unwrap_err();
        assert!(matches!(err, TypeError::MalformedHeader(_)));
    }
}
