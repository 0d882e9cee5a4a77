//! Key layout of the chunk store.
//!
//! ```text
//! batch-header/<hash>                          -> bincode(BatchHeader)
//! blob-header/<hash>/<blob_index u32 BE>       -> raw blob header bytes
//! chunks/<hash>/<blob_index u32 BE>/<quorum>   -> raw bundle bytes
//! expiry/<expires_at u64 BE><hash>             -> hash
//! ```
//!
//! Expiry keys sort by expiration time, so a prefix scan visits the oldest
//! batches first and can stop at the first unexpired entry.

use danode_types::{BatchHash, QuorumId};

pub const BATCH_HEADER_PREFIX: &[u8] = b"batch-header/";
pub const BLOB_HEADER_PREFIX: &[u8] = b"blob-header/";
pub const CHUNKS_PREFIX: &[u8] = b"chunks/";
pub const EXPIRY_PREFIX: &[u8] = b"expiry/";

fn with_hash(prefix: &[u8], hash: &BatchHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 32 + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(hash.as_bytes());
    key
}

pub fn batch_header_key(hash: &BatchHash) -> Vec<u8> {
    with_hash(BATCH_HEADER_PREFIX, hash)
}

/// Prefix shared by every blob header of a batch.
pub fn blob_header_prefix(hash: &BatchHash) -> Vec<u8> {
    let mut key = with_hash(BLOB_HEADER_PREFIX, hash);
    key.push(b'/');
    key
}

pub fn blob_header_key(hash: &BatchHash, blob_index: u32) -> Vec<u8> {
    let mut key = blob_header_prefix(hash);
    key.extend_from_slice(&blob_index.to_be_bytes());
    key
}

/// Prefix shared by every chunk bundle of a batch.
pub fn chunks_prefix(hash: &BatchHash) -> Vec<u8> {
    let mut key = with_hash(CHUNKS_PREFIX, hash);
    key.push(b'/');
    key
}

pub fn chunks_key(hash: &BatchHash, blob_index: u32, quorum: QuorumId) -> Vec<u8> {
    let mut key = chunks_prefix(hash);
    key.extend_from_slice(&blob_index.to_be_bytes());
    key.push(b'/');
    key.push(quorum.0);
    key
}

pub fn expiry_key(expires_at: u64, hash: &BatchHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(EXPIRY_PREFIX.len() + 8 + 32);
    key.extend_from_slice(EXPIRY_PREFIX);
    key.extend_from_slice(&expires_at.to_be_bytes());
    key.extend_from_slice(hash.as_bytes());
    key
}

/// Expiration time encoded in an expiry key, if well-formed.
pub fn parse_expiry_key(key: &[u8]) -> Option<(u64, BatchHash)> {
    let rest = key.strip_prefix(EXPIRY_PREFIX)?;
    if rest.len() != 8 + 32 {
        return None;
    }
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&rest[..8]);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&rest[8..]);
    Some((u64::from_be_bytes(ts), BatchHash::from_hash(hash)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_keys_sort_by_time() {
        let late_small_hash = expiry_key(200, &BatchHash::from_hash([0; 32]));
        let early_big_hash = expiry_key(100, &BatchHash::from_hash([0xff; 32]));
        assert!(early_big_hash < late_small_hash);
    }

    #[test]
    fn parse_expiry_key_roundtrip() {
        let hash = BatchHash::from_hash([3; 32]);
        let key = expiry_key(42, &hash);
        assert_eq!(parse_expiry_key(&key), Some((42, hash)));
        assert_eq!(parse_expiry_key(b"expiry/short"), None);
        assert_eq!(parse_expiry_key(&batch_header_key(&hash)), None);
    }

    #[test]
    fn batch_scoped_keys_share_prefixes() {
        let hash = BatchHash::from_hash([1; 32]);
        assert!(blob_header_key(&hash, 7).starts_with(&blob_header_prefix(&hash)));
        assert!(chunks_key(&hash, 7, QuorumId(2)).starts_with(&chunks_prefix(&hash)));

        let other = BatchHash::from_hash([2; 32]);
        assert!(!chunks_key(&other, 0, QuorumId(0)).starts_with(&chunks_prefix(&hash)));
    }
}
