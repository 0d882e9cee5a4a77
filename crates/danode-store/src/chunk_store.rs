use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use danode_crypto::batch_header_hash;
use danode_types::{BatchHash, BatchHeader, BlobMessage, QuorumId, RawBlob};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::kv::{KvBackend, WriteBatch};

/// Seconds per block used to turn block counts into a retention window.
pub const BLOCK_TIME_SECS: u64 = 12;

/// Expiry index entries examined per scan step.
const EXPIRY_SCAN_STEP: usize = 64;

/// How long stored batches are kept, in blocks.
///
/// Both values are read from chain once at startup (or overridden in test
/// mode) and fixed for the lifetime of the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub block_stale_measure: u32,
    pub store_duration_blocks: u32,
}

impl RetentionPolicy {
    pub fn new(block_stale_measure: u32, store_duration_blocks: u32) -> Self {
        Self {
            block_stale_measure,
            store_duration_blocks,
        }
    }

    /// Retention window as wall-clock time.
    pub fn window(&self) -> Duration {
        let blocks = u64::from(self.block_stale_measure) + u64::from(self.store_duration_blocks);
        Duration::from_secs(blocks * BLOCK_TIME_SECS)
    }

    /// Expiration timestamp of a batch stored at `now_secs`.
    pub fn expires_at(&self, now_secs: u64) -> u64 {
        now_secs.saturating_add(self.window().as_secs())
    }
}

/// Keys written by one fresh batch store, kept only for rollback.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreKeySet {
    keys: Vec<Vec<u8>>,
}

impl StoreKeySet {
    pub fn new(keys: Vec<Vec<u8>>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.keys.iter().map(Vec::as_slice)
    }
}

/// Result of [`ChunkStore::store_batch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The batch was written; these keys undo it.
    Stored(StoreKeySet),
    /// A batch with the same header hash is already stored. Nothing was written.
    AlreadyExists,
}

impl StoreOutcome {
    /// Keys to roll back. Empty when the batch already existed.
    pub fn into_keys(self) -> StoreKeySet {
        match self {
            Self::Stored(keys) => keys,
            Self::AlreadyExists => StoreKeySet::default(),
        }
    }
}

/// Result of one expiration scan.
///
/// `deleted` counts batches removed even when `result` is an error: work done
/// before the budget ran out is kept.
#[derive(Debug)]
pub struct SweepReport {
    pub deleted: usize,
    pub result: StoreResult<()>,
}

/// Durable chunk storage for received batches.
///
/// Itemizes a batch into its header, per-blob headers, and per-quorum chunk
/// bundles, and writes them together with an expiration index entry as one
/// atomic batch on the underlying [`KvBackend`].
pub struct ChunkStore {
    kv: Box<dyn KvBackend>,
    retention: RetentionPolicy,
}

impl ChunkStore {
    pub fn new(kv: Box<dyn KvBackend>, retention: RetentionPolicy) -> Self {
        Self { kv, retention }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Store a batch atomically.
    ///
    /// Returns [`StoreOutcome::AlreadyExists`] when the header hash is
    /// already present; re-storing a batch is not an error.
    pub fn store_batch(
        &self,
        header: &BatchHeader,
        blobs: &[BlobMessage],
        raw_blobs: &[RawBlob],
    ) -> StoreResult<StoreOutcome> {
        if blobs.len() != raw_blobs.len() {
            return Err(StoreError::BlobCountMismatch {
                blobs: blobs.len(),
                raw_blobs: raw_blobs.len(),
            });
        }
        let hash = batch_header_hash(header)?;
        let header_key = keys::batch_header_key(&hash);
        if self.kv.contains(&header_key)? {
            debug!(batch = %hash.short_hex(), "batch already stored");
            return Ok(StoreOutcome::AlreadyExists);
        }

        let mut batch = WriteBatch::new();
        let mut written = Vec::new();
        batch.require_absent(header_key.clone());
        batch.put(header_key.clone(), bincode::serialize(header)?);
        written.push(header_key);

        for (blob_index, (blob, raw)) in blobs.iter().zip(raw_blobs).enumerate() {
            let index = blob_index as u32;
            let key = keys::blob_header_key(&hash, index);
            batch.put(key.clone(), raw.header.clone());
            written.push(key);

            for quorum in blob.bundles.keys() {
                let bundle = raw.bundles.get(quorum).ok_or(StoreError::MissingRawBundle {
                    blob_index,
                    quorum: *quorum,
                })?;
                let key = keys::chunks_key(&hash, index, *quorum);
                batch.put(key.clone(), bundle.clone());
                written.push(key);
            }
        }

        let expires_at = self.retention.expires_at(unix_now());
        let key = keys::expiry_key(expires_at, &hash);
        batch.put(key.clone(), hash.as_bytes().to_vec());
        written.push(key);

        if !self.kv.commit(batch)? {
            debug!(batch = %hash.short_hex(), "batch stored concurrently");
            return Ok(StoreOutcome::AlreadyExists);
        }
        debug!(batch = %hash.short_hex(), keys = written.len(), expires_at, "stored batch");
        Ok(StoreOutcome::Stored(StoreKeySet::new(written)))
    }

    /// Best-effort bulk delete, used to roll back a fresh store.
    ///
    /// Returns `false` if the delete failed; the keys are then left for the
    /// expiration sweep to reclaim.
    pub fn delete_keys(&self, keys: &StoreKeySet) -> bool {
        let mut batch = WriteBatch::new();
        for key in keys.iter() {
            batch.delete(key.to_vec());
        }
        match self.kv.commit(batch) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, keys = keys.len(), "failed to delete keys");
                false
            }
        }
    }

    /// Delete every batch whose expiration time is at or before `now_secs`.
    ///
    /// Stops with [`StoreError::DeadlineExceeded`] once `budget` has elapsed;
    /// batches already deleted stay deleted and are counted in the report.
    pub fn delete_expired_entries(&self, now_secs: u64, budget: Duration) -> SweepReport {
        let deadline = Instant::now() + budget;
        let mut deleted = 0;
        let result = self.sweep(now_secs, budget, deadline, &mut deleted);
        SweepReport { deleted, result }
    }

    fn sweep(
        &self,
        now_secs: u64,
        budget: Duration,
        deadline: Instant,
        deleted: &mut usize,
    ) -> StoreResult<()> {
        loop {
            let entries = self.kv.scan_prefix(keys::EXPIRY_PREFIX, EXPIRY_SCAN_STEP)?;
            let scanned = entries.len();
            let mut reached_unexpired = false;

            for (key, _) in entries {
                let (expires_at, hash) = keys::parse_expiry_key(&key)
                    .ok_or_else(|| StoreError::Corrupt("malformed expiry key".into()))?;
                if expires_at > now_secs {
                    reached_unexpired = true;
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(StoreError::DeadlineExceeded { budget });
                }
                self.delete_batch(&hash, key)?;
                *deleted += 1;
            }

            if reached_unexpired || scanned < EXPIRY_SCAN_STEP {
                return Ok(());
            }
        }
    }

    /// Remove every key of one batch, including its expiry entry, atomically.
    fn delete_batch(&self, hash: &BatchHash, expiry_key: Vec<u8>) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(keys::batch_header_key(hash));
        for prefix in [keys::blob_header_prefix(hash), keys::chunks_prefix(hash)] {
            for (key, _) in self.kv.scan_prefix(&prefix, usize::MAX)? {
                batch.delete(key);
            }
        }
        batch.delete(expiry_key);
        debug!(batch = %hash.short_hex(), keys = batch.len(), "deleting expired batch");
        self.kv.commit(batch)?;
        Ok(())
    }

    /// Returns `true` if the batch header is stored.
    pub fn has_batch(&self, hash: &BatchHash) -> StoreResult<bool> {
        self.kv.contains(&keys::batch_header_key(hash))
    }

    pub fn get_batch_header(&self, hash: &BatchHash) -> StoreResult<Option<BatchHeader>> {
        match self.kv.get(&keys::batch_header_key(hash))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Raw header bytes of one blob.
    pub fn get_blob_header(&self, hash: &BatchHash, blob_index: u32) -> StoreResult<Option<Vec<u8>>> {
        self.kv.get(&keys::blob_header_key(hash, blob_index))
    }

    /// Raw bundle bytes of one blob in one quorum.
    pub fn get_chunks(
        &self,
        hash: &BatchHash,
        blob_index: u32,
        quorum: QuorumId,
    ) -> StoreResult<Option<Vec<u8>>> {
        self.kv.get(&keys::chunks_key(hash, blob_index, quorum))
    }
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("retention", &self.retention)
            .finish()
    }
}

/// Current wall-clock time in seconds since the UNIX epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;
    use danode_types::{BlobHeader, BlobQuorumInfo, Bundle};
    use std::collections::BTreeMap;

    const RETENTION: RetentionPolicy = RetentionPolicy {
        block_stale_measure: 2,
        store_duration_blocks: 3,
    };

    fn store() -> ChunkStore {
        ChunkStore::new(Box::new(MemoryKv::new()), RETENTION)
    }

    fn blob(quorums: &[u8]) -> (BlobMessage, RawBlob) {
        let quorum_infos = quorums
            .iter()
            .map(|q| BlobQuorumInfo {
                quorum_id: QuorumId(*q),
                adversary_threshold: 33,
                confirmation_threshold: 55,
                chunk_length: 1,
                num_chunks: 4,
            })
            .collect();
        let header = BlobHeader {
            commitment: [7; 32],
            length: 4,
            quorum_infos,
        };
        let mut bundles = BTreeMap::new();
        let mut raw_bundles = BTreeMap::new();
        for q in quorums {
            bundles.insert(QuorumId(*q), Bundle::new(vec![vec![*q; 32]]));
            raw_bundles.insert(QuorumId(*q), vec![*q; 32]);
        }
        (
            BlobMessage::new(header, bundles),
            RawBlob {
                header: b"raw-header".to_vec(),
                bundles: raw_bundles,
            },
        )
    }

    fn batch(root: u8, n: usize) -> (BatchHeader, Vec<BlobMessage>, Vec<RawBlob>) {
        let (blobs, raws) = (0..n).map(|_| blob(&[0, 1])).unzip();
        (BatchHeader::new(100, [root; 32]), blobs, raws)
    }

    #[test]
    fn retention_window_uses_block_time() {
        assert_eq!(RETENTION.window(), Duration::from_secs(5 * BLOCK_TIME_SECS));
        assert_eq!(RETENTION.expires_at(1000), 1000 + 60);
        assert_eq!(RETENTION.expires_at(u64::MAX), u64::MAX);
    }

    #[test]
    fn store_writes_every_item() {
        let store = store();
        let (header, blobs, raws) = batch(1, 3);
        let keys = match store.store_batch(&header, &blobs, &raws).unwrap() {
            StoreOutcome::Stored(keys) => keys,
            StoreOutcome::AlreadyExists => panic!("fresh store reported existing batch"),
        };
        // header + 3 blob headers + 3 * 2 bundles + expiry entry
        assert_eq!(keys.len(), 1 + 3 + 6 + 1);

        let hash = batch_header_hash(&header).unwrap();
        assert!(store.has_batch(&hash).unwrap());
        assert_eq!(store.get_batch_header(&hash).unwrap(), Some(header));
        assert_eq!(
            store.get_blob_header(&hash, 2).unwrap(),
            Some(b"raw-header".to_vec())
        );
        assert_eq!(
            store.get_chunks(&hash, 1, QuorumId(1)).unwrap(),
            Some(vec![1; 32])
        );
        assert!(store.get_chunks(&hash, 3, QuorumId(0)).unwrap().is_none());
    }

    #[test]
    fn second_store_is_idempotent() {
        let store = store();
        let (header, blobs, raws) = batch(1, 2);
        assert!(matches!(
            store.store_batch(&header, &blobs, &raws).unwrap(),
            StoreOutcome::Stored(_)
        ));
        let again = store.store_batch(&header, &blobs, &raws).unwrap();
        assert_eq!(again, StoreOutcome::AlreadyExists);
        assert!(again.into_keys().is_empty());
    }

    #[test]
    fn delete_keys_removes_fresh_batch() {
        let store = store();
        let (header, blobs, raws) = batch(1, 2);
        let keys = store.store_batch(&header, &blobs, &raws).unwrap().into_keys();
        assert!(store.delete_keys(&keys));

        let hash = batch_header_hash(&header).unwrap();
        assert!(!store.has_batch(&hash).unwrap());
        assert!(store.get_chunks(&hash, 0, QuorumId(0)).unwrap().is_none());
        assert!(store.get_blob_header(&hash, 0).unwrap().is_none());

        // The expiry entry went with it, so a sweep finds nothing.
        let report = store.delete_expired_entries(u64::MAX, Duration::from_secs(1));
        assert_eq!(report.deleted, 0);
        assert!(report.result.is_ok());
    }

    #[test]
    fn mismatched_raw_blobs_are_rejected() {
        let store = store();
        let (header, blobs, mut raws) = batch(1, 2);
        raws.pop();
        assert!(matches!(
            store.store_batch(&header, &blobs, &raws),
            Err(StoreError::BlobCountMismatch {
                blobs: 2,
                raw_blobs: 1
            })
        ));
    }

    #[test]
    fn missing_raw_bundle_is_rejected_without_writing() {
        let store = store();
        let (header, blobs, mut raws) = batch(1, 1);
        raws[0].bundles.remove(&QuorumId(1));
        assert!(matches!(
            store.store_batch(&header, &blobs, &raws),
            Err(StoreError::MissingRawBundle { blob_index: 0, .. })
        ));
        let hash = batch_header_hash(&header).unwrap();
        assert!(!store.has_batch(&hash).unwrap());
    }

    #[test]
    fn malformed_header_is_rejected() {
        let store = store();
        let (_, blobs, raws) = batch(1, 1);
        let header = BatchHeader::new(1, [0; 32]);
        assert!(matches!(
            store.store_batch(&header, &blobs, &raws),
            Err(StoreError::InvalidBatch(_))
        ));
    }

    #[test]
    fn unexpired_batches_survive_sweeps() {
        let store = store();
        let before = unix_now();
        let (header, blobs, raws) = batch(1, 1);
        store.store_batch(&header, &blobs, &raws).unwrap();

        let just_before_expiry = RETENTION.expires_at(before) - 1;
        for _ in 0..5 {
            let report = store.delete_expired_entries(just_before_expiry, Duration::from_secs(1));
            assert_eq!(report.deleted, 0);
            assert!(report.result.is_ok());
        }
        assert!(store.has_batch(&batch_header_hash(&header).unwrap()).unwrap());
    }

    #[test]
    fn expired_batches_are_deleted_completely() {
        let store = store();
        let (h1, b1, r1) = batch(1, 2);
        let (h2, b2, r2) = batch(2, 1);
        store.store_batch(&h1, &b1, &r1).unwrap();
        store.store_batch(&h2, &b2, &r2).unwrap();
        let after = unix_now();

        let report = store.delete_expired_entries(RETENTION.expires_at(after), Duration::from_secs(5));
        assert_eq!(report.deleted, 2);
        assert!(report.result.is_ok());

        for header in [&h1, &h2] {
            let hash = batch_header_hash(header).unwrap();
            assert!(!store.has_batch(&hash).unwrap());
            assert!(store.get_blob_header(&hash, 0).unwrap().is_none());
            assert!(store.get_chunks(&hash, 0, QuorumId(0)).unwrap().is_none());
        }
    }

    #[test]
    fn sweep_spans_multiple_scan_steps() {
        let store = store();
        let count = EXPIRY_SCAN_STEP + 10;
        for i in 0..count {
            let mut root = [0u8; 32];
            root[..8].copy_from_slice(&(i as u64 + 1).to_be_bytes());
            let (_, blobs, raws) = batch(1, 1);
            store
                .store_batch(&BatchHeader::new(1, root), &blobs, &raws)
                .unwrap();
        }
        let report = store.delete_expired_entries(u64::MAX, Duration::from_secs(30));
        assert_eq!(report.deleted, count);
        assert!(report.result.is_ok());
    }

    #[test]
    fn zero_budget_reports_deadline_exceeded() {
        let store = store();
        let (header, blobs, raws) = batch(1, 1);
        store.store_batch(&header, &blobs, &raws).unwrap();

        let report = store.delete_expired_entries(u64::MAX, Duration::ZERO);
        assert_eq!(report.deleted, 0);
        assert!(report.result.unwrap_err().is_deadline_exceeded());
        assert!(store.has_batch(&batch_header_hash(&header).unwrap()).unwrap());
    }

    #[test]
    fn concurrent_duplicate_stores_write_once() {
        let store = std::sync::Arc::new(store());
        let (header, blobs, raws) = batch(9, 2);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let (header, blobs, raws) = (header.clone(), blobs.clone(), raws.clone());
                std::thread::spawn(move || store.store_batch(&header, &blobs, &raws).unwrap())
            })
            .collect();
        let fresh = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| matches!(outcome, StoreOutcome::Stored(_)))
            .count();
        assert_eq!(fresh, 1);
    }
}
