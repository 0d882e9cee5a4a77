use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::kv::{BatchOp, KvBackend, WriteBatch};

/// In-memory, `BTreeMap`-based key-value backend.
///
/// Intended for tests and embedding. All entries are held behind a `RwLock`;
/// a commit holds the write lock for its whole duration, which is what makes
/// it atomic with respect to readers and other commits.
pub struct MemoryKv {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the backend is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_ops(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, ops: Vec<BatchOp>) {
    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                map.insert(key, value);
            }
            BatchOp::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

fn scan_map(
    map: &BTreeMap<Vec<u8>, Vec<u8>>,
    prefix: &[u8],
    limit: usize,
) -> Vec<(Vec<u8>, Vec<u8>)> {
    map.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(prefix))
        .take(limit)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<bool> {
        let mut map = self.entries.write().expect("lock poisoned");
        if let Some(guard) = batch.guard() {
            if map.contains_key(guard) {
                return Ok(false);
            }
        }
        apply_ops(&mut map, batch.into_ops());
        Ok(true)
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(scan_map(&map, prefix, limit))
    }
}

impl std::fmt::Debug for MemoryKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKv")
            .field("key_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(kv: &MemoryKv, key: &[u8], value: &[u8]) {
        let mut batch = WriteBatch::new();
        batch.put(key.to_vec(), value.to_vec());
        assert!(kv.commit(batch).unwrap());
    }

    #[test]
    fn put_get_delete() {
        let kv = MemoryKv::new();
        put(&kv, b"k", b"v");
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(kv.contains(b"k").unwrap());

        let mut batch = WriteBatch::new();
        batch.delete(b"k".to_vec());
        kv.commit(batch).unwrap();
        assert!(kv.get(b"k").unwrap().is_none());
        assert!(kv.is_empty());
    }

    #[test]
    fn guard_blocks_whole_batch() {
        let kv = MemoryKv::new();
        put(&kv, b"guard", b"x");

        let mut batch = WriteBatch::new();
        batch.require_absent(b"guard".to_vec());
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());

        assert!(!kv.commit(batch).unwrap());
        assert_eq!(kv.len(), 1);
    }

    #[test]
    fn scan_prefix_is_ordered_and_bounded() {
        let kv = MemoryKv::new();
        put(&kv, b"a/2", b"");
        put(&kv, b"a/1", b"");
        put(&kv, b"a/3", b"");
        put(&kv, b"b/1", b"");

        let all: Vec<_> = kv
            .scan_prefix(b"a/", 10)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(all, vec![b"a/1".to_vec(), b"a/2".to_vec(), b"a/3".to_vec()]);
        assert_eq!(kv.scan_prefix(b"a/", 2).unwrap().len(), 2);
        assert!(kv.scan_prefix(b"c/", 10).unwrap().is_empty());
    }
}
