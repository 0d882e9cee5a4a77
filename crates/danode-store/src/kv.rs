use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// A single mutation inside a [`WriteBatch`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A group of mutations applied atomically by [`KvBackend::commit`].
///
/// An optional guard key makes the whole batch conditional: if the guard is
/// already present, nothing is written.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    guard_absent: Option<Vec<u8>>,
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only apply the batch if `key` does not exist yet.
    pub fn require_absent(&mut self, key: Vec<u8>) {
        self.guard_absent = Some(key);
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { key });
    }

    pub fn guard(&self) -> Option<&[u8]> {
        self.guard_absent.as_deref()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Ordered key-value backend the chunk store is built on.
///
/// Implementations must be safe for concurrent use: batches from different
/// callers may commit at the same time, and each commit is all-or-nothing.
pub trait KvBackend: Send + Sync {
    /// Read a value. Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Check whether a key exists.
    fn contains(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply every operation of `batch` atomically.
    ///
    /// Returns `Ok(false)` without writing anything when the batch guard key
    /// is already present, `Ok(true)` once the batch is applied.
    fn commit(&self, batch: WriteBatch) -> StoreResult<bool>;

    /// Remove a single key. Deleting a missing key is not an error.
    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key.to_vec());
        self.commit(batch).map(|_| ())
    }

    /// Up to `limit` entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

impl<T: KvBackend + ?Sized> KvBackend for Arc<T> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn contains(&self, key: &[u8]) -> StoreResult<bool> {
        (**self).contains(key)
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<bool> {
        (**self).commit(batch)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        (**self).scan_prefix(prefix, limit)
    }
}
