use std::time::Duration;

use danode_types::{QuorumId, TypeError};

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The batch header could not be hashed.
    #[error("invalid batch: {0}")]
    InvalidBatch(#[from] TypeError),

    /// Parsed blobs and raw blobs do not line up one-to-one.
    #[error("blob count mismatch: {blobs} parsed blobs, {raw_blobs} raw blobs")]
    BlobCountMismatch { blobs: usize, raw_blobs: usize },

    /// A parsed blob carries a bundle its raw form does not.
    #[error("raw blob {blob_index} has no bundle for quorum {quorum}")]
    MissingRawBundle { blob_index: usize, quorum: QuorumId },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the RocksDB engine.
    #[error("database error: {0}")]
    Db(#[from] rocksdb::Error),

    /// A stored value is malformed.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The expiration scan ran out of its time budget.
    #[error("expiration scan exceeded its {budget:?} budget")]
    DeadlineExceeded { budget: Duration },
}

impl StoreError {
    /// Returns `true` for the budget-exhausted outcome of an expiration scan.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
