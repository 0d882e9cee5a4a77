use danode_crypto::KeyError;
use danode_store::StoreError;
use danode_types::{QuorumId, TypeError};
use thiserror::Error;

/// Why a single blob was rejected by a [`Validator`](crate::Validator).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("operator holds no stake in quorum {0}")]
    NotInQuorum(QuorumId),

    #[error("blob header has no parameters for quorum {0}")]
    UnknownQuorum(QuorumId),

    #[error("empty bundle for quorum {0}")]
    EmptyBundle(QuorumId),

    #[error("quorum {quorum}: {actual} chunks exceed the {limit} the blob was encoded into")]
    TooManyChunks {
        quorum: QuorumId,
        limit: u32,
        actual: usize,
    },

    #[error("quorum {quorum}: chunk of {actual} bytes, expected {expected}")]
    ChunkSize {
        quorum: QuorumId,
        expected: u64,
        actual: usize,
    },

    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid batch: {0}")]
    InvalidBatch(#[from] TypeError),

    #[error("signing key: {0}")]
    Key(#[from] KeyError),

    #[error("blob count mismatch: {blobs} blobs, {raw_blobs} raw blobs")]
    BlobCountMismatch { blobs: usize, raw_blobs: usize },

    #[error("blob {blob_index} failed validation: {source}")]
    Validation {
        blob_index: usize,
        #[source]
        source: ValidationError,
    },

    #[error("chain error: {0}")]
    Chain(String),

    #[error("public IP lookup failed: {0}")]
    PublicIp(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl NodeError {
    /// Returns `true` if a blob of the batch was rejected.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
