use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::operator::QuorumId;

/// Size of one encoded symbol in bytes.
pub const BYTES_PER_SYMBOL: u64 = 32;

/// Header of a batch as signed by operators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHeader {
    /// Block at which operator state is evaluated for this batch.
    pub reference_block_number: u64,
    /// Root commitment over all blob headers in the batch.
    pub batch_root: [u8; 32],
}

impl BatchHeader {
    pub fn new(reference_block_number: u64, batch_root: [u8; 32]) -> Self {
        Self {
            reference_block_number,
            batch_root,
        }
    }

    /// Canonical byte encoding hashed to identify the batch.
    ///
    /// Layout: `[reference_block_number: u64 BE][batch_root: 32 bytes]`.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, TypeError> {
        if self.batch_root == [0u8; 32] {
            return Err(TypeError::MalformedHeader("batch root is null".into()));
        }
        let mut out = Vec::with_capacity(40);
        out.extend_from_slice(&self.reference_block_number.to_be_bytes());
        out.extend_from_slice(&self.batch_root);
        Ok(out)
    }
}

/// Per-quorum parameters a blob was encoded with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobQuorumInfo {
    pub quorum_id: QuorumId,
    pub adversary_threshold: u8,
    pub confirmation_threshold: u8,
    /// Symbols per chunk.
    pub chunk_length: u32,
    /// Chunks the blob was expanded into for this quorum.
    pub num_chunks: u32,
}

impl BlobQuorumInfo {
    /// Encoded size of the blob in this quorum, in bytes.
    pub fn encoded_size(&self) -> u64 {
        u64::from(self.chunk_length) * u64::from(self.num_chunks) * BYTES_PER_SYMBOL
    }
}

/// Header of one blob within a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobHeader {
    pub commitment: [u8; 32],
    /// Blob length in symbols.
    pub length: u32,
    pub quorum_infos: Vec<BlobQuorumInfo>,
}

impl BlobHeader {
    /// Parameters for `quorum`, if the blob is striped across it.
    pub fn quorum_info(&self, quorum: QuorumId) -> Option<&BlobQuorumInfo> {
        self.quorum_infos.iter().find(|q| q.quorum_id == quorum)
    }

    /// Encoded size summed over every quorum, used for metering.
    pub fn encoded_size_all_quorums(&self) -> u64 {
        self.quorum_infos.iter().map(BlobQuorumInfo::encoded_size).sum()
    }
}

/// The chunks of one blob assigned to this operator in one quorum.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub chunks: Vec<Vec<u8>>,
}

impl Bundle {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self { chunks }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total chunk bytes in the bundle.
    pub fn size(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

/// A parsed blob: header plus this operator's bundles keyed by quorum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMessage {
    pub header: BlobHeader,
    pub bundles: BTreeMap<QuorumId, Bundle>,
}

impl BlobMessage {
    pub fn new(header: BlobHeader, bundles: BTreeMap<QuorumId, Bundle>) -> Self {
        Self { header, bundles }
    }
}

/// Unprocessed wire form of a blob, persisted verbatim for retrieval.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlob {
    pub header: Vec<u8>,
    pub bundles: BTreeMap<QuorumId, Vec<u8>>,
}
