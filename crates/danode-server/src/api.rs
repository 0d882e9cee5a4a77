//! JSON bodies of the node API.

use std::collections::BTreeMap;

use danode_node::MetricsSnapshot;
use danode_types::{BatchHeader, BlobHeader, BlobMessage, Bundle, QuorumId, RawBlob};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// One blob as submitted: its header and this operator's chunks per quorum,
/// hex-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRequest {
    pub header: BlobHeader,
    pub bundles: BTreeMap<QuorumId, Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreChunksRequest {
    pub batch_header: BatchHeader,
    pub blobs: Vec<BlobRequest>,
}

impl StoreChunksRequest {
    /// Split the request into parsed blobs and the raw form kept for retrieval.
    ///
    /// The raw header is the JSON of the blob header and each raw bundle is
    /// the JSON list of hex chunks, exactly as received.
    pub fn into_parts(self) -> ServerResult<(BatchHeader, Vec<BlobMessage>, Vec<RawBlob>)> {
        let mut blobs = Vec::with_capacity(self.blobs.len());
        let mut raw_blobs = Vec::with_capacity(self.blobs.len());
        for (blob_index, blob) in self.blobs.into_iter().enumerate() {
            let mut bundles = BTreeMap::new();
            let mut raw_bundles = BTreeMap::new();
            for (quorum, chunks) in blob.bundles {
                let decoded = chunks
                    .iter()
                    .map(|c| hex::decode(c))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| {
                        ServerError::BadRequest(format!(
                            "blob {blob_index}, quorum {quorum}: invalid chunk hex: {e}"
                        ))
                    })?;
                raw_bundles.insert(quorum, to_json(&chunks)?);
                bundles.insert(quorum, Bundle::new(decoded));
            }
            raw_blobs.push(RawBlob {
                header: to_json(&blob.header)?,
                bundles: raw_bundles,
            });
            blobs.push(BlobMessage::new(blob.header, bundles));
        }
        Ok((self.batch_header, blobs, raw_blobs))
    }
}

fn to_json<T: Serialize>(value: &T) -> ServerResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ServerError::Internal(e.to_string()))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreChunksResponse {
    pub batch_hash: String,
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunksResponse {
    pub batch_hash: String,
    pub blob_index: u32,
    pub quorum: QuorumId,
    pub chunks: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct InfoResponse {
    pub operator_id: String,
    pub socket: Option<String>,
    pub version: String,
    pub metrics: Option<MetricsSnapshot>,
}
