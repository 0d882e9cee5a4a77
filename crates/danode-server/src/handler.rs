use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Json;
use danode_crypto::batch_header_hash;
use danode_node::Node;
use danode_types::{BatchHash, QuorumId};

use crate::api::{
    ChunksResponse, HealthResponse, InfoResponse, StoreChunksRequest, StoreChunksResponse,
};
use crate::error::{ServerError, ServerResult};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub node: Arc<Node>,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

pub async fn info_handler(State(state): State<AppState>) -> Json<InfoResponse> {
    let node = &state.node;
    Json(InfoResponse {
        operator_id: node.operator_id().to_hex(),
        socket: node.current_socket().await.map(|s| s.to_string()),
        version: env!("CARGO_PKG_VERSION").into(),
        metrics: node.metrics(),
    })
}

/// Store, validate and sign a batch.
pub async fn store_chunks_handler(
    State(state): State<AppState>,
    Json(request): Json<StoreChunksRequest>,
) -> ServerResult<Json<StoreChunksResponse>> {
    let (header, blobs, raw_blobs) = request.into_parts()?;
    let hash = batch_header_hash(&header).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let signature = state.node.process_batch(header, blobs, raw_blobs).await?;
    Ok(Json(StoreChunksResponse {
        batch_hash: hash.to_hex(),
        signature: signature.to_hex(),
    }))
}

/// Chunks of one blob in one quorum, as stored.
pub async fn get_chunks_handler(
    State(state): State<AppState>,
    Path((hash, blob_index, quorum)): Path<(String, u32, u8)>,
) -> ServerResult<Json<ChunksResponse>> {
    let batch_hash =
        BatchHash::from_hex(&hash).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let quorum = QuorumId(quorum);
    let raw = state
        .node
        .store()
        .get_chunks(&batch_hash, blob_index, quorum)?
        .ok_or_else(|| {
            ServerError::NotFound(format!(
                "chunks of blob {blob_index} in quorum {quorum} of batch {}",
                batch_hash.short_hex()
            ))
        })?;
    let chunks: Vec<String> = serde_json::from_slice(&raw)
        .map_err(|e| ServerError::Internal(format!("stored bundle is not readable: {e}")))?;
    Ok(Json(ChunksResponse {
        batch_hash: batch_hash.to_hex(),
        blob_index,
        quorum,
        chunks,
    }))
}
