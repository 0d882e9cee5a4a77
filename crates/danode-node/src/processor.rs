use std::sync::Arc;
use std::time::Instant;

use danode_crypto::{batch_header_hash, KeyPair, Signature};
use danode_store::{ChunkStore, StoreOutcome, StoreResult};
use danode_types::{BatchHeader, BlobMessage, RawBlob};
use tracing::{debug, info, warn};

use crate::error::{NodeError, NodeResult};
use crate::metrics::{Metrics, Stage};
use crate::validation::BatchValidator;

/// Stores, validates and signs incoming batches.
///
/// Storage runs on a blocking thread while validation proceeds; the batch is
/// signed only when both succeed. A batch freshly stored but failing
/// validation is deleted again before the error is returned.
#[derive(Clone)]
pub struct BatchProcessor {
    store: Arc<ChunkStore>,
    validator: BatchValidator,
    keys: Arc<KeyPair>,
    metrics: Arc<dyn Metrics>,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<ChunkStore>,
        validator: BatchValidator,
        keys: Arc<KeyPair>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        Self {
            store,
            validator,
            keys,
            metrics,
        }
    }

    pub async fn process_batch(
        &self,
        header: BatchHeader,
        blobs: Vec<BlobMessage>,
        raw_blobs: Vec<RawBlob>,
    ) -> NodeResult<Signature> {
        let received = Instant::now();
        if blobs.len() != raw_blobs.len() {
            return Err(NodeError::BlobCountMismatch {
                blobs: blobs.len(),
                raw_blobs: raw_blobs.len(),
            });
        }
        let hash = batch_header_hash(&header)?;
        let batch_size: u64 = blobs
            .iter()
            .map(|b| b.header.encoded_size_all_quorums())
            .sum();
        let blob_count = blobs.len();
        self.metrics.accept_batch(Stage::Received, batch_size);
        debug!(batch = %hash.short_hex(), blobs = blob_count, bytes = batch_size, "received batch");

        let blobs = Arc::new(blobs);
        let storage = {
            let store = self.store.clone();
            let header = header.clone();
            let blobs = blobs.clone();
            let metrics = self.metrics.clone();
            tokio::task::spawn_blocking(move || {
                let started = Instant::now();
                let outcome = store.store_batch(&header, &blobs, &raw_blobs);
                if outcome.is_ok() {
                    metrics.accept_batch(Stage::Stored, batch_size);
                    metrics.observe_latency(Stage::Stored, started.elapsed());
                }
                outcome
            })
        };

        let validation_started = Instant::now();
        let validation = self.validator.validate_batch(&header, blobs).await;
        let validation_elapsed = validation_started.elapsed();
        let stored = join_storage(storage).await;

        if let Err(err) = validation {
            match stored {
                Ok(StoreOutcome::Stored(keys)) => {
                    let store = self.store.clone();
                    let key_count = keys.len();
                    let deleted = tokio::task::spawn_blocking(move || store.delete_keys(&keys))
                        .await
                        .unwrap_or(false);
                    if deleted {
                        debug!(batch = %hash.short_hex(), keys = key_count, "rolled back stored batch");
                    } else {
                        warn!(batch = %hash.short_hex(), keys = key_count, "failed to roll back stored batch");
                    }
                }
                Ok(StoreOutcome::AlreadyExists) => {}
                Err(store_err) => {
                    warn!(batch = %hash.short_hex(), error = %store_err, "storage also failed for rejected batch");
                }
            }
            info!(batch = %hash.short_hex(), error = %err, "rejected batch");
            return Err(err);
        }
        self.metrics.accept_batch(Stage::Validated, batch_size);
        self.metrics.observe_latency(Stage::Validated, validation_elapsed);

        let outcome = stored?;
        let fresh = matches!(outcome, StoreOutcome::Stored(_));

        let signature = self.keys.sign(hash.as_bytes());
        self.metrics.accept_batch(Stage::Signed, batch_size);
        self.metrics.observe_latency(Stage::Signed, received.elapsed());
        info!(batch = %hash.short_hex(), blobs = blob_count, fresh, "signed batch");
        Ok(signature)
    }

    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }
}

async fn join_storage(
    handle: tokio::task::JoinHandle<StoreResult<StoreOutcome>>,
) -> NodeResult<StoreOutcome> {
    match handle.await {
        Ok(result) => Ok(result?),
        Err(e) => Err(NodeError::Internal(format!("storage task failed: {e}"))),
    }
}
