use std::sync::Arc;

use danode_types::{BatchHeader, BlobMessage, OperatorId, OperatorState};
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

use crate::collaborators::{ChainState, Validator};
use crate::error::{NodeError, NodeResult};

/// Validates every blob of a batch on a bounded pool of blocking workers.
///
/// The pool is shared by all batches processed by the node, so
/// `concurrency` caps validation work node-wide.
#[derive(Clone)]
pub struct BatchValidator {
    chain: Arc<dyn ChainState>,
    validator: Arc<dyn Validator>,
    operator: OperatorId,
    permits: Arc<Semaphore>,
}

impl BatchValidator {
    pub fn new(
        chain: Arc<dyn ChainState>,
        validator: Arc<dyn Validator>,
        operator: OperatorId,
        concurrency: usize,
    ) -> Self {
        Self {
            chain,
            validator,
            operator,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Fetch the operator state at the header's reference block, then check
    /// each blob against it.
    ///
    /// Returns on the first failed blob. Jobs still running finish on their
    /// own and their results are dropped.
    pub async fn validate_batch(
        &self,
        header: &BatchHeader,
        blobs: Arc<Vec<BlobMessage>>,
    ) -> NodeResult<()> {
        let state = self
            .chain
            .operator_state_by_operator(header.reference_block_number, &self.operator)
            .await?;
        self.validate_blobs(Arc::new(state), blobs).await
    }

    async fn validate_blobs(
        &self,
        state: Arc<OperatorState>,
        blobs: Arc<Vec<BlobMessage>>,
    ) -> NodeResult<()> {
        let count = blobs.len();
        if count == 0 {
            return Ok(());
        }
        // One slot per blob: no job ever waits to report.
        let (tx, mut rx) = mpsc::channel(count);

        for blob_index in 0..count {
            let tx = tx.clone();
            let permits = self.permits.clone();
            let validator = self.validator.clone();
            let state = state.clone();
            let blobs = blobs.clone();
            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let joined = tokio::task::spawn_blocking(move || {
                    validator.validate_blob(&blobs[blob_index], &state)
                })
                .await;
                let result = match joined {
                    Ok(result) => {
                        result.map_err(|source| NodeError::Validation { blob_index, source })
                    }
                    Err(e) => Err(NodeError::Internal(format!(
                        "validation of blob {blob_index} panicked: {e}"
                    ))),
                };
                let _ = tx.try_send(result);
            });
        }
        drop(tx);

        for _ in 0..count {
            match rx.recv().await {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "batch validation failed");
                    return Err(e);
                }
                None => {
                    return Err(NodeError::Internal(
                        "validation workers exited without reporting".into(),
                    ))
                }
            }
        }
        Ok(())
    }
}
