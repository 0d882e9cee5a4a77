//! External systems the node depends on.
//!
//! Chain access, blob validation and public IP discovery are injected as
//! trait objects so the node can run against a real chain, the in-process
//! [`LocalChain`](crate::LocalChain), or test doubles.

use async_trait::async_trait;
use danode_types::{BlobMessage, OperatorId, OperatorSocket, OperatorState, QuorumId};
use tokio::sync::mpsc;

use crate::error::{NodeResult, ValidationError};

/// Read access to operator stake on chain.
#[async_trait]
pub trait ChainState: Send + Sync {
    /// Stake snapshot at `block_number`, restricted to the quorums `operator` is in.
    async fn operator_state_by_operator(
        &self,
        block_number: u64,
        operator: &OperatorId,
    ) -> NodeResult<OperatorState>;
}

/// Write access to the operator registry plus the retention parameters.
#[async_trait]
pub trait Transactor: Send + Sync {
    async fn register_operator(
        &self,
        operator: &OperatorId,
        socket: &OperatorSocket,
        quorums: &[QuorumId],
    ) -> NodeResult<()>;

    async fn update_operator_socket(
        &self,
        operator: &OperatorId,
        socket: &OperatorSocket,
    ) -> NodeResult<()>;

    /// Blocks a batch may lag behind the chain before it is considered stale.
    async fn block_stale_measure(&self) -> NodeResult<u32>;

    /// Blocks a batch must be kept after confirmation.
    async fn store_duration_blocks(&self) -> NodeResult<u32>;
}

/// Stream of socket changes recorded on chain for one operator.
#[async_trait]
pub trait SocketEventSource: Send + Sync {
    /// Subscribe to socket updates for `operator`. The stream ends when the
    /// source goes away.
    async fn watch_operator_socket(
        &self,
        operator: &OperatorId,
    ) -> NodeResult<mpsc::Receiver<OperatorSocket>>;
}

#[async_trait]
pub trait PublicIpProvider: Send + Sync {
    async fn public_ip(&self) -> NodeResult<String>;
}

/// Checks one blob against the operator state at the batch's reference block.
///
/// Called from blocking worker threads; implementations may be CPU heavy.
pub trait Validator: Send + Sync {
    fn validate_blob(
        &self,
        blob: &BlobMessage,
        state: &OperatorState,
    ) -> Result<(), ValidationError>;
}
