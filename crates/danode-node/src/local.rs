//! In-process collaborators for running a node without an external chain.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use danode_types::{
    BlobMessage, OperatorId, OperatorSocket, OperatorState, QuorumId, BYTES_PER_SYMBOL,
};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::collaborators::{ChainState, PublicIpProvider, SocketEventSource, Transactor, Validator};
use crate::error::{NodeError, NodeResult, ValidationError};

/// Stake given to operators that register without prior stake.
pub const DEFAULT_REGISTRATION_STAKE: u64 = 1;

#[derive(Debug, Default)]
struct Registry {
    stakes: BTreeMap<QuorumId, BTreeMap<OperatorId, u64>>,
    sockets: BTreeMap<OperatorId, OperatorSocket>,
}

/// A single-process stand-in for the operator registry contracts.
///
/// Holds stakes and sockets in memory and broadcasts every socket change to
/// subscribers of [`SocketEventSource::watch_operator_socket`].
pub struct LocalChain {
    registry: Mutex<Registry>,
    socket_updates: broadcast::Sender<(OperatorId, OperatorSocket)>,
    block_stale_measure: u32,
    store_duration_blocks: u32,
}

impl LocalChain {
    pub fn new(block_stale_measure: u32, store_duration_blocks: u32) -> Self {
        let (socket_updates, _) = broadcast::channel(64);
        Self {
            registry: Mutex::new(Registry::default()),
            socket_updates,
            block_stale_measure,
            store_duration_blocks,
        }
    }

    pub fn set_stake(&self, quorum: QuorumId, operator: OperatorId, stake: u64) {
        let mut registry = self.registry.lock().expect("lock poisoned");
        registry.stakes.entry(quorum).or_default().insert(operator, stake);
    }

    pub fn socket_of(&self, operator: &OperatorId) -> Option<OperatorSocket> {
        self.registry
            .lock()
            .expect("lock poisoned")
            .sockets
            .get(operator)
            .cloned()
    }

    /// Record a socket change made outside this node, as another transaction would.
    pub fn set_socket(&self, operator: OperatorId, socket: OperatorSocket) {
        self.registry
            .lock()
            .expect("lock poisoned")
            .sockets
            .insert(operator, socket.clone());
        let _ = self.socket_updates.send((operator, socket));
    }

    fn is_registered(&self, operator: &OperatorId) -> bool {
        self.registry
            .lock()
            .expect("lock poisoned")
            .sockets
            .contains_key(operator)
    }
}

impl std::fmt::Debug for LocalChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalChain")
            .field("block_stale_measure", &self.block_stale_measure)
            .field("store_duration_blocks", &self.store_duration_blocks)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChainState for LocalChain {
    async fn operator_state_by_operator(
        &self,
        block_number: u64,
        operator: &OperatorId,
    ) -> NodeResult<OperatorState> {
        let registry = self.registry.lock().expect("lock poisoned");
        let mut state = OperatorState::new(block_number);
        for (quorum, members) in &registry.stakes {
            for (member, stake) in members {
                state.insert(*quorum, *member, *stake);
            }
        }
        Ok(state.for_operator(operator))
    }
}

#[async_trait]
impl Transactor for LocalChain {
    async fn register_operator(
        &self,
        operator: &OperatorId,
        socket: &OperatorSocket,
        quorums: &[QuorumId],
    ) -> NodeResult<()> {
        {
            let mut registry = self.registry.lock().expect("lock poisoned");
            for quorum in quorums {
                registry
                    .stakes
                    .entry(*quorum)
                    .or_default()
                    .entry(*operator)
                    .or_insert(DEFAULT_REGISTRATION_STAKE);
            }
        }
        debug!(operator = %operator.short_id(), socket = %socket, "registered operator");
        self.set_socket(*operator, socket.clone());
        Ok(())
    }

    async fn update_operator_socket(
        &self,
        operator: &OperatorId,
        socket: &OperatorSocket,
    ) -> NodeResult<()> {
        if !self.is_registered(operator) {
            return Err(NodeError::Chain(format!(
                "operator {} is not registered",
                operator.short_id()
            )));
        }
        self.set_socket(*operator, socket.clone());
        Ok(())
    }

    async fn block_stale_measure(&self) -> NodeResult<u32> {
        Ok(self.block_stale_measure)
    }

    async fn store_duration_blocks(&self) -> NodeResult<u32> {
        Ok(self.store_duration_blocks)
    }
}

#[async_trait]
impl SocketEventSource for LocalChain {
    async fn watch_operator_socket(
        &self,
        operator: &OperatorId,
    ) -> NodeResult<mpsc::Receiver<OperatorSocket>> {
        let mut updates = self.socket_updates.subscribe();
        let (tx, rx) = mpsc::channel(16);
        let operator = *operator;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    update = updates.recv() => match update {
                        Ok((id, socket)) if id == operator => {
                            if tx.send(socket).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "socket watcher lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        Ok(rx)
    }
}

/// Checks quorum membership and chunk shape of each bundle.
///
/// Does not verify chunk contents against the blob commitment.
#[derive(Clone, Copy, Debug)]
pub struct StructuralValidator {
    operator: OperatorId,
}

impl StructuralValidator {
    pub fn new(operator: OperatorId) -> Self {
        Self { operator }
    }
}

impl Validator for StructuralValidator {
    fn validate_blob(
        &self,
        blob: &BlobMessage,
        state: &OperatorState,
    ) -> Result<(), ValidationError> {
        for (quorum, bundle) in &blob.bundles {
            if !state.is_member(*quorum, &self.operator) {
                return Err(ValidationError::NotInQuorum(*quorum));
            }
            let info = blob
                .header
                .quorum_info(*quorum)
                .ok_or(ValidationError::UnknownQuorum(*quorum))?;
            if bundle.is_empty() {
                return Err(ValidationError::EmptyBundle(*quorum));
            }
            if bundle.chunks.len() > info.num_chunks as usize {
                return Err(ValidationError::TooManyChunks {
                    quorum: *quorum,
                    limit: info.num_chunks,
                    actual: bundle.chunks.len(),
                });
            }
            let expected = u64::from(info.chunk_length) * BYTES_PER_SYMBOL;
            if let Some(chunk) = bundle.chunks.iter().find(|c| c.len() as u64 != expected) {
                return Err(ValidationError::ChunkSize {
                    quorum: *quorum,
                    expected,
                    actual: chunk.len(),
                });
            }
        }
        Ok(())
    }
}

/// Always reports the configured address.
#[derive(Clone, Debug)]
pub struct StaticIpProvider {
    ip: String,
}

impl StaticIpProvider {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }
}

#[async_trait]
impl PublicIpProvider for StaticIpProvider {
    async fn public_ip(&self) -> NodeResult<String> {
        Ok(self.ip.clone())
    }
}
