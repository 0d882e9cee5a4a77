use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use danode_crypto::{KeyPair, Signature, VerifyingKey};
use danode_store::{ChunkStore, RetentionPolicy, RocksKv, SyncMode};
use danode_types::{BatchHeader, BlobMessage, OperatorId, OperatorSocket, RawBlob};
use tracing::info;

use crate::collaborators::{ChainState, PublicIpProvider, SocketEventSource, Transactor, Validator};
use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::local::{LocalChain, StaticIpProvider, StructuralValidator};
use crate::metrics::{Metrics, MetricsSnapshot, NodeMetrics};
use crate::processor::BatchProcessor;
use crate::shutdown::BackgroundTasks;
use crate::socket::SocketReconciler;
use crate::sweeper::ExpirationSweeper;
use crate::validation::BatchValidator;

/// External collaborators a node is built with.
#[derive(Clone)]
pub struct NodeDeps {
    pub chain: Arc<dyn ChainState>,
    pub transactor: Arc<dyn Transactor>,
    pub socket_events: Arc<dyn SocketEventSource>,
    pub ip_provider: Arc<dyn PublicIpProvider>,
    /// Defaults to a [`StructuralValidator`] for the node's operator.
    pub validator: Option<Arc<dyn Validator>>,
    pub metrics: Arc<dyn Metrics>,
}

impl NodeDeps {
    /// Wire every collaborator to one in-process chain.
    pub fn local(chain: Arc<LocalChain>, public_ip: impl Into<String>) -> Self {
        Self {
            chain: chain.clone(),
            transactor: chain.clone(),
            socket_events: chain,
            ip_provider: Arc::new(StaticIpProvider::new(public_ip)),
            validator: None,
            metrics: Arc::new(NodeMetrics::new()),
        }
    }
}

/// A data-availability operator node.
pub struct Node {
    config: NodeConfig,
    keys: Arc<KeyPair>,
    operator_id: OperatorId,
    store: Arc<ChunkStore>,
    processor: BatchProcessor,
    reconciler: Arc<SocketReconciler>,
    deps: NodeDeps,
    tasks: BackgroundTasks,
    started: AtomicBool,
}

impl Node {
    /// Derive the operator identity, resolve retention and open the chunk
    /// store. Any failure aborts construction.
    pub async fn new(config: NodeConfig, deps: NodeDeps) -> NodeResult<Self> {
        config.validate()?;
        let keys = Arc::new(KeyPair::from_hex(&config.signing_key)?);
        let operator_id = keys.operator_id();

        std::fs::create_dir_all(&config.db_path)?;

        let block_stale_measure = match config.block_stale_measure_override() {
            Some(blocks) => blocks,
            None => deps.transactor.block_stale_measure().await?,
        };
        let store_duration_blocks = match config.store_duration_blocks_override() {
            Some(blocks) => blocks,
            None => deps.transactor.store_duration_blocks().await?,
        };
        let retention = RetentionPolicy::new(block_stale_measure, store_duration_blocks);

        let kv = RocksKv::open(&config.chunk_store_path(), SyncMode::default())?;
        let store = Arc::new(ChunkStore::new(Box::new(kv), retention));

        let validator = deps
            .validator
            .clone()
            .unwrap_or_else(|| Arc::new(StructuralValidator::new(operator_id)));
        let batch_validator = BatchValidator::new(
            deps.chain.clone(),
            validator,
            operator_id,
            config.num_batch_validators,
        );
        let processor = BatchProcessor::new(
            store.clone(),
            batch_validator,
            keys.clone(),
            deps.metrics.clone(),
        );
        let reconciler = Arc::new(SocketReconciler::new(
            operator_id,
            config.dispersal_port,
            config.retrieval_port,
            deps.transactor.clone(),
            deps.metrics.clone(),
        ));

        info!(
            operator = %operator_id.short_id(),
            db_path = %config.db_path.display(),
            block_stale_measure,
            store_duration_blocks,
            retention_secs = retention.window().as_secs(),
            "node initialized"
        );

        Ok(Self {
            config,
            keys,
            operator_id,
            store,
            processor,
            reconciler,
            deps,
            tasks: BackgroundTasks::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Announce the socket, then start the expiration sweeper and, when the
    /// IP check interval is positive, both socket watchers.
    ///
    /// A failed registration leaves no task running and the node may be
    /// started again.
    pub async fn start(&self) -> NodeResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::Internal("node already started".into()));
        }

        let socket = OperatorSocket::new(
            self.config.hostname.clone(),
            self.config.dispersal_port,
            self.config.retrieval_port,
        );
        if self.config.register_node_at_start {
            info!(socket = %socket, quorums = ?self.config.quorum_ids, "registering operator");
            if let Err(e) = self
                .deps
                .transactor
                .register_operator(&self.operator_id, &socket, &self.config.quorum_ids)
                .await
            {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        self.reconciler.set_registered(socket).await;

        let sweeper = ExpirationSweeper::new(
            self.store.clone(),
            self.config.expiration_poll_interval(),
        );
        self.tasks.spawn("expiration-sweeper", sweeper.run(self.tasks.signal()));

        let interval = self.config.pub_ip_check_interval();
        if interval.is_zero() {
            info!("public IP check disabled; socket watchers not started");
        } else {
            self.tasks.spawn(
                "socket-onchain-watch",
                self.reconciler
                    .clone()
                    .watch_onchain(self.deps.socket_events.clone(), self.tasks.signal()),
            );
            self.tasks.spawn(
                "socket-ip-poll",
                self.reconciler.clone().poll_public_ip(
                    self.deps.ip_provider.clone(),
                    interval,
                    self.tasks.signal(),
                ),
            );
        }
        info!(operator = %self.operator_id.short_id(), tasks = self.tasks.len(), "node started");
        Ok(())
    }

    pub async fn process_batch(
        &self,
        header: BatchHeader,
        blobs: Vec<BlobMessage>,
        raw_blobs: Vec<RawBlob>,
    ) -> NodeResult<Signature> {
        self.processor.process_batch(header, blobs, raw_blobs).await
    }

    /// Stop every background task and wait for them.
    pub async fn shutdown(&self) {
        self.tasks.shutdown().await;
        info!(operator = %self.operator_id.short_id(), "node stopped");
    }

    pub fn operator_id(&self) -> OperatorId {
        self.operator_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.keys.verifying_key()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    pub async fn current_socket(&self) -> Option<OperatorSocket> {
        self.reconciler.current_socket().await
    }

    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.deps.metrics.snapshot()
    }

    /// Number of running background tasks.
    pub fn background_tasks(&self) -> usize {
        self.tasks.len()
    }
}
