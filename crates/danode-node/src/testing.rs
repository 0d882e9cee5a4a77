//! Test doubles for the node's collaborators.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use danode_store::{BatchOp, KvBackend, MemoryKv, StoreError, StoreResult, WriteBatch};
use danode_types::{
    BlobHeader, BlobMessage, BlobQuorumInfo, Bundle, OperatorId, OperatorSocket, OperatorState,
    QuorumId, RawBlob,
};
use tokio::sync::mpsc;

use crate::collaborators::{
    ChainState, PublicIpProvider, SocketEventSource, Transactor, Validator,
};
use crate::error::{NodeError, NodeResult, ValidationError};

/// `n` well-formed blobs striped across `quorums`; blob `i` has a commitment
/// filled with byte `i`.
pub fn tagged_blobs(n: usize, quorums: &[u8]) -> (Vec<BlobMessage>, Vec<RawBlob>) {
    (0..n).map(|i| blob_with_tag(i as u8, quorums)).unzip()
}

pub fn blob_with_tag(tag: u8, quorums: &[u8]) -> (BlobMessage, RawBlob) {
    let quorum_infos = quorums
        .iter()
        .map(|q| BlobQuorumInfo {
            quorum_id: QuorumId(*q),
            adversary_threshold: 33,
            confirmation_threshold: 55,
            chunk_length: 1,
            num_chunks: 4,
        })
        .collect();
    let header = BlobHeader {
        commitment: [tag; 32],
        length: 4,
        quorum_infos,
    };
    let mut bundles = BTreeMap::new();
    let mut raw_bundles = BTreeMap::new();
    for q in quorums {
        bundles.insert(QuorumId(*q), Bundle::new(vec![vec![tag; 32]]));
        raw_bundles.insert(QuorumId(*q), vec![tag; 32]);
    }
    (
        BlobMessage::new(header, bundles),
        RawBlob {
            header: vec![tag; 8],
            bundles: raw_bundles,
        },
    )
}

fn tag(blob: &BlobMessage) -> usize {
    blob.header.commitment[0] as usize
}

/// Chain state double: one operator with stake in a fixed set of quorums.
pub struct MockChain {
    operator: OperatorId,
    quorums: Mutex<Vec<QuorumId>>,
    fail_reads: AtomicBool,
    reads: AtomicUsize,
}

impl MockChain {
    pub fn with_member(operator: OperatorId, quorums: &[u8]) -> Self {
        Self {
            operator,
            quorums: Mutex::new(quorums.iter().map(|q| QuorumId(*q)).collect()),
            fail_reads: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn fail_state_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Drop the operator from every quorum.
    pub fn remove_member(&self) {
        self.quorums.lock().unwrap().clear();
    }

    pub fn state_reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainState for MockChain {
    async fn operator_state_by_operator(
        &self,
        block_number: u64,
        operator: &OperatorId,
    ) -> NodeResult<OperatorState> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(NodeError::Chain("rpc unavailable".into()));
        }
        let mut state = OperatorState::new(block_number);
        if *operator == self.operator {
            for q in self.quorums.lock().unwrap().iter() {
                state.insert(*q, self.operator, 100);
            }
        }
        Ok(state)
    }
}

/// Rejects blobs whose tag is in the configured set.
pub struct FailingValidator {
    fail: BTreeSet<usize>,
}

impl FailingValidator {
    pub fn none() -> Self {
        Self::at(&[])
    }

    pub fn at(tags: &[usize]) -> Self {
        Self {
            fail: tags.iter().copied().collect(),
        }
    }
}

impl Validator for FailingValidator {
    fn validate_blob(&self, blob: &BlobMessage, _state: &OperatorState) -> Result<(), ValidationError> {
        if self.fail.contains(&tag(blob)) {
            return Err(ValidationError::Rejected(format!("blob {} rejected", tag(blob))));
        }
        Ok(())
    }
}

/// Sleeps on every blob except the failing ones, which are rejected at once.
/// Tracks the highest number of blobs validated at the same time.
pub struct SlowValidator {
    delay: Duration,
    fail: BTreeSet<usize>,
    running: AtomicUsize,
    peak: Arc<AtomicUsize>,
}

impl SlowValidator {
    pub fn new(delay: Duration, fail: &[usize]) -> Self {
        Self {
            delay,
            fail: fail.iter().copied().collect(),
            running: AtomicUsize::new(0),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn peak(&self) -> Arc<AtomicUsize> {
        self.peak.clone()
    }
}

impl Validator for SlowValidator {
    fn validate_blob(&self, blob: &BlobMessage, _state: &OperatorState) -> Result<(), ValidationError> {
        if self.fail.contains(&tag(blob)) {
            return Err(ValidationError::Rejected("slow validator rejection".into()));
        }
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Memory backend whose writes can be made to fail.
pub struct FlakyKv {
    inner: MemoryKv,
    fail_commits: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyKv {
    pub fn new() -> Self {
        Self {
            inner: MemoryKv::new(),
            fail_commits: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Fail every commit that writes a value.
    pub fn fail_commits(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }

    /// Fail every commit made only of deletes.
    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }
}

impl KvBackend for FlakyKv {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<bool> {
        let deletes_only = batch
            .ops()
            .iter()
            .all(|op| matches!(op, BatchOp::Delete { .. }));
        let failing = if deletes_only {
            &self.fail_deletes
        } else {
            &self.fail_commits
        };
        if failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk unavailable")));
        }
        self.inner.commit(batch)
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan_prefix(prefix, limit)
    }
}

/// Records socket registrations and updates; updates can be made to fail.
#[derive(Default)]
pub struct RecordingTransactor {
    pub registrations: Mutex<Vec<(OperatorSocket, Vec<QuorumId>)>>,
    pub updates: Mutex<Vec<OperatorSocket>>,
    fail_updates: AtomicBool,
    fail_registration: AtomicBool,
    pub block_stale_measure: u32,
    pub store_duration_blocks: u32,
    pub retention_reads: AtomicUsize,
}

impl RecordingTransactor {
    pub fn new(block_stale_measure: u32, store_duration_blocks: u32) -> Self {
        Self {
            block_stale_measure,
            store_duration_blocks,
            ..Default::default()
        }
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_registration(&self, fail: bool) {
        self.fail_registration.store(fail, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<OperatorSocket> {
        self.updates.lock().unwrap().clone()
    }

    pub fn registrations(&self) -> Vec<(OperatorSocket, Vec<QuorumId>)> {
        self.registrations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transactor for RecordingTransactor {
    async fn register_operator(
        &self,
        _operator: &OperatorId,
        socket: &OperatorSocket,
        quorums: &[QuorumId],
    ) -> NodeResult<()> {
        if self.fail_registration.load(Ordering::SeqCst) {
            return Err(NodeError::Chain("registration reverted".into()));
        }
        self.registrations
            .lock()
            .unwrap()
            .push((socket.clone(), quorums.to_vec()));
        Ok(())
    }

    async fn update_operator_socket(
        &self,
        _operator: &OperatorId,
        socket: &OperatorSocket,
    ) -> NodeResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(NodeError::Chain("transaction reverted".into()));
        }
        self.updates.lock().unwrap().push(socket.clone());
        Ok(())
    }

    async fn block_stale_measure(&self) -> NodeResult<u32> {
        self.retention_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.block_stale_measure)
    }

    async fn store_duration_blocks(&self) -> NodeResult<u32> {
        self.retention_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.store_duration_blocks)
    }
}

/// Public IP double; the address can be changed or made to fail at runtime.
pub struct MockIpProvider {
    ip: Mutex<NodeResult<String>>,
    lookups: AtomicUsize,
}

impl MockIpProvider {
    pub fn new(ip: &str) -> Self {
        Self {
            ip: Mutex::new(Ok(ip.to_string())),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn set_ip(&self, ip: &str) {
        *self.ip.lock().unwrap() = Ok(ip.to_string());
    }

    pub fn set_failing(&self) {
        *self.ip.lock().unwrap() = Err(NodeError::PublicIp("lookup timed out".into()));
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublicIpProvider for MockIpProvider {
    async fn public_ip(&self) -> NodeResult<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match &*self.ip.lock().unwrap() {
            Ok(ip) => Ok(ip.clone()),
            Err(e) => Err(NodeError::PublicIp(e.to_string())),
        }
    }
}

/// Socket event source driven by the test through [`MockSocketEvents::emit`].
#[derive(Default)]
pub struct MockSocketEvents {
    subscribers: Mutex<Vec<mpsc::Sender<OperatorSocket>>>,
}

impl MockSocketEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn emit(&self, socket: OperatorSocket) {
        let subscribers = self.subscribers.lock().unwrap().clone();
        for tx in subscribers {
            let _ = tx.send(socket.clone()).await;
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[async_trait]
impl SocketEventSource for MockSocketEvents {
    async fn watch_operator_socket(
        &self,
        _operator: &OperatorId,
    ) -> NodeResult<mpsc::Receiver<OperatorSocket>> {
        let (tx, rx) = mpsc::channel(16);
        self.subscribers.lock().unwrap().push(tx);
        Ok(rx)
    }
}
