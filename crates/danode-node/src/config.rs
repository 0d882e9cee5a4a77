use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use danode_types::QuorumId;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

/// Operator node configuration, loaded from TOML.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root of on-disk state; the chunk store lives in `<db_path>/chunk`.
    pub db_path: PathBuf,
    /// Hex-encoded 32-byte Ed25519 secret.
    pub signing_key: String,
    pub hostname: String,
    pub dispersal_port: u16,
    pub retrieval_port: u16,
    /// Upper bound on blobs validated in parallel.
    pub num_batch_validators: usize,
    pub expiration_poll_interval_secs: u64,
    /// Zero disables both socket watchers.
    pub pub_ip_check_interval_secs: u64,
    pub enable_test_mode: bool,
    pub override_block_stale_measure: u32,
    pub override_store_duration_blocks: u32,
    pub register_node_at_start: bool,
    pub quorum_ids: Vec<QuorumId>,
    pub enable_node_api: bool,
    pub api_bind_addr: SocketAddr,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./danode-data"),
            signing_key: String::new(),
            hostname: "127.0.0.1".into(),
            dispersal_port: 32005,
            retrieval_port: 32004,
            num_batch_validators: 128,
            expiration_poll_interval_secs: 180,
            pub_ip_check_interval_secs: 0,
            enable_test_mode: false,
            override_block_stale_measure: 0,
            override_store_duration_blocks: 0,
            register_node_at_start: false,
            quorum_ids: vec![QuorumId(0)],
            enable_node_api: false,
            api_bind_addr: SocketAddr::from(([127, 0, 0, 1], 9091)),
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> NodeResult<Self> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> NodeResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> NodeResult<String> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> NodeResult<()> {
        if self.num_batch_validators == 0 {
            return Err(NodeError::Config("num_batch_validators must be positive".into()));
        }
        if self.expiration_poll_interval_secs == 0 {
            return Err(NodeError::Config(
                "expiration_poll_interval_secs must be positive".into(),
            ));
        }
        if self.hostname.trim().is_empty() {
            return Err(NodeError::Config("hostname must not be empty".into()));
        }
        if self.signing_key.trim().is_empty() {
            return Err(NodeError::Config("signing_key is required".into()));
        }
        Ok(())
    }

    pub fn expiration_poll_interval(&self) -> Duration {
        Duration::from_secs(self.expiration_poll_interval_secs)
    }

    pub fn pub_ip_check_interval(&self) -> Duration {
        Duration::from_secs(self.pub_ip_check_interval_secs)
    }

    /// Test-mode replacement for the on-chain stale measure, if set.
    pub fn block_stale_measure_override(&self) -> Option<u32> {
        (self.enable_test_mode && self.override_block_stale_measure > 0)
            .then_some(self.override_block_stale_measure)
    }

    /// Test-mode replacement for the on-chain store duration, if set.
    pub fn store_duration_blocks_override(&self) -> Option<u32> {
        (self.enable_test_mode && self.override_store_duration_blocks > 0)
            .then_some(self.override_store_duration_blocks)
    }

    pub fn chunk_store_path(&self) -> PathBuf {
        self.db_path.join("chunk")
    }
}
