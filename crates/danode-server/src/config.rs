use std::net::SocketAddr;

use danode_node::NodeConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Largest accepted request body.
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9091)),
            max_request_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_node_config(node: &NodeConfig) -> Self {
        Self {
            bind_addr: node.api_bind_addr,
            ..Default::default()
        }
    }
}
