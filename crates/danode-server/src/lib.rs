//! HTTP API of the danode operator.
//!
//! Exposes batch submission and chunk retrieval for a [`danode_node::Node`],
//! plus health and status endpoints:
//!
//! - `GET  /v1/health`
//! - `GET  /v1/info`
//! - `POST /v1/batches`
//! - `GET  /v1/batches/:hash/blobs/:index/chunks/:quorum`

pub mod api;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use api::{BlobRequest, StoreChunksRequest, StoreChunksResponse};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::NodeApiServer;
