use std::future::Future;
use std::sync::Arc;

use danode_node::Node;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// HTTP front end of a running [`Node`].
pub struct NodeApiServer {
    config: ServerConfig,
    node: Arc<Node>,
}

impl NodeApiServer {
    pub fn new(config: ServerConfig, node: Arc<Node>) -> Self {
        Self { config, node }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(
            AppState {
                node: self.node.clone(),
            },
            &self.config,
        )
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "node API listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
