use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handler::{self, AppState};

/// Build the axum router with all node API endpoints.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/batches", post(handler::store_chunks_handler))
        .route(
            "/v1/batches/:hash/blobs/:index/chunks/:quorum",
            get(handler::get_chunks_handler),
        )
        .layer(DefaultBodyLimit::max(config.max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
