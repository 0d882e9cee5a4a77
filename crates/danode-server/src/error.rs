use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use danode_node::NodeError;
use danode_store::StoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Node(e) => match e {
                NodeError::InvalidBatch(_) | NodeError::BlobCountMismatch { .. } => {
                    StatusCode::BAD_REQUEST
                }
                NodeError::Store(StoreError::InvalidBatch(_))
                | NodeError::Store(StoreError::MissingRawBundle { .. }) => StatusCode::BAD_REQUEST,
                NodeError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                NodeError::Chain(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Store(_) | Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
