// [[AUTORL]]/apps/autorl-kernel/src/error.rs
// Purpose: Kernel error type and its HTTP mapping.
// Architecture: Cross-cutting
// Dependencies: thiserror, axum

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("A demo sequence is already running")]
    SequenceBusy,
    #[error("Run not found: {0}")]
    RunNotFound(String),
    #[error("run_id query parameter is required")]
    MissingRunId,
    #[error("Invalid client id: {0}")]
    InvalidClientId(String),
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("Expected an application/json body, got '{0}'")]
    UnsupportedMediaType(String),
    #[error("Failed to load screen layouts from {path}: {reason}")]
    ScreenFile { path: String, reason: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KernelError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            KernelError::SequenceBusy => StatusCode::CONFLICT,
            KernelError::RunNotFound(_) => StatusCode::NOT_FOUND,
            KernelError::MissingRunId
            | KernelError::InvalidClientId(_)
            | KernelError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            KernelError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            KernelError::ScreenFile { .. } | KernelError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for KernelError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
