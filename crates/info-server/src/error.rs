use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use info_core::HandlerError;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while configuring or running the service.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("store error: {0}")]
    Store(#[from] info_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Error returned from a REST handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl ApiError {
    /// Convert a handler error, logging it with the operation and key.
    pub fn from_handler(op: &'static str, key: &str, err: HandlerError) -> Self {
        match err {
            HandlerError::MalformedInput(_)
            | HandlerError::InvalidKey { .. }
            | HandlerError::InvalidCommonName(_) => {
                tracing::debug!(op, key, error = %err, "rejected request");
                Self::BadRequest(err.to_string())
            }
            HandlerError::SubtreeNotFound { .. } => {
                tracing::debug!(op, key, error = %err, "nothing to delete");
                Self::NotFound(err.to_string())
            }
            HandlerError::Storage(_) => {
                tracing::error!(op, key, error = %err, "persistence plugin failure");
                Self::Storage(err.to_string())
            }
            HandlerError::PairingCodeExhausted(_) | HandlerError::Internal(_) => {
                tracing::error!(op, key, error = %err, "request failed");
                Self::Internal(err.to_string())
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            Self::Storage(_) => "STORAGE_FAILURE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}
