//! Error taxonomy shared by all note endpoints
//!
//! Handlers return `ApiError` and this module alone decides the status code and
//! the message the client sees. Internal detail only goes to the log.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use notes_core::{ContentError, ErrorBody};
use thiserror::Error;

use crate::datastore::{ConfigError, StoreError};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or rejected bearer token
    #[error("Unauthorized")]
    Unauthenticated,

    /// Bad content or missing note id; the message is shown to the client
    #[error("{0}")]
    InvalidInput(String),

    /// No row matched the id and owner
    #[error("Not found")]
    NotFound,

    /// Bad or missing environment values; the diagnostic is shown to the client
    #[error(transparent)]
    Misconfiguration(#[from] ConfigError),

    /// The datastore or identity provider failed
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Anything else, panics included
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn missing_id() -> Self {
        ApiError::InvalidInput("Missing note id".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Misconfiguration(_) | ApiError::Upstream(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message placed in the response body
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Unauthenticated | ApiError::InvalidInput(_) | ApiError::NotFound => {
                self.to_string()
            }
            ApiError::Misconfiguration(e) => e.to_string(),
            ApiError::Upstream(_) => "Datastore request failed".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(e: ContentError) -> Self {
        ApiError::InvalidInput(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Config(e) => ApiError::Misconfiguration(e),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status.as_u16(), self);
        } else {
            tracing::debug!("Request rejected with {}: {}", status.as_u16(), self);
        }
        (status, Json(ErrorBody::new(self.public_message()))).into_response()
    }
}
