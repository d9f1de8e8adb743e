//! # HTTP API
//!
//! Route groups and the error type every handler returns.

pub mod skills;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use skilltree_core::service::ProgressError;
use utoipa::ToSchema;

/// Body of every error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

/// Handler failure, mapped onto a status code
#[derive(Debug)]
pub enum ApiError {
    /// No usable identity on the request
    Unauthorized,
    /// Missing or malformed client input
    BadRequest(String),
    /// Server-side failure; the message is generic, details go to the log
    Internal(&'static str),
}

impl ApiError {
    /// Map a service failure, using `internal` as the client-facing text for
    /// storage errors
    pub fn from_progress(err: ProgressError, internal: &'static str) -> Self {
        match err {
            ProgressError::Unauthenticated => Self::Unauthorized,
            ProgressError::Validation(message) => Self::BadRequest(message),
            ProgressError::Storage(_) => Self::Internal(internal),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message.to_string()),
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}
