//! Admission-layer error taxonomy and the JSON envelope it renders to.
//!
//! Every rejection produced by the edge middlewares becomes an [`ApiError`].
//! The response body is always `{code, title, message}`; codes are stable and
//! the message never carries internal details.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_INVALID_PATH: &str = "TPL-0400";
pub const CODE_INVALID_HEADER: &str = "TPL-0402";
pub const CODE_RATE_LIMITED: &str = "TPL-0429";
pub const CODE_INTERNAL: &str = "TPL-0500";
pub const CODE_BAD_GATEWAY: &str = "TPL-0502";

/// Body shared by every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub title: String,
    pub message: String,
}

/// Errors emitted by the admission pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("invalid path parameter `{name}`")]
    InvalidPathParameter { name: String },

    #[error("invalid header `{name}`")]
    InvalidHeaderParameter { name: &'static str },

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("recovered from panic")]
    RecoveredPanic,

    #[error("upstream request failed")]
    BadGateway,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidPathParameter { .. } | ApiError::InvalidHeaderParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::RecoveredPanic => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPathParameter { .. } => CODE_INVALID_PATH,
            ApiError::InvalidHeaderParameter { .. } => CODE_INVALID_HEADER,
            ApiError::RateLimitExceeded { .. } => CODE_RATE_LIMITED,
            ApiError::RecoveredPanic => CODE_INTERNAL,
            ApiError::BadGateway => CODE_BAD_GATEWAY,
        }
    }

    /// Build the envelope sent to the client.
    pub fn envelope(&self) -> ErrorEnvelope {
        let (title, message) = match self {
            ApiError::InvalidPathParameter { name } => (
                "Invalid Path Parameter",
                format!("Path parameter '{name}' is missing or malformed."),
            ),
            ApiError::InvalidHeaderParameter { name } => (
                "Invalid Header Parameter",
                format!("Header '{name}' is missing or malformed."),
            ),
            ApiError::RateLimitExceeded { retry_after_secs } => (
                "Too Many Requests",
                format!("Rate limit exceeded. Please retry after {retry_after_secs} seconds."),
            ),
            ApiError::RecoveredPanic => (
                "Internal Server Error",
                "An unexpected error occurred.".to_string(),
            ),
            ApiError::BadGateway => (
                "Bad Gateway",
                "The upstream service could not complete the request.".to_string(),
            ),
        };

        ErrorEnvelope {
            code: self.code().to_string(),
            title: title.to_string(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.envelope())).into_response();

        if let ApiError::RateLimitExceeded { retry_after_secs } = self {
            response
                .headers_mut()
                .entry(header::RETRY_AFTER)
                .or_insert_with(|| HeaderValue::from(retry_after_secs));
        }

        response
    }
}
