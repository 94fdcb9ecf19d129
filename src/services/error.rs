//! Error handling utilities for route handlers

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::constants::SUPPORTED_CONTENT_TYPES;
use crate::services::moderation::ModerationError;

/// Every way an upload can fail, as seen by the client
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Unsupported content type: {0}. Supported types are {}", SUPPORTED_CONTENT_TYPES)]
    UnsupportedMediaType(String),
    #[error("Request body exceeds the upload size limit")]
    PayloadTooLarge,
    #[error("Could not fetch or process image")]
    FetchFailed,
    #[error("Could not process image: {}", .0.stage())]
    Detection(#[from] ModerationError),
    #[error("An unexpected error occurred: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::FetchFailed => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Detection(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map an axum extractor rejection, keeping 413 and 5xx distinct from plain bad input
    pub fn from_rejection(context: &str, status: StatusCode, detail: impl std::fmt::Display) -> Self {
        tracing::error!(%status, "{}: {}", context, detail);
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else if status.is_server_error() {
            ApiError::Internal(format!("{}: {}", context, detail))
        } else {
            ApiError::BadRequest(format!("{}: {}", context, detail))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Extension trait for logging errors and converting to ApiError
pub trait LogErr<T> {
    /// Log error with context and return a 400 carrying the given message
    fn log_bad_request(self, context: &str, message: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_bad_request(self, context: &str, message: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            tracing::error!("{}: {}", context, e);
            ApiError::BadRequest(message.to_string())
        })
    }
}
