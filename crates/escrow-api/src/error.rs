//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps engine errors to HTTP status codes and JSON bodies carrying the
//! error code, a message naming the entity and states involved, and, for
//! write conflicts, a `retryable` flag. Internal details are never
//! returned to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use escrow_engine::EngineError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "ESCALATED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is not a permitted party or role (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Current state does not permit the request (409).
    #[error("{message}")]
    Conflict {
        /// Engine error code.
        code: &'static str,
        /// Engine error message.
        message: String,
        /// Whether re-reading and retrying may succeed.
        retryable: bool,
    },

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "NOT_AUTHORIZED"),
            Self::Conflict { code, .. } => (StatusCode::CONFLICT, code),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Conflict { retryable, .. } => Some(serde_json::json!({ "retryable": retryable })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::Validation(_) => Self::Validation(err.to_string()),
            EngineError::NotAuthorized { .. } => Self::Forbidden(err.to_string()),
            EngineError::NotFound { .. } => Self::NotFound(err.to_string()),
            EngineError::InvalidTransition { .. }
            | EngineError::Conflict { .. }
            | EngineError::AlreadyDecided { .. }
            | EngineError::AlreadyTerminal { .. }
            | EngineError::Escalated { .. }
            | EngineError::Diverged { .. } => Self::Conflict {
                code: err.code(),
                message: err.to_string(),
                retryable: err.is_retryable(),
            },
            EngineError::Store(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<escrow_core::ValidationError> for AppError {
    fn from(err: escrow_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}
