//! API error responses
//!
//! Every failure leaves the daemon as `{"error": <code>, "message": <text>}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hostprov_core::FailureReason;
use serde::Serialize;

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    /// 400 - malformed request
    BadRequest(String),
    /// 400 - DNS does not prove control of the domain
    VerificationFailed(String),
    /// 404 - no installation for the domain
    NotInstalled(String),
    /// 409 - a run for the domain is in flight
    Conflict(String),
    /// 500 - a step failed
    Internal(String),
    /// 504 - a step ran out of time
    GatewayTimeout(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Map a pipeline failure to a response, keeping its caller-facing message
    pub fn from_failure(reason: &FailureReason, message: String) -> Self {
        match reason {
            FailureReason::OwnershipNotVerified { .. } | FailureReason::AddressNotSet { .. } => {
                Self::VerificationFailed(message)
            }
            FailureReason::InProgress => Self::Conflict(message),
            FailureReason::NotInstalled => Self::NotInstalled(message),
            FailureReason::Timeout { .. } => Self::GatewayTimeout(message),
            FailureReason::Command { .. }
            | FailureReason::Cancelled
            | FailureReason::Unexpected { .. } => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::VerificationFailed(msg) => {
                (StatusCode::BAD_REQUEST, "verification_failed", msg)
            }
            ApiError::NotInstalled(msg) => (StatusCode::NOT_FOUND, "not_installed", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "in_progress", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "step_failed", msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "timeout", msg),
        };

        (status, Json(ErrorResponse::new(error_type, message))).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
            ApiError::VerificationFailed(m) => write!(f, "Verification failed: {}", m),
            ApiError::NotInstalled(m) => write!(f, "Not installed: {}", m),
            ApiError::Conflict(m) => write!(f, "Conflict: {}", m),
            ApiError::Internal(m) => write!(f, "Internal error: {}", m),
            ApiError::GatewayTimeout(m) => write!(f, "Timeout: {}", m),
        }
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;
