use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Why bearer-token authentication failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    TokenMissing,
    TokenInvalid,
    TokenMalformed,
}

impl AuthFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::TokenMissing => "token_missing",
            AuthFailure::TokenInvalid => "token_invalid",
            AuthFailure::TokenMalformed => "token_malformed",
        }
    }
}

/// A single field-level validation problem, reported under `details.errors`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error taxonomy for the API surface. Every variant maps to one stable
/// `code` and HTTP status; the response body never carries token material,
/// stack frames, or collaborator messages.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized ({})", .0.reason())]
    Unauthorized(AuthFailure),

    #[error("request body could not be decoded")]
    BadRequest(String),

    #[error("request failed validation")]
    ValidationFailed(Vec<FieldError>),

    #[error("input matched a known prompt-injection pattern")]
    SuspiciousInput,

    #[error("completion was rejected by the provider content filter")]
    ContentFiltered,

    #[error("request body exceeds the size limit")]
    PayloadTooLarge,

    #[error("rate limit exceeded")]
    RateLimited { retry_after_seconds: u64 },

    #[error("{0} is unavailable")]
    ServiceUnavailable(&'static str),

    #[error("timed out waiting for {0}")]
    GatewayTimeout(&'static str),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationFailed(_) | ApiError::SuspiciousInput | ApiError::ContentFiltered => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::ValidationFailed(_) | ApiError::SuspiciousInput | ApiError::ContentFiltered => {
                "validation_failed"
            }
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::RateLimited { .. } => "rate_limit_exceeded",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::GatewayTimeout(_) => "gateway_timeout",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// User-facing message. Intentionally generic for 5xx responses.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Unauthorized(_) => "Missing or invalid access token".to_string(),
            ApiError::BadRequest(_) => "Request body could not be decoded".to_string(),
            ApiError::ValidationFailed(_) => "Request failed validation".to_string(),
            ApiError::SuspiciousInput => "Message content was rejected".to_string(),
            ApiError::ContentFiltered => "The answer was blocked by a content filter".to_string(),
            ApiError::PayloadTooLarge => "Request body exceeds the 50 KiB limit".to_string(),
            ApiError::RateLimited { .. } => "Too many requests, slow down".to_string(),
            ApiError::ServiceUnavailable(_) => "A backing service is temporarily unavailable".to_string(),
            ApiError::GatewayTimeout(_) => "The request timed out".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            ApiError::Unauthorized(failure) => Some(json!({ "reason": failure.reason() })),
            ApiError::BadRequest(detail) => Some(json!({ "detail": detail })),
            ApiError::ValidationFailed(errors) => Some(json!({ "errors": errors })),
            ApiError::SuspiciousInput => Some(json!({ "reason": "suspicious_input" })),
            ApiError::ContentFiltered => Some(json!({ "reason": "content_filtered" })),
            ApiError::RateLimited {
                retry_after_seconds,
            } => Some(json!({ "retry_after_seconds": retry_after_seconds })),
            _ => None,
        }
    }

    /// Render the canonical failure shape
    /// `{error: {code, message, details?}, requestId}` plus status and,
    /// for rate limiting, the `Retry-After` header.
    pub fn into_response_with(self, request_id: &str) -> Response {
        match &self {
            ApiError::Unauthorized(_)
            | ApiError::BadRequest(_)
            | ApiError::ValidationFailed(_)
            | ApiError::SuspiciousInput
            | ApiError::ContentFiltered
            | ApiError::PayloadTooLarge
            | ApiError::RateLimited { .. } => {
                tracing::warn!(request_id, code = self.code(), "request rejected: {}", self);
            }
            ApiError::ServiceUnavailable(collaborator) | ApiError::GatewayTimeout(collaborator) => {
                tracing::error!(request_id, code = self.code(), collaborator = %collaborator, "dependency failure");
            }
            ApiError::Internal(source) => {
                tracing::error!(request_id, code = self.code(), "internal error: {:?}", source);
            }
        }

        let status = self.status();
        let retry_after = match &self {
            ApiError::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        };

        let mut error_body = json!({
            "code": self.code(),
            "message": self.public_message(),
        });
        if let Some(details) = self.details() {
            error_body["details"] = details;
        }
        let body = json!({ "error": error_body, "requestId": request_id });

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
