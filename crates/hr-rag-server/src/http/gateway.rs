use axum::body::Body;
use axum::http::{header, HeaderMap};
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::security::auth;
use crate::security::{LimitedEndpoint, RateDecision};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Hard request-body ceiling: 50 KiB.
pub const MAX_BODY_BYTES: usize = 50 * 1024;

/// Auth for read-only authenticated endpoints (metrics).
pub fn authorize(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    auth::authenticate(headers, &state.settings.api_secret_token).map_err(ApiError::Unauthorized)
}

/// The auth → size → rate-limit prefix every mutating endpoint runs
/// before touching the body. Order matters: an unauthenticated caller
/// must never consume quota, and an oversized request is rejected on
/// its declared size before any read.
pub fn preflight_mutating(
    state: &AppState,
    endpoint: LimitedEndpoint,
    headers: &HeaderMap,
) -> Result<(), ApiError> {
    let token = authorize(state, headers)?;

    if let Some(declared) = declared_content_length(headers) {
        if declared > MAX_BODY_BYTES as u64 {
            return Err(ApiError::PayloadTooLarge);
        }
    }

    match state.rate_limiter.check(endpoint, &token) {
        RateDecision::Allowed { .. } => Ok(()),
        RateDecision::Limited {
            retry_after_seconds,
        } => Err(ApiError::RateLimited {
            retry_after_seconds,
        }),
    }
}

fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
}

/// Drain the body under the same 50 KiB bound, covering clients that
/// omit `Content-Length`.
pub async fn read_body(body: Body) -> Result<Bytes, ApiError> {
    axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|e| ApiError::BadRequest(e.to_string()))
}
