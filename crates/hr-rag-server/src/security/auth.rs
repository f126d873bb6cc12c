use axum::http::{header, HeaderMap};
use subtle::{Choice, ConstantTimeEq};

use crate::utils::error::AuthFailure;

const ACCESS_TOKEN_HEADER: &str = "x-access-token";
const BEARER_PREFIX: &str = "Bearer ";

/// Constant-time byte comparison that always walks
/// `max(len(a), len(b))` bytes. A length mismatch still returns false
/// only after the full loop completes.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut equal = Choice::from(1u8);
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        equal &= x.ct_eq(&y);
    }
    equal &= (a.len() as u64).ct_eq(&(b.len() as u64));
    equal.into()
}

/// Pull the bearer token out of the request headers.
///
/// `Authorization: Bearer <token>` wins; `X-Access-Token` is the
/// fallback. A non-empty `Authorization` header without the `Bearer `
/// scheme and without a fallback header is malformed rather than
/// missing, so clients get an actionable reason.
pub fn extract_token(headers: &HeaderMap) -> Result<String, AuthFailure> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let access_token = headers
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Some(value) = authorization {
        if let Some(token) = value.strip_prefix(BEARER_PREFIX) {
            return Ok(token.to_string());
        }
        if !value.is_empty() && access_token.is_none() {
            return Err(AuthFailure::TokenMalformed);
        }
    }

    match access_token {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(AuthFailure::TokenMissing),
    }
}

/// Extract and verify the bearer token. Returns the presented token on
/// success so downstream layers can key rate limiting off the token
/// value instead of the raw header string.
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<String, AuthFailure> {
    let token = extract_token(headers)?;
    if !constant_time_eq(token.as_bytes(), secret.as_bytes()) {
        return Err(AuthFailure::TokenInvalid);
    }
    Ok(token)
}
