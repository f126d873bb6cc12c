pub mod gateway;

use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::handlers;
use crate::state::AppState;
use crate::utils::clock;

const SENSITIVE_HEADERS: [&str; 2] = ["authorization", "x-access-token"];
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Per-request identity, created before anything else runs and owned by
/// the handler servicing the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/chat",
            post(handlers::chat::chat_handler).options(preflight),
        )
        .route(
            "/api/v1/retrieve",
            post(handlers::retrieve::retrieve_handler).options(preflight),
        )
        .route("/api/v1/metrics", get(handlers::metrics::metrics_handler))
        .route("/api/v1/health", get(handlers::health::health_handler))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), request_pipeline))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Outer request pipeline: request id, span, metrics, and the uniform
/// cache/CORS/id response headers. Handlers run inside it and take care
/// of auth, size, rate limiting, decoding, validation, and business.
async fn request_pipeline(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let request_id = clock::new_request_id();
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let origin = request.headers().get(header::ORIGIN).cloned();
    let endpoint = endpoint_label(&path);

    let span = tracing::info_span!("request", request_id = %request_id, method = %method, path = %path);
    span.in_scope(|| {
        tracing::debug!(headers = ?redacted_headers(request.headers()), "incoming request");
    });

    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let mut response = next.run(request).instrument(span.clone()).await;

    let latency_ms = started.elapsed().as_millis() as u64;
    let status = response.status();
    if let Some(endpoint) = endpoint {
        state.metrics.record(endpoint, latency_ms, status.as_u16());
    }

    let origins = state.settings.origins();
    let headers = response.headers_mut();
    apply_no_store_headers(headers);
    apply_cors_headers(headers, origin.as_ref(), &origins);
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    span.in_scope(|| {
        tracing::info!(status = status.as_u16(), latency_ms, "request completed");
    });

    response
}

fn endpoint_label(path: &str) -> Option<&'static str> {
    match path {
        "/api/v1/chat" => Some("chat"),
        "/api/v1/retrieve" => Some("retrieve"),
        "/api/v1/metrics" => Some("metrics"),
        "/api/v1/health" => Some("health"),
        _ => None,
    }
}

/// Header list safe to log: token-bearing values are masked.
pub fn redacted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "[redacted]".to_string()
            } else {
                value.to_str().unwrap_or("[binary]").to_string()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

fn apply_no_store_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
}

/// Echo the request origin iff allowlisted; otherwise answer with the
/// first configured origin so the header is always deterministic.
fn apply_cors_headers(headers: &mut HeaderMap, origin: Option<&HeaderValue>, allowed: &[String]) {
    let requested = origin.and_then(|value| value.to_str().ok());
    let granted = match requested {
        Some(origin) if allowed.iter().any(|candidate| candidate == origin) => origin.to_string(),
        _ => allowed.first().cloned().unwrap_or_default(),
    };

    if let Ok(value) = HeaderValue::from_str(&granted) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, X-Access-Token"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

/// CORS preflight target; the pipeline adds the actual CORS headers.
async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn not_found(Extension(ctx): Extension<RequestContext>) -> Response {
    let body = json!({
        "error": { "code": "not_found", "message": "No such endpoint" },
        "requestId": ctx.request_id,
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Panics are programming errors: log loudly, answer generically.
fn panic_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!("handler panicked: {}", detail);

    let body = json!({
        "error": { "code": "internal_error", "message": "Internal server error" },
        "requestId": clock::new_request_id(),
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_labels_cover_the_route_table() {
        assert_eq!(endpoint_label("/api/v1/chat"), Some("chat"));
        assert_eq!(endpoint_label("/api/v1/retrieve"), Some("retrieve"));
        assert_eq!(endpoint_label("/api/v1/metrics"), Some("metrics"));
        assert_eq!(endpoint_label("/api/v1/health"), Some("health"));
        assert_eq!(endpoint_label("/api/v1/unknown"), None);
    }

    #[test]
    fn sensitive_headers_are_masked() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer topsecret"));
        headers.insert("x-access-token", HeaderValue::from_static("topsecret"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let redacted = redacted_headers(&headers);
        for (name, value) in &redacted {
            if SENSITIVE_HEADERS.contains(&name.as_str()) {
                assert_eq!(value, "[redacted]");
            }
        }
        assert!(redacted.iter().any(|(n, v)| n == "content-type" && v == "application/json"));
        assert!(!format!("{:?}", redacted).contains("topsecret"));
    }

    #[test]
    fn cors_echoes_allowlisted_origin() {
        let allowed = vec!["http://a.example".to_string(), "http://b.example".to_string()];
        let mut headers = HeaderMap::new();
        let origin = HeaderValue::from_static("http://b.example");
        apply_cors_headers(&mut headers, Some(&origin), &allowed);
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://b.example"
        );
        assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "86400");
    }

    #[test]
    fn cors_falls_back_to_first_configured_origin() {
        let allowed = vec!["http://a.example".to_string(), "http://b.example".to_string()];
        let mut headers = HeaderMap::new();
        let origin = HeaderValue::from_static("http://evil.example");
        apply_cors_headers(&mut headers, Some(&origin), &allowed);
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://a.example"
        );

        let mut headers = HeaderMap::new();
        apply_cors_headers(&mut headers, None, &allowed);
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://a.example"
        );
    }

    #[test]
    fn no_store_headers_are_complete() {
        let mut headers = HeaderMap::new();
        apply_no_store_headers(&mut headers);
        assert_eq!(
            headers.get(header::CACHE_CONTROL).unwrap(),
            "no-store, no-cache, must-revalidate, private"
        );
        assert_eq!(headers.get(header::PRAGMA).unwrap(), "no-cache");
        assert_eq!(headers.get(header::EXPIRES).unwrap(), "0");
    }
}
