use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use tracing::error;

use crate::http::RequestContext;
use crate::services::probe::ProbeStatus;
use crate::state::AppState;
use crate::utils::timeouts;

#[derive(Debug, Serialize)]
struct CheckReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct HealthChecks {
    database: CheckReport,
    vector_extension: CheckReport,
    embedder: CheckReport,
}

/// Provider names and version strings are omitted by policy.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    checks: HealthChecks,
    #[serde(rename = "requestId")]
    request_id: String,
}

/// Liveness/readiness rolled into one report. The store check is the
/// critical one; everything else can only degrade the verdict.
/// GET /api/v1/health
pub async fn health_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    let (database_ok, database_latency) =
        match tokio::time::timeout(timeouts::DB_READ, state.store.ping()).await {
            Ok(Ok(latency_ms)) => (true, Some(latency_ms)),
            Ok(Err(e)) => {
                error!("store health check failed: {}", e);
                (false, None)
            }
            Err(_) => {
                error!("store health check timed out");
                (false, None)
            }
        };

    let extension_ok = if database_ok {
        matches!(
            tokio::time::timeout(timeouts::DB_READ, state.store.has_vector_extension()).await,
            Ok(Ok(true))
        )
    } else {
        false
    };

    let embedder = state.probes.embedder_status();

    let status = if !database_ok {
        "unhealthy"
    } else if extension_ok && embedder != ProbeStatus::Failing {
        "ok"
    } else {
        "degraded"
    };

    let http_status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status,
        checks: HealthChecks {
            database: CheckReport {
                status: if database_ok { "ok" } else { "failing" },
                latency_ms: database_latency,
            },
            vector_extension: CheckReport {
                status: if extension_ok { "ok" } else { "missing" },
                latency_ms: None,
            },
            embedder: CheckReport {
                status: embedder.as_str(),
                latency_ms: None,
            },
        },
        request_id: ctx.request_id.clone(),
    };

    (http_status, Json(body)).into_response()
}
