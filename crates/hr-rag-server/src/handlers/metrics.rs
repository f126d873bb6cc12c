use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;

use crate::http::gateway;
use crate::http::RequestContext;
use crate::models::responses::MetricsResponse;
use crate::state::AppState;

/// In-memory request statistics. Authenticated, not rate limited.
/// GET /api/v1/metrics
pub async fn metrics_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
) -> Response {
    if let Err(error) = gateway::authorize(&state, &headers) {
        return error.into_response_with(&ctx.request_id);
    }

    Json(MetricsResponse {
        endpoints: state.metrics.report(),
        request_id: ctx.request_id.clone(),
        timestamp: Utc::now(),
    })
    .into_response()
}
