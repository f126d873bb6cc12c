use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::http::gateway;
use crate::http::RequestContext;
use crate::models::requests::RetrieveRequest;
use crate::models::responses::RetrieveResponse;
use crate::security::{injection, LimitedEndpoint};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Semantic search over the corpus.
/// POST /api/v1/retrieve
pub async fn retrieve_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    request: Request,
) -> Response {
    let request_id = ctx.request_id.clone();
    match retrieve_inner(&state, &ctx, request).await {
        Ok(response) => response,
        Err(error) => error.into_response_with(&request_id),
    }
}

async fn retrieve_inner(
    state: &AppState,
    ctx: &RequestContext,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    gateway::preflight_mutating(state, LimitedEndpoint::Retrieve, &parts.headers)?;

    let bytes = gateway::read_body(body).await?;
    let decoded: RetrieveRequest = gateway::decode(&bytes)?;
    let spec = decoded.validate()?;

    if injection::is_suspicious(&spec.query) {
        return Err(ApiError::SuspiciousInput);
    }

    let passages = state.retrieval.search(&spec).await?;
    let total = passages.len();

    Ok(Json(RetrieveResponse {
        results: passages.into_iter().map(Into::into).collect(),
        total,
        request_id: ctx.request_id.clone(),
    })
    .into_response())
}
