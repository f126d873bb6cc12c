use std::convert::Infallible;

use async_stream::stream;
use axum::{
    extract::{Query, Request, State},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::StreamExt;
use serde::Deserialize;
use tracing::error;

use crate::http::gateway;
use crate::http::RequestContext;
use crate::models::requests::{ChatRequest, Role};
use crate::models::responses::{ChatDebugResponse, MessageChunk};
use crate::security::{injection, LimitedEndpoint};
use crate::services::llm::{LlmError, TokenStream};
use crate::state::AppState;
use crate::utils::error::ApiError;
use crate::utils::timeouts;

#[derive(Debug, Default, Deserialize)]
pub struct ChatParams {
    #[serde(default)]
    pub debug: Option<String>,
}

impl ChatParams {
    fn debug_enabled(&self) -> bool {
        matches!(self.debug.as_deref(), Some("1") | Some("true") | Some("yes"))
    }
}

/// Grounded chat over the knowledge base.
/// POST /api/v1/chat — streams tokens, or returns one JSON body with
/// `?debug=1`.
pub async fn chat_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<ChatParams>,
    request: Request,
) -> Response {
    let request_id = ctx.request_id.clone();
    match chat_inner(&state, &ctx, params.debug_enabled(), request).await {
        Ok(response) => response,
        Err(error) => error.into_response_with(&request_id),
    }
}

async fn chat_inner(
    state: &AppState,
    ctx: &RequestContext,
    debug: bool,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    gateway::preflight_mutating(state, LimitedEndpoint::Chat, &parts.headers)?;

    let bytes = gateway::read_body(body).await?;
    let decoded: ChatRequest = gateway::decode(&bytes)?;
    let conversation = decoded.validate()?;

    for message in &conversation.messages {
        if message.role == Role::User && injection::is_suspicious(&message.content) {
            return Err(ApiError::SuspiciousInput);
        }
    }

    if debug {
        let (answer, passages) = state.orchestrator.collect_debug(&conversation).await?;
        let body = ChatDebugResponse {
            answer,
            request_id: ctx.request_id.clone(),
            retrieved_docs: passages.into_iter().map(Into::into).collect(),
        };
        return Ok(Json(body).into_response());
    }

    let outcome = state.orchestrator.run(&conversation).await?;
    Ok(stream_response(outcome.tokens))
}

/// Forward model tokens as they arrive. Each fragment becomes one SSE
/// event; the stream ends with an explicit done marker. Client
/// disconnects drop the stream, which cancels the upstream completion.
fn stream_response(tokens: TokenStream) -> Response {
    let events = stream! {
        let mut tokens = tokens;
        loop {
            match tokio::time::timeout(timeouts::LLM_STREAM_IDLE, tokens.next()).await {
                Ok(Some(Ok(fragment))) => {
                    let event = Event::default()
                        .json_data(MessageChunk { delta: fragment })
                        .unwrap_or_else(|_| Event::default().event("error").data("{\"message\": \"encoding failed\"}"));
                    yield Ok::<Event, Infallible>(event);
                }
                Ok(Some(Err(e))) => {
                    error!("token stream failed: {}", e);
                    let message = match e {
                        LlmError::ContentFiltered => "content filtered",
                        _ => "model stream failed",
                    };
                    yield Ok(Event::default().event("error").data(format!("{{\"message\": \"{}\"}}", message)));
                    break;
                }
                Ok(None) => {
                    yield Ok(Event::default().event("done").data("[DONE]"));
                    break;
                }
                Err(_) => {
                    error!("token stream idle timeout");
                    yield Ok(Event::default().event("error").data("{\"message\": \"stream timed out\"}"));
                    break;
                }
            }
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}
