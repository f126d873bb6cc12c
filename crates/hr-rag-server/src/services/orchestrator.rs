use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

use crate::models::requests::{Conversation, SearchSpec, CHAT_MIN_SIMILARITY};
use crate::services::llm::{ChatModel, LlmError, TokenStream};
use crate::services::prompt;
use crate::services::retrieval::{RetrievalService, RetrievedPassage};
use crate::utils::error::ApiError;
use crate::utils::timeouts;

/// Chat-internal retrieval depth. Narrower than the retrieval
/// endpoint's default so the prompt stays focused.
pub const CHAT_TOP_K: usize = 5;

/// Retrieval artifacts plus the live token stream for one chat turn.
pub struct ChatOutcome {
    pub passages: Vec<RetrievedPassage>,
    pub tokens: TokenStream,
}

impl std::fmt::Debug for ChatOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOutcome")
            .field("passages", &self.passages)
            .field("tokens", &"<TokenStream>")
            .finish()
    }
}

pub fn map_llm_error(error: LlmError) -> ApiError {
    match error {
        LlmError::ContentFiltered => ApiError::ContentFiltered,
        LlmError::Unavailable(detail) => {
            tracing::error!("model provider unavailable: {}", detail);
            ApiError::ServiceUnavailable("model provider")
        }
        LlmError::Stream(detail) => {
            tracing::error!("model stream failed: {}", detail);
            ApiError::ServiceUnavailable("model provider")
        }
    }
}

/// End-to-end pipeline for the chat endpoint: retrieval over the last
/// user turn, prompt assembly, then the streaming completion.
pub struct ChatOrchestrator {
    retrieval: Arc<RetrievalService>,
    model: Arc<dyn ChatModel>,
}

impl ChatOrchestrator {
    pub fn new(retrieval: Arc<RetrievalService>, model: Arc<dyn ChatModel>) -> Self {
        Self { retrieval, model }
    }

    pub async fn run(&self, conversation: &Conversation) -> Result<ChatOutcome, ApiError> {
        // Only the last (user) message drives retrieval; earlier turns
        // reach the model as history but never widen the search.
        let spec = SearchSpec {
            query: conversation.query().to_string(),
            top_k: CHAT_TOP_K,
            min_similarity: CHAT_MIN_SIMILARITY,
            document_id: None,
        };
        let passages = self.retrieval.search(&spec).await?;
        debug!("chat retrieval produced {} passages", passages.len());

        let built = prompt::build_prompt(&passages, &conversation.messages);

        let tokens = timeouts::bounded(timeouts::LLM_COMPLETION, "model completion", async {
            self.model
                .stream(&built.system, &built.messages, conversation.max_output_tokens)
                .await
                .map_err(map_llm_error)
        })
        .await?;

        Ok(ChatOutcome { passages, tokens })
    }

    /// Debug mode: drain the stream into a single materialized answer.
    pub async fn collect_debug(
        &self,
        conversation: &Conversation,
    ) -> Result<(String, Vec<RetrievedPassage>), ApiError> {
        let ChatOutcome {
            passages,
            mut tokens,
        } = self.run(conversation).await?;

        let mut answer = String::new();
        loop {
            match tokio::time::timeout(timeouts::LLM_STREAM_IDLE, tokens.next()).await {
                Ok(Some(Ok(fragment))) => answer.push_str(&fragment),
                Ok(Some(Err(e))) => return Err(map_llm_error(e)),
                Ok(None) => break,
                Err(_) => return Err(ApiError::GatewayTimeout("model stream")),
            }
        }

        Ok((answer, passages))
    }
}
