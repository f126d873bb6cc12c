use serde::Deserialize;
use uuid::Uuid;

use crate::utils::error::{ApiError, FieldError};

pub const MAX_QUERY_CHARS: usize = 500;
pub const MAX_TOP_K: i64 = 50;
pub const DEFAULT_TOP_K: usize = 8;

/// Retrieval endpoint default. Documented elsewhere as 0.7; the
/// observed behavior is 0.5 and that is what we keep.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.5;
/// Chat-internal retrieval floor. Lower on purpose: weak evidence is
/// still useful material for the model to cite or refuse from.
pub const CHAT_MIN_SIMILARITY: f32 = 0.3;

pub const MAX_MESSAGES: usize = 50;
pub const MAX_MESSAGE_CHARS: usize = 500;
pub const MAX_OUTPUT_TOKENS_LIMIT: i64 = 2000;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 800;

/// Raw body of `POST /api/v1/retrieve`. Unknown fields are ignored;
/// none of them would silently change semantics.
#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub top_k: Option<i64>,
    pub min_similarity: Option<f64>,
    #[serde(default)]
    pub filters: Option<RetrieveFilters>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RetrieveFilters {
    pub document_id: Option<String>,
}

/// Validated retrieval parameters.
#[derive(Debug, Clone)]
pub struct SearchSpec {
    pub query: String,
    pub top_k: usize,
    pub min_similarity: f32,
    pub document_id: Option<Uuid>,
}

impl RetrieveRequest {
    pub fn validate(self) -> Result<SearchSpec, ApiError> {
        let mut errors = Vec::new();

        let query_chars = self.query.chars().count();
        if query_chars == 0 || query_chars > MAX_QUERY_CHARS {
            errors.push(FieldError::new(
                "query",
                format!("must be between 1 and {} characters", MAX_QUERY_CHARS),
            ));
        }

        let top_k = self.top_k.unwrap_or(DEFAULT_TOP_K as i64);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            errors.push(FieldError::new(
                "top_k",
                format!("must be between 1 and {}", MAX_TOP_K),
            ));
        }

        let min_similarity = self.min_similarity.unwrap_or(DEFAULT_MIN_SIMILARITY as f64);
        if !(0.0..=1.0).contains(&min_similarity) {
            errors.push(FieldError::new("min_similarity", "must be within [0, 1]"));
        }

        let document_id = match self.filters.and_then(|filters| filters.document_id) {
            Some(raw) => match Uuid::parse_str(&raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push(FieldError::new("filters.document_id", "must be a UUID"));
                    None
                }
            },
            None => None,
        };

        if !errors.is_empty() {
            return Err(ApiError::ValidationFailed(errors));
        }

        Ok(SearchSpec {
            query: self.query,
            top_k: top_k as usize,
            min_similarity: min_similarity as f32,
            document_id,
        })
    }
}

/// Raw body of `POST /api/v1/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<IncomingMessage>,
    pub max_output_tokens: Option<i64>,
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Validated chat input: ordered history ending in a user turn.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub messages: Vec<Message>,
    pub max_output_tokens: u32,
    /// Reserved; accepted and normalized but not yet interpreted.
    pub locale: String,
}

impl Conversation {
    /// The retrieval query: the final (user) message. Validation
    /// guarantees the history is non-empty and ends with a user turn.
    pub fn query(&self) -> &str {
        self.messages
            .last()
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }
}

impl ChatRequest {
    pub fn validate(self) -> Result<Conversation, ApiError> {
        let mut errors = Vec::new();

        if self.messages.is_empty() || self.messages.len() > MAX_MESSAGES {
            errors.push(FieldError::new(
                "messages",
                format!("must contain between 1 and {} entries", MAX_MESSAGES),
            ));
        }

        let mut messages = Vec::with_capacity(self.messages.len());
        for (index, incoming) in self.messages.iter().enumerate() {
            let role = match incoming.role.as_str() {
                "user" => Some(Role::User),
                "assistant" => Some(Role::Assistant),
                _ => {
                    errors.push(FieldError::new(
                        format!("messages[{}].role", index),
                        "must be \"user\" or \"assistant\"",
                    ));
                    None
                }
            };

            let content_chars = incoming.content.chars().count();
            if content_chars == 0 || content_chars > MAX_MESSAGE_CHARS {
                errors.push(FieldError::new(
                    format!("messages[{}].content", index),
                    format!("must be between 1 and {} characters", MAX_MESSAGE_CHARS),
                ));
            }

            if let Some(role) = role {
                messages.push(Message {
                    role,
                    content: incoming.content.clone(),
                });
            }
        }

        if let Some(last) = self.messages.last() {
            if last.role != "user" {
                errors.push(FieldError::new("messages", "last message must have role \"user\""));
            }
        }

        let max_output_tokens = self.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS as i64);
        if !(1..=MAX_OUTPUT_TOKENS_LIMIT).contains(&max_output_tokens) {
            errors.push(FieldError::new(
                "max_output_tokens",
                format!("must be between 1 and {}", MAX_OUTPUT_TOKENS_LIMIT),
            ));
        }

        if !errors.is_empty() {
            return Err(ApiError::ValidationFailed(errors));
        }

        Ok(Conversation {
            messages,
            max_output_tokens: max_output_tokens as u32,
            locale: self.locale.unwrap_or_else(|| "en".to_string()),
        })
    }
}
