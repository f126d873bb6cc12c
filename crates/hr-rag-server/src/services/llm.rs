use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::requests::Message;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model provider unreachable: {0}")]
    Unavailable(String),

    #[error("completion was content-filtered")]
    ContentFiltered,

    #[error("model stream failed: {0}")]
    Stream(String),
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Streaming chat model. Dropping the returned stream cancels the
/// in-flight completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        max_output_tokens: u32,
    ) -> Result<TokenStream, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Chat model over the streaming `/v1/chat/completions` SSE wire format.
pub struct OpenAiChat {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            // No overall client timeout: long streams are legitimate. The
            // caller bounds the initial response and per-token idle time.
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        max_output_tokens: u32,
    ) -> Result<TokenStream, LlmError> {
        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        wire_messages.push(WireMessage {
            role: "system",
            content: system,
        });
        for message in messages {
            wire_messages.push(WireMessage {
                role: message.role.as_str(),
                content: &message.content,
            });
        }

        debug!("starting chat stream with {} messages", wire_messages.len());

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: wire_messages,
            max_tokens: max_output_tokens,
            temperature: 0.2,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Unavailable(format!(
                "chat endpoint returned {}",
                response.status()
            )));
        }

        let mut bytes = Box::pin(response.bytes_stream());

        let parsed = stream! {
            let mut buffer = String::new();
            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(LlmError::Stream(e.to_string()));
                        break 'outer;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if payload == "[DONE]" {
                        break 'outer;
                    }
                    let Ok(parsed) = serde_json::from_str::<ChatCompletionChunk>(payload) else {
                        continue;
                    };
                    let Some(choice) = parsed.choices.first() else {
                        continue;
                    };
                    if choice.finish_reason.as_deref() == Some("content_filter") {
                        yield Err(LlmError::ContentFiltered);
                        break 'outer;
                    }
                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty() {
                            yield Ok(content.clone());
                        }
                    }
                }
            }
        };

        Ok(Box::pin(parsed))
    }
}
