use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Every corpus and query vector has exactly this many dimensions.
pub const EMBEDDING_DIMENSION: usize = 1536;

/// Query-embedding provider. Output vectors are assumed L2-normalized,
/// which keeps cosine distance inside [0, 1].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedder over the standard `/v1/embeddings` wire format.
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!("generating embeddings for {} texts with {}", texts.len(), self.model);

        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let url = format!("{}/v1/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("failed to reach the embedding endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("embedding endpoint returned {}", response.status());
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .context("failed to parse embedding response")?;

        if body.data.len() != texts.len() {
            anyhow::bail!(
                "embedding count mismatch: sent {}, got {}",
                texts.len(),
                body.data.len()
            );
        }

        let mut vectors = Vec::with_capacity(body.data.len());
        for item in body.data {
            if item.embedding.len() != EMBEDDING_DIMENSION {
                anyhow::bail!(
                    "embedding dimension mismatch: expected {}, got {}",
                    EMBEDDING_DIMENSION,
                    item.embedding.len()
                );
            }
            vectors.push(item.embedding);
        }

        Ok(vectors)
    }
}
