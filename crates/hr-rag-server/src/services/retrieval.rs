use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::{ScoredChunkRow, VectorStore};
use crate::models::requests::SearchSpec;
use crate::services::embedding::{Embedder, EMBEDDING_DIMENSION};
use crate::services::probe::ProbeCache;
use crate::utils::error::ApiError;
use crate::utils::timeouts;

/// One ranked passage: chunk plus owning-document fields and the
/// similarity derived from the store's cosine distance.
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub section_title: Option<String>,
    pub document_title: Option<String>,
    pub source_file: Option<String>,
    pub similarity: f32,
}

/// The store reports cosine *distance*; callers think in similarity.
/// Clamped so float drift can never leak values outside [0, 1].
pub fn similarity_from_distance(distance: f64) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0) as f32
}

fn passage_from_row(row: ScoredChunkRow) -> RetrievedPassage {
    RetrievedPassage {
        chunk_id: row.chunk_id,
        document_id: row.document_id,
        chunk_index: row.chunk_index,
        content: row.content,
        section_title: row.section_title,
        document_title: row.document_title,
        source_file: row.source_file,
        similarity: similarity_from_distance(row.distance),
    }
}

/// Query → embedding → top-k cosine search, with per-collaborator
/// timeouts and error mapping.
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    probes: Arc<ProbeCache>,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, probes: Arc<ProbeCache>) -> Self {
        Self {
            embedder,
            store,
            probes,
        }
    }

    /// Execute a validated search. An empty result is a successful
    /// retrieval; the no-context fallback is the caller's concern.
    pub async fn search(&self, spec: &SearchSpec) -> Result<Vec<RetrievedPassage>, ApiError> {
        let query_vec = self.embed_query(&spec.query).await?;

        let rows = timeouts::bounded(timeouts::DB_READ, "vector search", async {
            self.store
                .search(&query_vec, spec.top_k, spec.document_id)
                .await
                .map_err(|e| {
                    warn!("vector search failed: {}", e);
                    ApiError::Internal(e)
                })
        })
        .await?;

        // The store already sorted ascending by distance; keep its order.
        let passages: Vec<RetrievedPassage> = rows
            .into_iter()
            .map(passage_from_row)
            .filter(|passage| passage.similarity >= spec.min_similarity)
            .collect();

        debug!(
            "retrieval kept {} of top-{} passages above {:.2}",
            passages.len(),
            spec.top_k,
            spec.min_similarity
        );

        Ok(passages)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, ApiError> {
        let texts = [query.to_string()];
        let embeddings = match tokio::time::timeout(timeouts::EMBEDDING, self.embedder.embed(&texts)).await
        {
            Ok(Ok(embeddings)) => embeddings,
            Ok(Err(e)) => {
                warn!("embedding generation failed: {}", e);
                self.probes.record_embedder(false);
                return Err(ApiError::ServiceUnavailable("embedding provider"));
            }
            Err(_) => {
                self.probes.record_embedder(false);
                return Err(ApiError::GatewayTimeout("embedding generation"));
            }
        };

        let query_vec = embeddings.into_iter().next().unwrap_or_default();
        if query_vec.len() != EMBEDDING_DIMENSION {
            warn!("embedder returned a {}-dimensional vector", query_vec.len());
            self.probes.record_embedder(false);
            return Err(ApiError::ServiceUnavailable("embedding provider"));
        }

        self.probes.record_embedder(true);
        Ok(query_vec)
    }
}
