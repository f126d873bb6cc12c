use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use pgvector::Vector;
use tracing::debug;
use uuid::Uuid;

use super::{DbPool, ScoredChunkRow};

/// Persistent vector index over the ingested corpus. Results come back
/// sorted ascending by cosine distance; chunks with an absent embedding
/// are skipped by the store itself.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        document_id: Option<Uuid>,
    ) -> Result<Vec<ScoredChunkRow>>;

    /// Trivial read against the store; returns the observed latency.
    async fn ping(&self) -> Result<u64>;

    async fn has_vector_extension(&self) -> Result<bool>;
}

pub struct PgVectorStore {
    pool: DbPool,
}

impl PgVectorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        document_id: Option<Uuid>,
    ) -> Result<Vec<ScoredChunkRow>> {
        let vector = Vector::from(query.to_vec());

        let rows = sqlx::query_as::<_, ScoredChunkRow>(
            r#"SELECT
                c.id AS chunk_id,
                c.document_id,
                c.chunk_index,
                c.content,
                c.section_title,
                d.title AS document_title,
                d.source_file,
                d.checksum,
                d.created_at,
                (c.embedding <=> $1)::float8 AS distance
               FROM chunks c
               JOIN documents d ON d.id = c.document_id
               WHERE c.embedding IS NOT NULL
                 AND ($2::uuid IS NULL OR c.document_id = $2)
               ORDER BY c.embedding <=> $1
               LIMIT $3"#,
        )
        .bind(vector)
        .bind(document_id)
        .bind(top_k as i64)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("vector search returned {} chunks", rows.len());

        Ok(rows)
    }

    async fn ping(&self) -> Result<u64> {
        let start = Instant::now();
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.pool.get_pool())
            .await?;
        Ok(start.elapsed().as_millis() as u64)
    }

    async fn has_vector_extension(&self) -> Result<bool> {
        let present = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'vector')",
        )
        .fetch_one(self.pool.get_pool())
        .await?;
        Ok(present)
    }
}
