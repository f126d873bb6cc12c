use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One chunk row joined with its owning document, scored by cosine
/// distance against the query embedding. Chunks without an embedding
/// never appear here; the search predicate excludes them.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScoredChunkRow {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub section_title: Option<String>,
    pub document_title: Option<String>,
    pub source_file: Option<String>,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    /// Cosine distance in [0, 1] for L2-normalized vectors.
    pub distance: f64,
}
