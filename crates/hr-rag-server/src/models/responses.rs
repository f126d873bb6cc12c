use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::services::retrieval::RetrievedPassage;
use crate::utils::metrics::BucketSnapshot;

/// One ranked passage in the retrieval response.
#[derive(Debug, Serialize)]
pub struct RetrieveResult {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub section_title: Option<String>,
    pub document_title: Option<String>,
    pub source_file: Option<String>,
    pub similarity: f32,
}

impl From<RetrievedPassage> for RetrieveResult {
    fn from(passage: RetrievedPassage) -> Self {
        Self {
            chunk_id: passage.chunk_id,
            document_id: passage.document_id,
            chunk_index: passage.chunk_index,
            content: passage.content,
            section_title: passage.section_title,
            document_title: passage.document_title,
            source_file: passage.source_file,
            similarity: passage.similarity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub results: Vec<RetrieveResult>,
    pub total: usize,
    pub request_id: String,
}

/// Retrieval artifact attached to a debug chat response.
#[derive(Debug, Serialize)]
pub struct RetrievedDoc {
    pub chunk_id: Uuid,
    pub content: String,
    pub similarity: f32,
    pub source_file: Option<String>,
    pub document_title: Option<String>,
}

impl From<RetrievedPassage> for RetrievedDoc {
    fn from(passage: RetrievedPassage) -> Self {
        Self {
            chunk_id: passage.chunk_id,
            content: passage.content,
            similarity: passage.similarity,
            source_file: passage.source_file,
            document_title: passage.document_title,
        }
    }
}

/// Materialized chat answer, returned when `?debug=1` is set.
#[derive(Debug, Serialize)]
pub struct ChatDebugResponse {
    pub answer: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub retrieved_docs: Vec<RetrievedDoc>,
}

/// Incremental fragment on the chat token stream.
#[derive(Debug, Serialize)]
pub struct MessageChunk {
    pub delta: String,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub endpoints: std::collections::BTreeMap<&'static str, BucketSnapshot>,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}
