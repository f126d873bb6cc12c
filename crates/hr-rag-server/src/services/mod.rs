pub mod embedding;
pub mod llm;
pub mod orchestrator;
pub mod probe;
pub mod prompt;
pub mod retrieval;

pub use embedding::{Embedder, OpenAiEmbedder};
pub use llm::{ChatModel, OpenAiChat};
pub use orchestrator::ChatOrchestrator;
pub use probe::ProbeCache;
pub use retrieval::RetrievalService;
