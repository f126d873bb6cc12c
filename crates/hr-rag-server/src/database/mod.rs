pub mod models;
pub mod pool;
pub mod repository;

pub use models::ScoredChunkRow;
pub use pool::DbPool;
pub use repository::{PgVectorStore, VectorStore};
