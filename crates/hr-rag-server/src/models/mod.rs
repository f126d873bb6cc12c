pub mod requests;
pub mod responses;

pub use requests::{ChatRequest, Conversation, Message, RetrieveRequest, Role, SearchSpec};
