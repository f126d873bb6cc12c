use std::sync::Arc;

use crate::config::Settings;
use crate::database::VectorStore;
use crate::security::SlidingWindowLimiter;
use crate::services::{ChatOrchestrator, ProbeCache, RetrievalService};
use crate::utils::metrics::MetricsRegistry;

/// Application state shared across handlers. Everything here is either
/// immutable after startup or internally synchronized.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn VectorStore>,
    pub retrieval: Arc<RetrievalService>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub rate_limiter: Arc<SlidingWindowLimiter>,
    pub metrics: Arc<MetricsRegistry>,
    pub probes: Arc<ProbeCache>,
}
