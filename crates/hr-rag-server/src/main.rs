use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hr_rag_server::config::{AppEnv, Settings};
use hr_rag_server::database::{DbPool, PgVectorStore};
use hr_rag_server::http;
use hr_rag_server::security::SlidingWindowLimiter;
use hr_rag_server::services::{
    ChatOrchestrator, OpenAiChat, OpenAiEmbedder, ProbeCache, RetrievalService,
};
use hr_rag_server::state::AppState;
use hr_rag_server::utils::metrics::MetricsRegistry;

const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_BIND_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    init_tracing(settings.app_env);
    info!("starting HR knowledge-base RAG service");

    let db_pool = match DbPool::new(&settings.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("failed to connect to the database: {:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    info!("database connection established");

    let state = build_state(settings.clone(), db_pool);
    let app = http::build_router(state);

    let addr = match settings.host.parse::<std::net::IpAddr>() {
        Ok(ip) => SocketAddr::from((ip, settings.port)),
        Err(e) => {
            error!("invalid HOST setting: {}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {}: {}", addr, e);
            return ExitCode::from(EXIT_BIND_FAILURE);
        }
    };
    info!("listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    match served {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("server error: {}", e);
            ExitCode::from(EXIT_BIND_FAILURE)
        }
    }
}

fn build_state(settings: Settings, db_pool: DbPool) -> AppState {
    let settings = Arc::new(settings);

    let store = Arc::new(PgVectorStore::new(db_pool));
    let embedder = Arc::new(OpenAiEmbedder::new(
        settings.openai_base_url.clone(),
        settings.openai_api_key.clone(),
        settings.embedding_model.clone(),
    ));
    let model = Arc::new(OpenAiChat::new(
        settings.openai_base_url.clone(),
        settings.openai_api_key.clone(),
        settings.llm_model.clone(),
    ));

    let probes = Arc::new(ProbeCache::new());
    let retrieval = Arc::new(RetrievalService::new(embedder, store.clone(), probes.clone()));
    let orchestrator = Arc::new(ChatOrchestrator::new(retrieval.clone(), model));

    AppState {
        settings,
        store,
        retrieval,
        orchestrator,
        rate_limiter: Arc::new(SlidingWindowLimiter::new()),
        metrics: Arc::new(MetricsRegistry::new()),
        probes,
    }
}

fn init_tracing(env: AppEnv) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hr_rag_server=debug"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if env == AppEnv::Production {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install the shutdown handler: {}", e);
    }
}
