mod config;
mod errors;
mod extraction;
mod llm_client;
mod retry;
mod routes;
mod screening;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::extraction::conversion::HttpDocumentConverter;
use crate::extraction::optical::{HttpOpticalExtractor, VisionOpticalExtractor};
use crate::extraction::strategy::ExtractionStrategy;
use crate::extraction::DocumentExtractor;
use crate::llm_client::model_cache::ModelCatalogCache;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::screening::batch::BatchOrchestrator;
use crate::screening::scorer::LlmCandidateScorer;
use crate::screening::validation::ContentValidator;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting screener v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = LlmClient::new(
        config.anthropic_api_key.clone(),
        Some(config.anthropic_base_url.clone()),
    );
    info!("LLM client initialized (scoring model: {})", config.scoring_model);

    // Extraction tiers: local parsers always, network tiers when configured
    let extractor = DocumentExtractor::new(
        &config.extraction,
        optical_strategy(&config, &llm),
        conversion_strategy(&config),
    );

    let orchestrator = BatchOrchestrator::new(
        Arc::new(extractor),
        ContentValidator::new(config.validation_min_chars),
        Arc::new(LlmCandidateScorer::new(llm.clone())),
        config.batch.clone(),
    );
    info!(
        "Batch settings: chunk size {}, {} chunks in flight, {} attempts per candidate",
        config.batch.chunk_size, config.batch.concurrency, config.batch.retry.max_attempts
    );

    // Build app state
    let state = AppState {
        llm,
        model_cache: Arc::new(Mutex::new(ModelCatalogCache::new(config.model_cache_ttl))),
        orchestrator: Arc::new(orchestrator),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict origins once the frontend host is fixed
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The OCR tier for scanned PDFs: the HTTP service when configured, otherwise the
/// vision-capable scoring model if enabled, otherwise none.
fn optical_strategy(config: &Config, llm: &LlmClient) -> Option<Arc<dyn ExtractionStrategy>> {
    if let Some(url) = &config.optical_service_url {
        info!("Optical extraction via service at {url}");
        return Some(Arc::new(HttpOpticalExtractor::new(url.clone())));
    }
    if config.optical_vision_fallback {
        info!("Optical extraction via vision model {}", config.scoring_model);
        return Some(Arc::new(VisionOpticalExtractor::new(
            llm.clone(),
            config.scoring_model.clone(),
        )));
    }
    info!("No optical extraction configured; scanned PDFs will need manual text entry");
    None
}

fn conversion_strategy(config: &Config) -> Option<Arc<dyn ExtractionStrategy>> {
    config.conversion_service_url.as_ref().map(|url| {
        info!("Office conversion via service at {url}");
        Arc::new(HttpDocumentConverter::new(url.clone())) as Arc<dyn ExtractionStrategy>
    })
}
