use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::llm_client::model_cache::ModelCatalogCache;
use crate::llm_client::LlmClient;
use crate::screening::batch::BatchOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub llm: LlmClient,
    pub config: Config,
    /// Extraction, validation and scoring pipeline shared by every batch request.
    pub orchestrator: Arc<BatchOrchestrator>,
    /// Provider model catalog; refreshed by handlers when stale.
    pub model_cache: Arc<Mutex<ModelCatalogCache>>,
}
