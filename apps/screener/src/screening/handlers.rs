use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::extraction::CandidateDocument;
use crate::llm_client::{LlmError, ModelInfo};
use crate::screening::batch::{BatchJob, BatchReport};
use crate::state::AppState;

/// Largest single CV accepted.
const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
/// A catalog younger than this is trusted even when it lacks a requested model.
const MIN_CATALOG_REFRESH: Duration = Duration::from_secs(60);

#[derive(Serialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelInfo>,
    pub default_model: String,
}

/// GET /api/v1/models
pub async fn handle_list_models(
    State(state): State<AppState>,
) -> Result<Json<ModelListResponse>, AppError> {
    let models = cached_models(&state).await?;
    Ok(Json(ModelListResponse {
        models,
        default_model: state.config.scoring_model.clone(),
    }))
}

/// POST /api/v1/screening/batch
///
/// Multipart fields: `job_description` (text), optional `model` (text) and any
/// number of CV files. Unsupported files fail the whole request before any
/// candidate is processed.
pub async fn handle_screen_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchReport>, AppError> {
    let mut job_description = String::new();
    let mut requested_model: Option<String> = None;
    let mut candidates = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "job_description" => {
                job_description = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("unreadable job_description: {e}")))?;
            }
            "model" => {
                let model = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("unreadable model: {e}")))?;
                requested_model = Some(model.trim().to_string()).filter(|m| !m.is_empty());
            }
            _ => {
                let Some(filename) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let media_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("{filename}: upload failed: {e}")))?;
                if bytes.len() > MAX_FILE_BYTES {
                    return Err(AppError::Validation(format!(
                        "{filename}: file too large (maximum {} MB)",
                        MAX_FILE_BYTES / (1024 * 1024)
                    )));
                }
                let document = CandidateDocument::new(filename.clone(), media_type, bytes)
                    .map_err(|e| AppError::UnsupportedDocument(format!("{filename}: {e}")))?;
                candidates.push(document);
            }
        }
    }

    let model = resolve_model(&state, requested_model).await?;
    info!(
        "screening request: {} candidates, model {model}",
        candidates.len()
    );

    let mut job = BatchJob::new(job_description, model, candidates);
    let report = state.orchestrator.run(&mut job, None, None).await?;
    Ok(Json(report))
}

/// Model catalog from the cache, refreshed from the provider when stale. The lock
/// is not held across the provider call.
async fn cached_models(state: &AppState) -> Result<Vec<ModelInfo>, LlmError> {
    if let Some(models) = state.model_cache.lock().await.get(Instant::now()) {
        return Ok(models.to_vec());
    }

    let models = state.llm.list_models().await?;
    info!("model catalog refreshed: {} models", models.len());
    state
        .model_cache
        .lock()
        .await
        .store(models.clone(), Instant::now());
    Ok(models)
}

/// Picks the model for a batch. A requested model must appear in the provider's
/// catalog; when the catalog cannot be fetched the request is trusted as-is.
async fn resolve_model(state: &AppState, requested: Option<String>) -> Result<String, AppError> {
    let Some(requested) = requested else {
        return Ok(state.config.scoring_model.clone());
    };
    if requested == state.config.scoring_model {
        return Ok(requested);
    }

    let listed = {
        let mut cache = state.model_cache.lock().await;
        let now = Instant::now();
        match cache.contains(&requested, now) {
            // the cached catalog may predate the model
            Some(false) if cache.invalidate_older_than(MIN_CATALOG_REFRESH, now) => None,
            listed => listed,
        }
    };
    match listed {
        Some(true) => return Ok(requested),
        Some(false) => return Err(unknown_model(&requested)),
        None => {}
    }

    match cached_models(state).await {
        Ok(models) if models.iter().any(|m| m.id == requested) => Ok(requested),
        Ok(_) => Err(unknown_model(&requested)),
        Err(e) => {
            warn!("model catalog unavailable ({e}), using requested model '{requested}' unchecked");
            Ok(requested)
        }
    }
}

fn unknown_model(requested: &str) -> AppError {
    AppError::Validation(format!("unknown model '{requested}'"))
}
