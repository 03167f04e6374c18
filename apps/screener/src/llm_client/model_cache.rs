//! Provider model catalog cached with an explicit timestamp and TTL.
//!
//! The cache never refreshes itself: callers ask `get(now)` and, on a miss, fetch
//! through `LlmClient::list_models` and hand the result back via `store`.

use std::time::Duration;

use tokio::time::Instant;

use crate::llm_client::ModelInfo;

#[derive(Debug, Clone)]
pub struct ModelCatalogCache {
    entry: Option<CachedCatalog>,
    ttl: Duration,
}

#[derive(Debug, Clone)]
struct CachedCatalog {
    models: Vec<ModelInfo>,
    fetched_at: Instant,
}

impl ModelCatalogCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    /// Returns the cached catalog if it was fetched less than `ttl` before `now`.
    pub fn get(&self, now: Instant) -> Option<&[ModelInfo]> {
        self.entry
            .as_ref()
            .filter(|e| now.saturating_duration_since(e.fetched_at) < self.ttl)
            .map(|e| e.models.as_slice())
    }

    pub fn store(&mut self, models: Vec<ModelInfo>, now: Instant) {
        self.entry = Some(CachedCatalog {
            models,
            fetched_at: now,
        });
    }

    /// Drops the entry if it was fetched at least `min_age` before `now`. Returns
    /// whether it was dropped; a younger entry is kept so callers can't force a
    /// refetch on every request.
    pub fn invalidate_older_than(&mut self, min_age: Duration, now: Instant) -> bool {
        let stale = self
            .entry
            .as_ref()
            .is_some_and(|e| now.saturating_duration_since(e.fetched_at) >= min_age);
        if stale {
            self.entry = None;
        }
        stale
    }

    /// Whether a fresh catalog lists `model_id`. `None` when there is no fresh catalog.
    pub fn contains(&self, model_id: &str, now: Instant) -> Option<bool> {
        self.get(now).map(|models| models.iter().any(|m| m.id == model_id))
    }
}
