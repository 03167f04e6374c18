use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::extraction::ExtractionSettings;
use crate::llm_client::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::retry::RetryPolicy;
use crate::screening::batch::BatchSettings;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub scoring_model: String,
    pub model_cache_ttl: Duration,
    /// HTTP OCR service for scanned PDFs.
    pub optical_service_url: Option<String>,
    /// Use the vision-capable model for OCR when no optical service is configured.
    pub optical_vision_fallback: bool,
    /// Structured-document converter for office formats.
    pub conversion_service_url: Option<String>,
    pub extraction: ExtractionSettings,
    pub validation_min_chars: usize,
    pub batch: BatchSettings,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let batch = BatchSettings {
            chunk_size: env_or("BATCH_CHUNK_SIZE", 5)?,
            concurrency: env_or("BATCH_CONCURRENCY", 2)?,
            inter_group_delay: Duration::from_millis(env_or("BATCH_INTER_GROUP_DELAY_MS", 300)?),
            retry: RetryPolicy {
                max_attempts: env_or("BATCH_MAX_ATTEMPTS", 3)?,
                base_delay: Duration::from_millis(env_or("BATCH_RETRY_BASE_DELAY_MS", 500)?),
                jitter: env_or("BATCH_RETRY_JITTER", false)?,
            },
            aggregate_chunks: env_or("BATCH_AGGREGATE_CHUNKS", true)?,
        };
        check_batch(&batch)?;

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            anthropic_base_url: optional_env("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            scoring_model: optional_env("SCORING_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            model_cache_ttl: Duration::from_secs(env_or("MODEL_CACHE_TTL_SECS", 3600)?),
            optical_service_url: optional_env("OPTICAL_SERVICE_URL"),
            optical_vision_fallback: env_or("OPTICAL_VISION_FALLBACK", false)?,
            conversion_service_url: optional_env("CONVERSION_SERVICE_URL"),
            extraction: ExtractionSettings {
                min_direct_chars: env_or("EXTRACTION_MIN_DIRECT_CHARS", 50)?,
                min_office_chars: env_or("EXTRACTION_MIN_OFFICE_CHARS", 100)?,
            },
            validation_min_chars: env_or("VALIDATION_MIN_CHARS", 200)?,
            batch,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn check_batch(batch: &BatchSettings) -> Result<()> {
    if batch.chunk_size == 0 {
        bail!("BATCH_CHUNK_SIZE must be at least 1");
    }
    if batch.concurrency == 0 {
        bail!("BATCH_CONCURRENCY must be at least 1");
    }
    if batch.retry.max_attempts == 0 {
        bail!("BATCH_MAX_ATTEMPTS must be at least 1");
    }
    Ok(())
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Set and non-blank, otherwise `None`.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
