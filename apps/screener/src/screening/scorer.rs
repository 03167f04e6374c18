//! Candidate scoring: pluggable, trait-based scorer that rates CV text against a
//! job description.
//!
//! `LlmCandidateScorer` is the production backend. The batch orchestrator only
//! sees `Arc<dyn CandidateScorer>`, so tests swap in counting fakes.
//!
//! Scorers make exactly one provider call per method invocation. Retrying is the
//! orchestrator's job.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::llm_client::{LlmClient, LlmError};
use crate::screening::models::{ScoringRequest, ScoringResult};
use crate::screening::parser::{parse_batch_reply, parse_scoring_reply};
use crate::screening::prompts::{batch_scoring_prompt, scoring_prompt, SCORING_SYSTEM};

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring request failed: {0}")]
    Transport(#[from] LlmError),

    #[error("aggregated reply unusable: {0}")]
    MalformedBatch(String),
}

impl ScoringError {
    /// Client errors (bad request, auth, unknown model) will fail the same way
    /// again. Timeouts, rate limits, server errors and network failures may not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScoringError::Transport(e) => match e.status() {
                Some(408) | Some(429) => true,
                Some(status) => !(400..500).contains(&status),
                None => true,
            },
            ScoringError::MalformedBatch(_) => true,
        }
    }
}

#[async_trait]
pub trait CandidateScorer: Send + Sync {
    /// Scores one candidate. A reply that cannot be decoded still yields a
    /// (degraded) result; only transport failures are errors.
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResult, ScoringError>;

    /// Scores several candidates in one request. Entry `i` of the returned vector
    /// belongs to `candidate_texts[i]` and is `None` when the reply left it out.
    async fn score_batch(
        &self,
        job_description: &str,
        model: &str,
        candidate_texts: &[String],
    ) -> Result<Vec<Option<ScoringResult>>, ScoringError>;
}

pub struct LlmCandidateScorer {
    llm: LlmClient,
}

impl LlmCandidateScorer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CandidateScorer for LlmCandidateScorer {
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResult, ScoringError> {
        let prompt = scoring_prompt(&request.job_description, &request.candidate_text);
        let raw = self
            .llm
            .call_text(&request.model, &prompt, SCORING_SYSTEM)
            .await?;

        let result = parse_scoring_reply(&raw);
        debug!(
            "scored candidate: score={} raw_score={} degraded={}",
            result.score, result.raw_score, result.degraded
        );
        Ok(result)
    }

    async fn score_batch(
        &self,
        job_description: &str,
        model: &str,
        candidate_texts: &[String],
    ) -> Result<Vec<Option<ScoringResult>>, ScoringError> {
        let prompt = batch_scoring_prompt(job_description, candidate_texts);
        let raw = self.llm.call_text(model, &prompt, SCORING_SYSTEM).await?;

        let entries = parse_batch_reply(&raw, candidate_texts.len())
            .map_err(ScoringError::MalformedBatch)?;
        Ok(collate(entries, candidate_texts.len()))
    }
}

/// Places indexed results into a vector of exactly `expected` slots.
fn collate(entries: Vec<(usize, ScoringResult)>, expected: usize) -> Vec<Option<ScoringResult>> {
    let mut slots: Vec<Option<ScoringResult>> = vec![None; expected];
    for (index, result) in entries {
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(result);
        }
    }
    slots
}
