//! Batch orchestration: many CVs against one job description.
//!
//! Candidates are cut into fixed-size chunks and at most `concurrency` chunks are
//! in flight at once, all driven from a single task through `FuturesUnordered`.
//! Inside a chunk every candidate is extracted and validated; the ones worth
//! scoring go out in one aggregated request, and whatever that request does not
//! cover is scored one by one under the retry policy.
//!
//! Per-candidate failures become data on the candidate's outcome. The only errors
//! `run` returns are setup errors raised before any work starts, and the result
//! list always has one entry per submitted candidate, ordered by input position.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::extraction::{CandidateDocument, DocumentExtractor, ExtractionMethod};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::screening::models::{
    CandidateOutcome, CandidateStatus, ScoringRequest, ScoringResult,
};
use crate::screening::scorer::{CandidateScorer, ScoringError};
use crate::screening::validation::ContentValidator;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("a job description is required")]
    MissingJobDescription,

    #[error("no candidates were submitted")]
    NoCandidates,
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub chunk_size: usize,
    /// Chunks in flight at once.
    pub concurrency: usize,
    /// Wait before each chunk dispatched after the first window.
    pub inter_group_delay: Duration,
    /// Per-candidate retry policy for individual scoring.
    pub retry: RetryPolicy,
    /// Try one multi-candidate request per chunk before scoring individually.
    pub aggregate_chunks: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            concurrency: 2,
            inter_group_delay: Duration::from_millis(300),
            retry: RetryPolicy::default(),
            aggregate_chunks: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    /// Setup error; no candidate was processed.
    Failed,
}

/// One batch run's inputs and live progress.
pub struct BatchJob {
    pub job_description: String,
    pub model: String,
    pub candidates: Vec<CandidateDocument>,
    pub state: BatchState,
    /// Parallel to `candidates`.
    pub statuses: Vec<CandidateStatus>,
    /// Candidates whose outcome is final.
    pub completed: usize,
}

impl BatchJob {
    pub fn new(
        job_description: impl Into<String>,
        model: impl Into<String>,
        candidates: Vec<CandidateDocument>,
    ) -> Self {
        let statuses = vec![CandidateStatus::Pending; candidates.len()];
        Self {
            job_description: job_description.into(),
            model: model.into(),
            candidates,
            state: BatchState::Idle,
            statuses,
            completed: 0,
        }
    }

    fn check_setup(&self) -> Result<(), BatchError> {
        if self.job_description.trim().is_empty() {
            return Err(BatchError::MissingJobDescription);
        }
        if self.candidates.is_empty() {
            return Err(BatchError::NoCandidates);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Candidates that went through the pipeline (cancelled ones excluded).
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub avg_ms_per_candidate: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<CandidateOutcome>,
    pub summary: BatchSummary,
}

/// Progress callback: (completed, total, status message).
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize, Option<&str>) + Send + Sync);

/// A candidate that passed validation and is waiting for a score.
struct ScorableCandidate<'a> {
    index: usize,
    doc: &'a CandidateDocument,
    text: String,
    method: ExtractionMethod,
    warning: Option<String>,
}

impl ScorableCandidate<'_> {
    fn into_outcome(
        self,
        status: CandidateStatus,
        result: ScoringResult,
        error: Option<String>,
        attempts: u32,
    ) -> CandidateOutcome {
        CandidateOutcome {
            index: self.index,
            candidate_id: self.doc.id,
            filename: self.doc.filename.clone(),
            status,
            result,
            error,
            warning: self.warning,
            extraction_method: self.method,
            attempts,
        }
    }
}

enum Prepared<'a> {
    Scorable(ScorableCandidate<'a>),
    Finished(CandidateOutcome),
}

pub struct BatchOrchestrator {
    extractor: Arc<DocumentExtractor>,
    validator: ContentValidator,
    scorer: Arc<dyn CandidateScorer>,
    settings: BatchSettings,
}

impl BatchOrchestrator {
    pub fn new(
        extractor: Arc<DocumentExtractor>,
        validator: ContentValidator,
        scorer: Arc<dyn CandidateScorer>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            extractor,
            validator,
            scorer,
            settings,
        }
    }

    /// Runs the whole batch. `cancel` is checked before each chunk is dispatched;
    /// chunks already in flight always finish.
    pub async fn run(
        &self,
        job: &mut BatchJob,
        progress: Option<ProgressFn<'_>>,
        cancel: Option<&AtomicBool>,
    ) -> Result<BatchReport, BatchError> {
        if let Err(e) = job.check_setup() {
            job.state = BatchState::Failed;
            warn!("batch rejected before dispatch: {e}");
            return Err(e);
        }

        let started = Instant::now();
        let started_at = Utc::now();
        let total = job.candidates.len();
        let chunk_size = self.settings.chunk_size.max(1);
        let concurrency = self.settings.concurrency.max(1);

        job.state = BatchState::Running;
        job.statuses = vec![CandidateStatus::Pending; total];
        job.completed = 0;
        info!(
            "batch started: {total} candidates, chunk size {chunk_size}, {concurrency} chunks in flight, model {}",
            job.model
        );

        let BatchJob {
            job_description,
            model,
            candidates,
            state,
            statuses,
            completed,
        } = &mut *job;
        let (job_description, model) = (job_description.as_str(), model.as_str());

        let indexed: Vec<(usize, &CandidateDocument)> = candidates.iter().enumerate().collect();
        let mut chunks = indexed.chunks(chunk_size).enumerate();
        let mut in_flight = FuturesUnordered::new();
        let mut results: Vec<CandidateOutcome> = Vec::with_capacity(total);

        loop {
            while in_flight.len() < concurrency {
                if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
                    break;
                }
                let Some((chunk_no, chunk)) = chunks.next() else {
                    break;
                };
                for (index, _) in chunk {
                    statuses[*index] = CandidateStatus::Processing;
                }
                let delay = if chunk_no >= concurrency {
                    self.settings.inter_group_delay
                } else {
                    Duration::ZERO
                };
                in_flight.push(self.process_chunk(chunk_no, chunk, job_description, model, delay));
            }

            let Some(outcomes) = in_flight.next().await else {
                break;
            };
            for outcome in &outcomes {
                statuses[outcome.index] = outcome.status;
            }
            *completed += outcomes.len();
            results.extend(outcomes);

            if let Some(report) = progress {
                let message = format!("Scored {completed} of {total} candidates");
                report(*completed, total, Some(message.as_str()));
            }
        }

        let processed = *completed;
        if processed < total {
            warn!("batch cancelled: {} candidates not dispatched", total - processed);
            for (index, doc) in candidates.iter().enumerate() {
                if statuses[index] == CandidateStatus::Pending {
                    statuses[index] = CandidateStatus::Failed;
                    results.push(cancelled_outcome(index, doc));
                }
            }
        }

        results.sort_by_key(|o| o.index);
        *state = BatchState::Completed;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let succeeded = results
            .iter()
            .filter(|o| o.status == CandidateStatus::Success)
            .count();
        let summary = BatchSummary {
            total,
            processed,
            succeeded,
            failed: total - succeeded,
            elapsed_ms,
            avg_ms_per_candidate: elapsed_ms / processed.max(1) as u64,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            "batch finished: {}/{} succeeded in {}ms ({}ms per candidate)",
            summary.succeeded, summary.total, summary.elapsed_ms, summary.avg_ms_per_candidate
        );

        Ok(BatchReport { results, summary })
    }

    async fn process_chunk(
        &self,
        chunk_no: usize,
        chunk: &[(usize, &CandidateDocument)],
        job_description: &str,
        model: &str,
        delay: Duration,
    ) -> Vec<CandidateOutcome> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        debug!("chunk {chunk_no}: processing {} candidates", chunk.len());

        let prepared = join_all(chunk.iter().map(|(index, doc)| self.prepare(*index, *doc))).await;

        let mut outcomes = Vec::with_capacity(chunk.len());
        let mut pending = Vec::new();
        for item in prepared {
            match item {
                Prepared::Scorable(candidate) => pending.push(candidate),
                Prepared::Finished(outcome) => outcomes.push(outcome),
            }
        }

        if self.settings.aggregate_chunks && pending.len() > 1 {
            pending = self
                .score_aggregated(chunk_no, pending, job_description, model, &mut outcomes)
                .await;
        }

        let individual = join_all(
            pending
                .into_iter()
                .map(|candidate| self.score_individually(candidate, job_description, model)),
        )
        .await;
        outcomes.extend(individual);

        let ok = outcomes
            .iter()
            .filter(|o| o.status == CandidateStatus::Success)
            .count();
        info!("chunk {chunk_no} finished: {ok}/{} succeeded", outcomes.len());
        outcomes
    }

    /// Extracts and validates one candidate. Rejected content never reaches the
    /// scorer.
    async fn prepare<'a>(&self, index: usize, doc: &'a CandidateDocument) -> Prepared<'a> {
        let extraction = self.extractor.extract(doc).await;
        if extraction.is_failure() {
            debug!(
                "{}: no usable text after {}",
                doc.filename,
                extraction.attempted.join(", ")
            );
        }
        let verdict = self.validator.validate(&extraction.text, &doc.filename);

        if !verdict.valid {
            let reason = verdict
                .reason
                .unwrap_or_else(|| format!("'{}' was rejected", doc.filename));
            info!("{}: not scored: {reason}", doc.filename);
            return Prepared::Finished(CandidateOutcome {
                index,
                candidate_id: doc.id,
                filename: doc.filename.clone(),
                status: CandidateStatus::Failed,
                result: ScoringResult::rejected(reason.clone()),
                error: Some(reason),
                warning: None,
                extraction_method: extraction.method,
                attempts: 0,
            });
        }

        if let Some(warning) = &verdict.warning {
            warn!("{}: {warning}", doc.filename);
        }
        Prepared::Scorable(ScorableCandidate {
            index,
            doc,
            text: extraction.text,
            method: extraction.method,
            warning: verdict.warning,
        })
    }

    /// Sends one request for the whole chunk. Candidates covered by the reply are
    /// pushed onto `outcomes`; the rest are returned for individual scoring.
    async fn score_aggregated<'a>(
        &self,
        chunk_no: usize,
        pending: Vec<ScorableCandidate<'a>>,
        job_description: &str,
        model: &str,
        outcomes: &mut Vec<CandidateOutcome>,
    ) -> Vec<ScorableCandidate<'a>> {
        let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();

        let mut scored = match self.scorer.score_batch(job_description, model, &texts).await {
            Ok(scored) => scored,
            Err(e) => {
                warn!(
                    "chunk {chunk_no}: aggregated scoring failed ({e}), scoring {} candidates individually",
                    pending.len()
                );
                return pending;
            }
        };

        let mut leftover = Vec::new();
        for (position, candidate) in pending.into_iter().enumerate() {
            match scored.get_mut(position).and_then(Option::take) {
                Some(result) => {
                    outcomes.push(candidate.into_outcome(CandidateStatus::Success, result, None, 0))
                }
                None => leftover.push(candidate),
            }
        }
        if !leftover.is_empty() {
            warn!(
                "chunk {chunk_no}: aggregated reply omitted {} candidates, scoring them individually",
                leftover.len()
            );
        }
        leftover
    }

    async fn score_individually(
        &self,
        candidate: ScorableCandidate<'_>,
        job_description: &str,
        model: &str,
    ) -> CandidateOutcome {
        let request = ScoringRequest {
            job_description: job_description.to_string(),
            candidate_text: candidate.text.clone(),
            model: model.to_string(),
        };
        let request = &request;
        let scorer = self.scorer.as_ref();

        let retried = retry_with_backoff(
            &self.settings.retry,
            &candidate.doc.filename,
            ScoringError::is_retryable,
            move |_| scorer.score(request),
        )
        .await;

        match retried.result {
            Ok(result) => candidate.into_outcome(CandidateStatus::Success, result, None, retried.attempts),
            Err(e) => {
                error!(
                    "{}: scoring failed after {} attempts: {e}",
                    candidate.doc.filename, retried.attempts
                );
                let message = format!(
                    "Scoring failed after {} attempt(s): {e}",
                    retried.attempts
                );
                candidate.into_outcome(
                    CandidateStatus::Failed,
                    ScoringResult::rejected(message.clone()),
                    Some(message),
                    retried.attempts,
                )
            }
        }
    }
}

fn cancelled_outcome(index: usize, doc: &CandidateDocument) -> CandidateOutcome {
    let message = "Batch was cancelled before this candidate was processed".to_string();
    CandidateOutcome {
        index,
        candidate_id: doc.id,
        filename: doc.filename.clone(),
        status: CandidateStatus::Failed,
        result: ScoringResult::rejected(message.clone()),
        error: Some(message),
        warning: None,
        extraction_method: ExtractionMethod::None,
        attempts: 0,
    }
}
