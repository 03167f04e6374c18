use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extraction::ExtractionMethod;

/// Hiring recommendation, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Pass,
    Maybe,
    Interview,
}

impl Recommendation {
    /// The strongest recommendation a score supports on its own.
    pub fn for_score(score: u32) -> Self {
        match score {
            s if s >= 75 => Recommendation::Interview,
            s if s >= 50 => Recommendation::Maybe,
            _ => Recommendation::Pass,
        }
    }

    /// Lenient parse of provider wording ("Interview", "strong yes", "reject", ...).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        if raw.contains("interview") || raw.contains("strong") || raw == "yes" || raw == "hire" {
            Some(Recommendation::Interview)
        } else if raw.contains("maybe") || raw.contains("consider") {
            Some(Recommendation::Maybe)
        } else if raw.contains("pass") || raw.contains("reject") || raw == "no" {
            Some(Recommendation::Pass)
        } else {
            None
        }
    }
}

/// Five weighted sub-scores whose maxima add up to 100. Always the provider's raw
/// values: the gating cap never touches them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Out of 35.
    pub technical: u32,
    /// Out of 25.
    pub experience: u32,
    /// Out of 15.
    pub education: u32,
    /// Out of 15.
    pub career_progression: u32,
    /// Out of 10.
    pub communication: u32,
}

impl ScoreBreakdown {
    pub const MAX_TECHNICAL: u32 = 35;
    pub const MAX_EXPERIENCE: u32 = 25;
    pub const MAX_EDUCATION: u32 = 15;
    pub const MAX_CAREER_PROGRESSION: u32 = 15;
    pub const MAX_COMMUNICATION: u32 = 10;

    #[cfg(test)]
    pub fn total(&self) -> u32 {
        self.technical
            + self.experience
            + self.education
            + self.career_progression
            + self.communication
    }
}

/// One scoring attempt: a job description, a CV's text and the model to ask.
#[derive(Debug, Clone)]
pub struct ScoringRequest {
    pub job_description: String,
    pub candidate_text: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    /// 0 – 100, after the gating cap.
    pub score: u32,
    pub recommendation: Recommendation,
    pub summary: String,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub partial_skills: Vec<String>,
    pub concerns: Vec<String>,
    pub interview_questions: Vec<String>,
    pub years_experience: f32,
    /// 0.0 – 1.0 when the provider reports it.
    pub confidence: Option<f32>,
    pub breakdown: Option<ScoreBreakdown>,
    /// Score before the gating cap; equals `score` when no cap applied.
    pub raw_score: u32,
    /// True when the provider reply could not be decoded and this is a stand-in.
    pub degraded: bool,
}

impl ScoringResult {
    /// Zero-score "pass" result carrying an explanation, used for candidates that
    /// never reached (or never got an answer from) the provider.
    pub fn rejected(summary: impl Into<String>) -> Self {
        Self {
            score: 0,
            recommendation: Recommendation::Pass,
            summary: summary.into(),
            matched_skills: Vec::new(),
            missing_skills: Vec::new(),
            partial_skills: Vec::new(),
            concerns: Vec::new(),
            interview_questions: Vec::new(),
            years_experience: 0.0,
            confidence: None,
            breakdown: None,
            raw_score: 0,
            degraded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

/// Final per-candidate entry of a batch. Failures are data, never errors.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateOutcome {
    /// Position in the submitted list.
    pub index: usize,
    pub candidate_id: Uuid,
    pub filename: String,
    pub status: CandidateStatus,
    pub result: ScoringResult,
    pub error: Option<String>,
    /// Validation warning for marginal content that was still scored.
    pub warning: Option<String>,
    pub extraction_method: ExtractionMethod,
    /// Provider calls made for this candidate alone (aggregated chunk calls excluded).
    pub attempts: u32,
}
