//! CV screening: validation gate, scoring, reply parsing and batch orchestration.
//!
//! Flow per candidate: extraction -> `ContentValidator` -> `CandidateScorer` ->
//! `ScoringResult`. `BatchOrchestrator` drives that flow across a whole upload.

pub mod batch;
pub mod handlers;
pub mod models;
pub mod parser;
pub mod prompts;
pub mod scorer;
pub mod validation;
