//! Extraction strategies and the best-result selector.
//!
//! Adding an extraction tier means implementing `ExtractionStrategy` and
//! registering it in `DocumentExtractor::new`; the selection logic stays as is.

use async_trait::async_trait;

use crate::extraction::{CandidateDocument, ExtractionError, ExtractionMethod};

/// Text produced by one strategy.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub pages: Option<u32>,
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Short identifier used in logs and `ExtractionResult::attempted`.
    fn name(&self) -> &'static str;

    fn method(&self) -> ExtractionMethod;

    async fn extract(&self, doc: &CandidateDocument) -> Result<ExtractedText, ExtractionError>;
}

/// A strategy's output scored for selection.
#[derive(Debug, Clone)]
pub struct ExtractionCandidate {
    pub strategy: &'static str,
    pub method: ExtractionMethod,
    pub text: String,
    pub pages: Option<u32>,
    pub quality: usize,
}

impl ExtractionCandidate {
    pub fn new(strategy: &dyn ExtractionStrategy, extracted: ExtractedText) -> Self {
        Self {
            strategy: strategy.name(),
            method: strategy.method(),
            quality: quality_of(&extracted.text),
            text: extracted.text,
            pages: extracted.pages,
        }
    }
}

/// Quality is the number of visible characters: whitespace and control
/// characters don't count.
pub fn quality_of(text: &str) -> usize {
    text.chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .count()
}

/// Picks the highest-quality candidate. Ties go to the earlier one, so cheaper
/// strategies registered first win over equally good fallbacks.
pub fn select_best(candidates: Vec<ExtractionCandidate>) -> Option<ExtractionCandidate> {
    let mut best: Option<ExtractionCandidate> = None;
    for candidate in candidates {
        let better = best
            .as_ref()
            .map_or(true, |current| candidate.quality > current.quality);
        if better {
            best = Some(candidate);
        }
    }
    best
}
