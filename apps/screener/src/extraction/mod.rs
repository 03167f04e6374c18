//! Document extraction: raw CV bytes in, best-effort plain text out.
//!
//! Each document type has an ordered list of tiers. Tier 0 always runs; later
//! tiers run only while the best text so far is below the type's escalation
//! threshold. Every successful strategy contributes a candidate and the longest
//! one wins. When nothing usable comes back, the text is replaced by a sentinel
//! starting with [`EXTRACTION_FAILED_MARKER`] so later stages can recognise it.
//!
//! `DocumentExtractor::extract` never fails: strategy errors are logged and folded
//! into the sentinel.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod conversion;
pub mod markup;
pub mod office;
pub mod optical;
pub mod pdf;
pub mod strategy;

use strategy::{select_best, ExtractionCandidate, ExtractionStrategy};

/// Prefix of every extraction failure sentinel.
pub const EXTRACTION_FAILED_MARKER: &str = "[EXTRACTION FAILED]";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),

    #[error("the document is encrypted")]
    Encrypted,

    #[error("corrupt or unreadable document: {0}")]
    Corrupt(String),

    #[error("extraction service error: {0}")]
    Service(String),

    #[error("no text found")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Page-oriented binary documents.
    Pdf,
    PlainText,
    /// Simple markup (HTML).
    Markup,
    /// Office Open XML word processing document.
    Docx,
    /// Legacy binary Word document.
    Doc,
}

impl DocumentType {
    /// Decides the type from the file extension, consulting the declared media type
    /// only when the extension is missing. Anything else is rejected here, before
    /// the document enters the pipeline.
    pub fn detect(filename: &str, media_type: Option<&str>) -> Result<Self, ExtractionError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Ok(DocumentType::Pdf),
            Some("txt") | Some("md") | Some("text") => Ok(DocumentType::PlainText),
            Some("html") | Some("htm") | Some("xhtml") => Ok(DocumentType::Markup),
            Some("docx") => Ok(DocumentType::Docx),
            Some("doc") => Ok(DocumentType::Doc),
            Some(other) => Err(ExtractionError::UnsupportedType(format!(".{other}"))),
            None => match media_type.map(|m| m.split(';').next().unwrap_or(m).trim()) {
                Some("application/pdf") => Ok(DocumentType::Pdf),
                Some("text/plain") | Some("text/markdown") => Ok(DocumentType::PlainText),
                Some("text/html") | Some("application/xhtml+xml") => Ok(DocumentType::Markup),
                Some(
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                ) => Ok(DocumentType::Docx),
                Some("application/msword") => Ok(DocumentType::Doc),
                other => Err(ExtractionError::UnsupportedType(
                    other.unwrap_or("unknown").to_string(),
                )),
            },
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "application/pdf",
            DocumentType::PlainText => "text/plain",
            DocumentType::Markup => "text/html",
            DocumentType::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentType::Doc => "application/msword",
        }
    }
}

/// An uploaded CV. Immutable once built.
#[derive(Debug, Clone)]
pub struct CandidateDocument {
    pub id: Uuid,
    pub filename: String,
    pub media_type: String,
    pub doc_type: DocumentType,
    pub bytes: Bytes,
}

impl CandidateDocument {
    pub fn new(
        filename: impl Into<String>,
        media_type: Option<String>,
        bytes: Bytes,
    ) -> Result<Self, ExtractionError> {
        let filename = filename.into();
        let doc_type = DocumentType::detect(&filename, media_type.as_deref())?;
        Ok(Self {
            id: Uuid::new_v4(),
            media_type: media_type.unwrap_or_else(|| doc_type.media_type().to_string()),
            filename,
            doc_type,
            bytes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Structured text read straight from the document.
    Direct,
    /// Vision/OCR service.
    Optical,
    /// External structured-document conversion service.
    Conversion,
    /// Crude markup stripping or byte scanning.
    Fallback,
    /// Nothing usable; the text is a failure sentinel.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Extracted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub text: String,
    pub method: ExtractionMethod,
    pub status: ExtractionStatus,
    pub pages: Option<u32>,
    /// Strategy names in the order they ran.
    pub attempted: Vec<&'static str>,
}

impl ExtractionResult {
    pub fn is_failure(&self) -> bool {
        self.status == ExtractionStatus::Failed
    }
}

/// Builds the sentinel text used in place of CV content when extraction failed.
pub fn failure_sentinel(filename: &str, reason: &str) -> String {
    format!(
        "{EXTRACTION_FAILED_MARKER} Could not read text from '{filename}': {reason}. \
         Please re-enter the CV text manually."
    )
}

pub fn is_extraction_failure(text: &str) -> bool {
    text.trim_start().starts_with(EXTRACTION_FAILED_MARKER)
}

/// Collapses runs of spaces and tabs, trims every line and keeps at most one blank
/// line between paragraphs.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        blank_run = 0;
        out.push_str(&collapsed);
        out.push('\n');
    }

    out.trim_end().to_string()
}

#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    /// Below this many characters a PDF is treated as scanned and escalated to OCR.
    pub min_direct_chars: usize,
    /// Below this many characters the conversion service result is supplemented by
    /// crude stripping, and a still-shorter result becomes a sentinel.
    pub min_office_chars: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            min_direct_chars: 50,
            min_office_chars: 100,
        }
    }
}

/// Characters below which a PDF result counts as "effectively nothing".
const MIN_MEANINGFUL_CHARS: usize = 10;

struct ExtractionPlan {
    tiers: Vec<Vec<Arc<dyn ExtractionStrategy>>>,
    /// Run the next tier while the best quality is below this.
    escalate_below: usize,
    /// Emit the sentinel when the best quality is below this.
    fail_below: usize,
}

pub struct DocumentExtractor {
    pdf: ExtractionPlan,
    markup: ExtractionPlan,
    plain_text: ExtractionPlan,
    office: ExtractionPlan,
}

impl DocumentExtractor {
    /// `optical` and `converter` are optional network tiers; without them the
    /// extractor only uses local strategies.
    pub fn new(
        settings: &ExtractionSettings,
        optical: Option<Arc<dyn ExtractionStrategy>>,
        converter: Option<Arc<dyn ExtractionStrategy>>,
    ) -> Self {
        let mut pdf_tiers: Vec<Vec<Arc<dyn ExtractionStrategy>>> = vec![vec![
            Arc::new(pdf::PdfExtractStrategy),
            Arc::new(pdf::PdfLayoutStrategy),
        ]];
        if let Some(optical) = optical {
            pdf_tiers.push(vec![optical]);
        }

        let mut office_tiers: Vec<Vec<Arc<dyn ExtractionStrategy>>> = Vec::new();
        if let Some(converter) = converter {
            office_tiers.push(vec![converter]);
        }
        office_tiers.push(vec![Arc::new(office::OfficeStripStrategy)]);

        Self {
            pdf: ExtractionPlan {
                tiers: pdf_tiers,
                escalate_below: settings.min_direct_chars,
                fail_below: MIN_MEANINGFUL_CHARS,
            },
            markup: ExtractionPlan {
                tiers: vec![vec![Arc::new(markup::MarkupStrategy)]],
                escalate_below: 0,
                fail_below: 1,
            },
            plain_text: ExtractionPlan {
                tiers: vec![vec![Arc::new(markup::PlainTextStrategy)]],
                escalate_below: 0,
                fail_below: 1,
            },
            office: ExtractionPlan {
                tiers: office_tiers,
                escalate_below: settings.min_office_chars,
                fail_below: settings.min_office_chars,
            },
        }
    }

    fn plan_for(&self, doc_type: DocumentType) -> &ExtractionPlan {
        match doc_type {
            DocumentType::Pdf => &self.pdf,
            DocumentType::Markup => &self.markup,
            DocumentType::PlainText => &self.plain_text,
            DocumentType::Docx | DocumentType::Doc => &self.office,
        }
    }

    pub async fn extract(&self, doc: &CandidateDocument) -> ExtractionResult {
        let plan = self.plan_for(doc.doc_type);
        let mut candidates: Vec<ExtractionCandidate> = Vec::new();
        let mut errors: Vec<ExtractionError> = Vec::new();
        let mut attempted = Vec::new();

        for (tier_index, tier) in plan.tiers.iter().enumerate() {
            let best_quality = candidates.iter().map(|c| c.quality).max().unwrap_or(0);
            if tier_index > 0 {
                if best_quality >= plan.escalate_below {
                    break;
                }
                info!(
                    "{}: best text is {best_quality} chars (< {}), escalating to tier {tier_index}",
                    doc.filename, plan.escalate_below
                );
            }

            for strategy in tier {
                attempted.push(strategy.name());
                match strategy.extract(doc).await {
                    Ok(extracted) => {
                        candidates.push(ExtractionCandidate::new(strategy.as_ref(), extracted))
                    }
                    Err(e) => {
                        warn!("{}: {} extraction failed: {e}", doc.filename, strategy.name());
                        errors.push(e);
                    }
                }
            }
        }

        let pages = candidates.iter().find_map(|c| c.pages);
        match select_best(candidates) {
            Some(best) if best.quality >= plan.fail_below => {
                debug!(
                    "{}: using {} text ({} chars)",
                    doc.filename, best.strategy, best.quality
                );
                ExtractionResult {
                    text: best.text,
                    method: best.method,
                    status: ExtractionStatus::Extracted,
                    pages,
                    attempted,
                }
            }
            best => {
                let reason = failure_reason(doc.doc_type, &errors);
                warn!(
                    "{}: extraction produced {} usable chars, emitting failure sentinel ({reason})",
                    doc.filename,
                    best.map(|b| b.quality).unwrap_or(0)
                );
                ExtractionResult {
                    text: failure_sentinel(&doc.filename, &reason),
                    method: ExtractionMethod::None,
                    status: ExtractionStatus::Failed,
                    pages,
                    attempted,
                }
            }
        }
    }
}

fn failure_reason(doc_type: DocumentType, errors: &[ExtractionError]) -> String {
    if errors.iter().any(|e| matches!(e, ExtractionError::Encrypted)) {
        return "the document is encrypted".to_string();
    }
    match doc_type {
        DocumentType::Pdf => {
            "no readable text found (the document may be scanned or image-based)".to_string()
        }
        DocumentType::Docx | DocumentType::Doc => {
            "no readable text found (the document may be corrupt or in an unsupported format)"
                .to_string()
        }
        DocumentType::PlainText | DocumentType::Markup => "the document is empty".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strategy::ExtractedText;

    struct FixedStrategy {
        name: &'static str,
        method: ExtractionMethod,
        text: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedStrategy {
        fn new(name: &'static str, method: ExtractionMethod, text: Option<&'static str>) -> Self {
            Self {
                name,
                method,
                text,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExtractionStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn method(&self) -> ExtractionMethod {
            self.method
        }

        async fn extract(&self, _doc: &CandidateDocument) -> Result<ExtractedText, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.text {
                Some(t) => Ok(ExtractedText {
                    text: t.to_string(),
                    pages: Some(1),
                }),
                None => Err(ExtractionError::Service("unavailable".to_string())),
            }
        }
    }

    fn doc(name: &str, bytes: &'static [u8]) -> CandidateDocument {
        CandidateDocument::new(name, None, Bytes::from_static(bytes)).unwrap()
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(DocumentType::detect("cv.PDF", None).unwrap(), DocumentType::Pdf);
        assert_eq!(DocumentType::detect("cv.htm", None).unwrap(), DocumentType::Markup);
        assert_eq!(DocumentType::detect("cv.docx", None).unwrap(), DocumentType::Docx);
        assert_eq!(DocumentType::detect("notes.md", None).unwrap(), DocumentType::PlainText);
    }

    #[test]
    fn test_detect_rejects_unknown_extension() {
        let err = DocumentType::detect("photo.jpg", Some("application/pdf")).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedType(ext) if ext == ".jpg"));
    }

    #[test]
    fn test_detect_falls_back_to_media_type() {
        assert_eq!(
            DocumentType::detect("upload", Some("application/pdf; charset=binary")).unwrap(),
            DocumentType::Pdf
        );
        assert!(DocumentType::detect("upload", None).is_err());
    }

    #[test]
    fn test_sentinel_is_recognised() {
        let s = failure_sentinel("cv.pdf", "no readable text found");
        assert!(is_extraction_failure(&s));
        assert!(s.contains("re-enter"));
        assert!(!is_extraction_failure("Jane Doe, Backend Engineer"));
    }

    #[test]
    fn test_normalize_whitespace() {
        let input = "  Jane   Doe \t\n\n\n\nSenior   Engineer  \n";
        assert_eq!(normalize_whitespace(input), "Jane Doe\n\nSenior Engineer");
    }

    #[test]
    fn test_pdf_extract_registered_ahead_of_layout() {
        let extractor = DocumentExtractor::new(&ExtractionSettings::default(), None, None);
        let names: Vec<&str> = extractor.pdf.tiers[0].iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["pdf_extract", "pdf_layout"]);
    }

    #[tokio::test]
    async fn test_scanned_pdf_without_optical_yields_sentinel() {
        let extractor = DocumentExtractor::new(&ExtractionSettings::default(), None, None);
        let result = extractor
            .extract(&doc("scan.pdf", b"%PDF-1.4\n%binary image data only"))
            .await;

        assert!(result.is_failure());
        assert_eq!(result.method, ExtractionMethod::None);
        assert!(is_extraction_failure(&result.text));
        assert!(result.text.contains("scanned"));
    }

    #[tokio::test]
    async fn test_optical_runs_when_direct_text_is_short_and_longer_wins() {
        let optical = Arc::new(FixedStrategy::new(
            "optical",
            ExtractionMethod::Optical,
            Some("Jane Doe\nExperience: 6 years of Go and Kubernetes at Acme Corp"),
        ));
        let extractor =
            DocumentExtractor::new(&ExtractionSettings::default(), Some(optical.clone()), None);

        let result = extractor.extract(&doc("scan.pdf", b"%PDF-1.4 garbage")).await;

        assert_eq!(optical.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.method, ExtractionMethod::Optical);
        assert!(!result.is_failure());
        assert_eq!(result.attempted.last(), Some(&"optical"));
    }

    #[tokio::test]
    async fn test_failed_optical_keeps_sentinel() {
        let optical = Arc::new(FixedStrategy::new("optical", ExtractionMethod::Optical, None));
        let extractor = DocumentExtractor::new(&ExtractionSettings::default(), Some(optical), None);

        let result = extractor.extract(&doc("scan.pdf", b"not really a pdf")).await;
        assert!(result.is_failure());
    }

    #[tokio::test]
    async fn test_office_conversion_short_result_falls_back_to_stripping() {
        let converter = Arc::new(FixedStrategy::new(
            "conversion",
            ExtractionMethod::Conversion,
            Some("Jane"),
        ));
        let extractor =
            DocumentExtractor::new(&ExtractionSettings::default(), None, Some(converter.clone()));

        let result = extractor.extract(&doc("cv.docx", b"not a zip")).await;

        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
        assert!(result.attempted.contains(&"office_strip"));
        // 4 chars from the converter and nothing from stripping: still insufficient
        assert!(result.is_failure());
    }

    #[tokio::test]
    async fn test_binary_docx_without_zip_container_is_failure() {
        // OLE compound file header followed by noise, as an encrypted .docx looks
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        let mut seed: u32 = 0x2545_F491;
        for _ in 0..4000 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            bytes.push((seed >> 24) as u8);
        }
        let extractor = DocumentExtractor::new(&ExtractionSettings::default(), None, None);
        let doc = CandidateDocument::new("cv.docx", None, Bytes::from(bytes)).unwrap();

        let result = extractor.extract(&doc).await;

        assert!(result.is_failure());
        assert_eq!(result.method, ExtractionMethod::None);
        assert!(result.text.contains("corrupt"));
    }

    #[tokio::test]
    async fn test_office_conversion_long_result_skips_stripping() {
        let converter = Arc::new(FixedStrategy::new(
            "conversion",
            ExtractionMethod::Conversion,
            Some(
                "Jane Doe - Backend Engineer. Experience: 6 years building distributed \
                 systems in Go. Skills: Kubernetes, Postgres, gRPC. Education: BSc CS.",
            ),
        ));
        let extractor = DocumentExtractor::new(&ExtractionSettings::default(), None, Some(converter));

        let result = extractor.extract(&doc("cv.docx", b"PK")).await;
        assert_eq!(result.method, ExtractionMethod::Conversion);
        assert_eq!(result.attempted, vec!["conversion"]);
    }

    #[tokio::test]
    async fn test_plain_text_extracts_directly() {
        let extractor = DocumentExtractor::new(&ExtractionSettings::default(), None, None);
        let result = extractor
            .extract(&doc("cv.txt", b"Jane Doe\n\n\n\nGo   developer"))
            .await;
        assert_eq!(result.text, "Jane Doe\n\nGo developer");
        assert_eq!(result.method, ExtractionMethod::Direct);
    }

    #[tokio::test]
    async fn test_empty_text_file_is_failure() {
        let extractor = DocumentExtractor::new(&ExtractionSettings::default(), None, None);
        let result = extractor.extract(&doc("cv.txt", b"   \n ")).await;
        assert!(result.is_failure());
    }
}
