//! Optical fallback for scanned or image-only PDFs.
//!
//! Two backends, both registered as the last PDF tier:
//! - `HttpOpticalExtractor` posts the base64 document to an OCR service.
//! - `VisionOpticalExtractor` sends it to a vision-capable model through
//!   `LlmClient` with a fixed "clean CV text only" instruction.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::extraction::strategy::{ExtractedText, ExtractionStrategy};
use crate::extraction::{
    normalize_whitespace, CandidateDocument, ExtractionError, ExtractionMethod,
};
use crate::llm_client::prompts::{OCR_PROMPT, OCR_SYSTEM};
use crate::llm_client::{DocumentAttachment, LlmClient};

#[derive(Debug, Serialize)]
struct OpticalRequest<'a> {
    file: String,
    filename: &'a str,
    /// Extraction-mode flag understood by the service.
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpticalResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    page_count: Option<u32>,
}

pub struct HttpOpticalExtractor {
    client: Client,
    url: String,
}

impl HttpOpticalExtractor {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(180))
                .build()
                .expect("Failed to build HTTP client"),
            url,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for HttpOpticalExtractor {
    fn name(&self) -> &'static str {
        "optical_service"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Optical
    }

    async fn extract(&self, doc: &CandidateDocument) -> Result<ExtractedText, ExtractionError> {
        let request = OpticalRequest {
            file: STANDARD.encode(&doc.bytes),
            filename: &doc.filename,
            mode: "ocr",
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::Service(format!("optical service unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Service(format!(
                "optical service returned {status}: {body}"
            )));
        }

        let payload: OpticalResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Service(format!("optical service reply invalid: {e}")))?;

        info!(
            "{}: optical service returned {} chars via {} ({} pages)",
            doc.filename,
            payload.text.len(),
            payload.method.as_deref().unwrap_or("unknown"),
            payload.page_count.unwrap_or(0)
        );

        let text = normalize_whitespace(&payload.text);
        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(ExtractedText {
            text,
            pages: payload.page_count,
        })
    }
}

pub struct VisionOpticalExtractor {
    llm: LlmClient,
    model: String,
}

impl VisionOpticalExtractor {
    pub fn new(llm: LlmClient, model: String) -> Self {
        Self { llm, model }
    }
}

#[async_trait]
impl ExtractionStrategy for VisionOpticalExtractor {
    fn name(&self) -> &'static str {
        "optical_vision"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Optical
    }

    async fn extract(&self, doc: &CandidateDocument) -> Result<ExtractedText, ExtractionError> {
        let encoded = STANDARD.encode(&doc.bytes);
        let response = self
            .llm
            .call_with_document(
                &self.model,
                OCR_PROMPT,
                OCR_SYSTEM,
                DocumentAttachment {
                    media_type: &doc.media_type,
                    base64_data: &encoded,
                },
            )
            .await
            .map_err(|e| ExtractionError::Service(format!("vision extraction failed: {e}")))?;

        let text = normalize_whitespace(&response.text().unwrap_or_default());
        debug!("{}: vision model returned {} chars", doc.filename, text.len());
        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(ExtractedText { text, pages: None })
    }
}
