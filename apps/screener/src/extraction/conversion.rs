//! Structured-document conversion service for office formats.
//!
//! Request `{file: base64, filename}`, reply `{success, text}`. A reply with
//! `success: false` counts as a failed strategy so the crude stripping tier runs.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::extraction::strategy::{ExtractedText, ExtractionStrategy};
use crate::extraction::{
    normalize_whitespace, CandidateDocument, ExtractionError, ExtractionMethod,
};

#[derive(Debug, Serialize)]
struct ConversionRequest<'a> {
    file: String,
    filename: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConversionResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    text: String,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpDocumentConverter {
    client: Client,
    url: String,
}

impl HttpDocumentConverter {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            url,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for HttpDocumentConverter {
    fn name(&self) -> &'static str {
        "conversion_service"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Conversion
    }

    async fn extract(&self, doc: &CandidateDocument) -> Result<ExtractedText, ExtractionError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ConversionRequest {
                file: STANDARD.encode(&doc.bytes),
                filename: &doc.filename,
            })
            .send()
            .await
            .map_err(|e| ExtractionError::Service(format!("conversion service unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::Service(format!(
                "conversion service returned {status}"
            )));
        }

        let payload: ConversionResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Service(format!("conversion reply invalid: {e}")))?;

        converted_text(payload)
    }
}

fn converted_text(payload: ConversionResponse) -> Result<ExtractedText, ExtractionError> {
    if !payload.success {
        return Err(ExtractionError::Service(
            payload
                .error
                .unwrap_or_else(|| "conversion reported failure".to_string()),
        ));
    }
    let text = normalize_whitespace(&payload.text);
    if text.is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(ExtractedText { text, pages: None })
}
