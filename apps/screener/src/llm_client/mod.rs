/// LLM Client: the single point of entry for all Claude API calls in the screener.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Scoring, vision extraction and model listing all go through this module.
///
/// Calls are single-attempt. Retrying is the caller's job (see `crate::retry`),
/// so a batch can decide per candidate how hard to push a rate-limited provider.
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

pub mod model_cache;
pub mod prompts;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Default scoring model when the deployment does not configure one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// HTTP status reported by the provider, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => Some(*status),
            LlmError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    /// Either a plain string or an array of content blocks (text, document, image).
    content: Value,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Concatenates every text block in the response.
    pub fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(""))
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// One entry of the provider's model catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    data: Vec<ModelInfo>,
}

/// A document handed to a vision-capable model, already base64-encoded.
pub struct DocumentAttachment<'a> {
    pub media_type: &'a str,
    pub base64_data: &'a str,
}

/// The single LLM client used by all services in the screener.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// Makes a single text-only call to the Messages API.
    pub async fn call(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<LlmResponse, LlmError> {
        self.send(model, system, Value::String(prompt.to_string()))
            .await
    }

    /// Sends a document (PDF or image) together with an instruction.
    /// Used by the optical extraction fallback.
    pub async fn call_with_document(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        document: DocumentAttachment<'_>,
    ) -> Result<LlmResponse, LlmError> {
        let block_type = if document.media_type == "application/pdf" {
            "document"
        } else {
            "image"
        };
        let content = json!([
            {
                "type": block_type,
                "source": {
                    "type": "base64",
                    "media_type": document.media_type,
                    "data": document.base64_data,
                }
            },
            { "type": "text", "text": prompt }
        ]);
        self.send(model, system, content).await
    }

    /// Calls the model and returns the concatenated text of its reply.
    pub async fn call_text(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, LlmError> {
        let response = self.call(model, prompt, system).await?;
        response.text().ok_or(LlmError::EmptyContent)
    }

    /// Lists the models the provider currently exposes.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: provider_message(body),
            });
        }

        let list: ModelListResponse = response.json().await?;
        Ok(list.data)
    }

    async fn send(&self, model: &str, system: &str, content: Value) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: provider_message(body),
            });
        }

        let llm_response: LlmResponse = response.json().await?;

        debug!(
            "LLM call succeeded: model={model}, input_tokens={}, output_tokens={}",
            llm_response.usage.input_tokens, llm_response.usage.output_tokens
        );

        Ok(llm_response)
    }
}

/// Pulls the provider's own error message out of an error body, if it has one.
fn provider_message(body: String) -> String {
    serde_json::from_str::<AnthropicError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_message_from_error_body() {
        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"Too many requests"}}"#;
        assert_eq!(provider_message(body.to_string()), "Too many requests");
    }

    #[test]
    fn test_provider_message_falls_back_to_raw_body() {
        assert_eq!(provider_message("gateway timeout".to_string()), "gateway timeout");
    }

    #[test]
    fn test_response_text_joins_text_blocks() {
        let response: LlmResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "{\"score\": "},
                {"type": "tool_use"},
                {"type": "text", "text": "80}"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"score\": 80}"));
    }

    #[test]
    fn test_api_error_exposes_status() {
        let err = LlmError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        assert_eq!(err.status(), Some(429));
        assert!(LlmError::EmptyContent.status().is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = LlmClient::new("key".to_string(), Some("http://localhost:9000/".to_string()));
        assert_eq!(client.base_url, "http://localhost:9000");
    }
}
