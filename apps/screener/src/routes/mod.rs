pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::screening::handlers;
use crate::state::AppState;

/// Upper bound for a whole multipart batch upload.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/models", get(handlers::handle_list_models))
        .route(
            "/api/v1/screening/batch",
            post(handlers::handle_screen_batch).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::extraction::{DocumentExtractor, ExtractionSettings};
    use crate::llm_client::model_cache::ModelCatalogCache;
    use crate::llm_client::{LlmClient, ModelInfo};
    use crate::screening::batch::{BatchOrchestrator, BatchSettings};
    use crate::screening::models::{Recommendation, ScoringRequest, ScoringResult};
    use crate::screening::scorer::{CandidateScorer, ScoringError};
    use crate::screening::validation::ContentValidator;

    struct FixedScorer;

    #[async_trait]
    impl CandidateScorer for FixedScorer {
        async fn score(&self, _request: &ScoringRequest) -> Result<ScoringResult, ScoringError> {
            let mut result = ScoringResult::rejected("Solid Go background");
            result.score = 70;
            result.raw_score = 70;
            result.recommendation = Recommendation::Maybe;
            Ok(result)
        }

        async fn score_batch(
            &self,
            _job_description: &str,
            _model: &str,
            candidate_texts: &[String],
        ) -> Result<Vec<Option<ScoringResult>>, ScoringError> {
            Ok(vec![None; candidate_texts.len()])
        }
    }

    fn test_state() -> AppState {
        let config = Config {
            anthropic_api_key: "test-key".to_string(),
            anthropic_base_url: "http://127.0.0.1:9".to_string(),
            scoring_model: "test-model".to_string(),
            model_cache_ttl: Duration::from_secs(60),
            optical_service_url: None,
            optical_vision_fallback: false,
            conversion_service_url: None,
            extraction: ExtractionSettings::default(),
            validation_min_chars: 200,
            batch: BatchSettings::default(),
            port: 0,
            rust_log: "info".to_string(),
        };
        let orchestrator = BatchOrchestrator::new(
            Arc::new(DocumentExtractor::new(&config.extraction, None, None)),
            ContentValidator::new(config.validation_min_chars),
            Arc::new(FixedScorer),
            config.batch.clone(),
        );
        AppState {
            llm: LlmClient::new(config.anthropic_api_key.clone(), Some(config.anthropic_base_url.clone())),
            model_cache: Arc::new(Mutex::new(ModelCatalogCache::new(config.model_cache_ttl))),
            orchestrator: Arc::new(orchestrator),
            config,
        }
    }

    const BOUNDARY: &str = "screener-test-boundary";

    /// (field name, optional filename, content)
    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, filename, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn batch_request(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/screening/batch")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const CV: &str = "Jane Doe\nEmail: jane@example.com\nEXPERIENCE\nBackend engineer at Acme Corp \
        for six years building Go services and on-call tooling. Led the billing migration.\nSKILLS\nGo, PostgreSQL, gRPC\n\
        EDUCATION\nBSc Computer Science, University of Leeds\n";

    #[tokio::test]
    async fn test_health_reports_service() {
        let response = build_router(test_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "screener");
    }

    #[tokio::test]
    async fn test_batch_scores_every_uploaded_file() {
        let response = build_router(test_state())
            .oneshot(batch_request(&[
                ("job_description", None, "Senior Backend Engineer, Go"),
                ("files", Some("jane.txt"), CV),
                ("files", Some("empty.txt"), "too short"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["status"], "success");
        assert_eq!(results[0]["result"]["score"], 70);
        assert_eq!(results[1]["status"], "failed");
        assert_eq!(body["summary"]["total"], 2);
    }

    #[tokio::test]
    async fn test_unsupported_file_rejected_before_pipeline() {
        let response = build_router(test_state())
            .oneshot(batch_request(&[
                ("job_description", None, "Senior Backend Engineer, Go"),
                ("files", Some("photo.png"), "not a cv"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "UNSUPPORTED_DOCUMENT");
    }

    #[tokio::test]
    async fn test_missing_job_description_is_bad_request() {
        let response = build_router(test_state())
            .oneshot(batch_request(&[("files", Some("jane.txt"), CV)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_model_rejected_from_fresh_catalog() {
        let state = test_state();
        state.model_cache.lock().await.store(
            vec![ModelInfo {
                id: "claude-haiku-4-5".to_string(),
                display_name: None,
            }],
            tokio::time::Instant::now(),
        );
        let router = build_router(state);

        // a refetch would fail against the unreachable base URL and fall back to
        // trusting the model, so a 400 shows the young catalog was used as-is
        let response = router
            .clone()
            .oneshot(batch_request(&[
                ("job_description", None, "Senior Backend Engineer, Go"),
                ("model", None, "claude-made-up-1"),
                ("files", Some("jane.txt"), CV),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let response = router
            .oneshot(batch_request(&[
                ("job_description", None, "Senior Backend Engineer, Go"),
                ("model", None, "claude-haiku-4-5"),
                ("files", Some("jane.txt"), CV),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
