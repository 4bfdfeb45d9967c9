use std::time::Duration;

use async_trait::async_trait;
use conclave_core::{AuditError, AuditRequest, Finding, ProviderConfig};
use serde::{Deserialize, Serialize};

/// What a model provider returns for one reviewer's analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerResponse {
    /// Findings reported by the model.
    pub findings: Vec<Finding>,
    /// Optional self-rated confidence for the pass as a whole.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// The model-call capability the invoker depends on.
///
/// Implemented by [`HttpReviewerBackend`] in production; tests inject
/// scripted or failing backends through this seam.
#[async_trait]
pub trait ReviewerBackend: Send + Sync {
    /// Run one reviewer's analysis of the request.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Provider`] on network, timeout, or HTTP-status
    /// failures; the invoker treats these as retryable.
    async fn analyze(
        &self,
        reviewer_id: &str,
        request: &AuditRequest,
    ) -> Result<ReviewerResponse, AuditError>;
}

/// HTTP backend calling a bearer-token-authenticated analysis API.
///
/// Works with any provider that exposes a `/v1/analyze` endpoint accepting
/// `{ reviewerId, code, language, targets, options }` and returning
/// `{ findings, confidence? }`.
pub struct HttpReviewerBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpReviewerBackend {
    /// Build a backend from provider configuration.
    ///
    /// Returns `Ok(None)` when no `base_url` is configured: the engine then
    /// has no provider to call and reviewers run on the offline fallback.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Provider`] if the HTTP client cannot be built.
    pub fn from_config(config: &ProviderConfig) -> Result<Option<Self>, AuditError> {
        let Some(base_url) = &config.base_url else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| AuditError::Provider(format!("failed to create HTTP client: {e}")))?;
        Ok(Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }))
    }
}

#[async_trait]
impl ReviewerBackend for HttpReviewerBackend {
    async fn analyze(
        &self,
        reviewer_id: &str,
        request: &AuditRequest,
    ) -> Result<ReviewerResponse, AuditError> {
        let url = format!("{}/v1/analyze", self.base_url);
        let body = serde_json::json!({
            "reviewerId": reviewer_id,
            "code": request.codebase,
            "language": request.language,
            "targets": request.targets,
            "options": {
                "depth": request.options.depth,
                "focusAreas": request.options.focus_areas,
            },
        });

        let mut http_request = self.client.post(&url).header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = http_request
            .json(&body)
            .send()
            .await
            .map_err(|e| AuditError::Provider(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AuditError::Provider(format!(
                "analysis API error {status}: {body_text}"
            )));
        }

        response
            .json::<ReviewerResponse>()
            .await
            .map_err(|e| AuditError::Provider(format!("failed to parse response: {e}")))
    }
}
