//! HTTP client for the AI analysis boundary
//!
//! One JSON POST per call:
//! `{ action, processor_id, model_id, file: { data_base64, mime_type, file_name } }`
//! answered by `{ success, summary?, error? }`. No storage identifiers cross this boundary.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shipdocs_common::config::AnalysisBoundaryConfig;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

use super::{AnalysisAction, AnalysisPayload, BoundaryError, DocumentAnalyzer, WireFile};

const BOUNDARY: &str = "analysis";

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub action: &'static str,
    pub processor_id: String,
    pub model_id: String,
    pub file: WireFile,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Analysis boundary over HTTP
///
/// An unset endpoint is not a startup error: every call fails with
/// [`BoundaryError::NotConfigured`] and chunks degrade to pattern-only.
pub struct HttpDocumentAnalyzer {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    processor_id: String,
    model_id: String,
    field_model_id: Option<String>,
    timeout_secs: u64,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpDocumentAnalyzer {
    pub fn new(config: &AnalysisBoundaryConfig) -> Result<Self, BoundaryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BoundaryError::Transport(e.to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            processor_id: config.processor_id.clone(),
            model_id: config.model_id.clone(),
            field_model_id: config.field_model_id.clone(),
            timeout_secs: config.timeout_secs,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Field extraction may run on a different model than summarisation
    fn model_for(&self, action: AnalysisAction) -> &str {
        match (action, &self.field_model_id) {
            (AnalysisAction::ExtractFields, Some(model)) => model,
            _ => &self.model_id,
        }
    }

    pub fn build_request(&self, action: AnalysisAction, payload: &AnalysisPayload) -> AnalysisRequest {
        AnalysisRequest {
            action: action.as_wire(),
            processor_id: self.processor_id.clone(),
            model_id: self.model_for(action).to_string(),
            file: payload.to_wire(),
        }
    }
}

/// Turn a decoded response into summary text
pub fn interpret_response(response: AnalysisResponse) -> Result<String, BoundaryError> {
    if !response.success {
        return Err(BoundaryError::Rejected(
            response
                .error
                .unwrap_or_else(|| "analysis reported failure without a message".to_string()),
        ));
    }
    match response.summary {
        Some(summary) if !summary.trim().is_empty() => Ok(summary),
        _ => Err(BoundaryError::Decode(
            "analysis succeeded but returned no summary".to_string(),
        )),
    }
}

#[async_trait]
impl DocumentAnalyzer for HttpDocumentAnalyzer {
    async fn analyze(
        &self,
        action: AnalysisAction,
        payload: &AnalysisPayload,
    ) -> Result<String, BoundaryError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(BoundaryError::NotConfigured(BOUNDARY))?;

        self.rate_limiter.until_ready().await;

        debug!(
            action = %action,
            file_name = payload.file_name(),
            bytes = payload.len(),
            "Calling analysis boundary"
        );

        let mut request = self
            .client
            .post(endpoint)
            .json(&self.build_request(action, payload));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BoundaryError::from_reqwest(BOUNDARY, self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(action = %action, status = status.as_u16(), "Analysis boundary returned error status");
            return Err(BoundaryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: AnalysisResponse = response
            .json()
            .await
            .map_err(|e| BoundaryError::from_reqwest(BOUNDARY, self.timeout_secs, e))?;

        interpret_response(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AnalysisBoundaryConfig {
        AnalysisBoundaryConfig {
            endpoint: Some("http://127.0.0.1:9/analyze".to_string()),
            field_model_id: Some("reasoning-small".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_carries_action_and_models() {
        let analyzer = HttpDocumentAnalyzer::new(&config()).unwrap();
        let payload = AnalysisPayload::text("Certificate No. A/25/772", "summary.txt");

        let request = analyzer.build_request(AnalysisAction::AnalyzeCertificate, &payload);
        assert_eq!(request.action, "analyze_certificate");
        assert_eq!(request.model_id, "summary-large");
        assert_eq!(request.processor_id, "document-ocr");

        let request = analyzer.build_request(AnalysisAction::ExtractFields, &payload);
        assert_eq!(request.model_id, "reasoning-small");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["file"]["file_name"], "summary.txt");
        assert!(json.get("file_id").is_none());
    }

    #[test]
    fn test_interpret_success() {
        let response: AnalysisResponse =
            serde_json::from_str(r#"{"success": true, "summary": "Cargo Ship Safety Certificate"}"#)
                .unwrap();
        assert_eq!(
            interpret_response(response).unwrap(),
            "Cargo Ship Safety Certificate"
        );
    }

    #[test]
    fn test_interpret_rejection_and_empty() {
        let response: AnalysisResponse =
            serde_json::from_str(r#"{"success": false, "error": "quota exceeded"}"#).unwrap();
        assert!(matches!(
            interpret_response(response),
            Err(BoundaryError::Rejected(msg)) if msg == "quota exceeded"
        ));

        let response: AnalysisResponse =
            serde_json::from_str(r#"{"success": true, "summary": "  "}"#).unwrap();
        assert!(matches!(
            interpret_response(response),
            Err(BoundaryError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_fails_per_call() {
        let analyzer = HttpDocumentAnalyzer::new(&AnalysisBoundaryConfig::default()).unwrap();
        assert!(!analyzer.is_configured());

        let result = analyzer
            .analyze(
                AnalysisAction::AnalyzeDocument,
                &AnalysisPayload::text("x", "x.txt"),
            )
            .await;
        assert!(matches!(result, Err(BoundaryError::NotConfigured("analysis"))));
    }
}
