use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Clone, Error)]
pub(crate) enum AiServiceError {
    #[error("AI service is not configured")]
    NotConfigured,
    #[error("AI service did not answer in time")]
    Timeout,
    #[error("AI service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("AI service request failed: {0}")]
    Transport(String),
    #[error("AI service returned an unexpected payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContextRequest {
    pub(crate) file_id: String,
    pub(crate) content_base64: String,
    pub(crate) file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContextCreated {
    pub(crate) context_id: String,
    #[serde(default)]
    pub(crate) expires_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OpenCorrectionRequest {
    pub(crate) context_id: String,
    pub(crate) question_text: String,
    pub(crate) user_answer: String,
    pub(crate) include: Vec<String>,
    pub(crate) exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OpenCorrection {
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) feedback: String,
    #[serde(default)]
    pub(crate) ideal_answer: Option<String>,
}

/// The external RAG correction service.
#[async_trait]
pub(crate) trait AiServiceApi: Send + Sync {
    async fn create_context(&self, request: &ContextRequest)
        -> Result<ContextCreated, AiServiceError>;

    async fn correct_open(
        &self,
        request: &OpenCorrectionRequest,
    ) -> Result<OpenCorrection, AiServiceError>;
}

#[derive(Debug, Clone)]
pub(crate) struct HttpAiService {
    client: Client,
    api_key: String,
    base_url: String,
    correction_timeout: Duration,
    context_timeout: Duration,
}

impl HttpAiService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().api_key.clone(),
            base_url: settings.ai().base_url.trim_end_matches('/').to_string(),
            correction_timeout: Duration::from_secs(settings.ai().correction_timeout_seconds),
            context_timeout: Duration::from_secs(settings.ai().context_timeout_seconds),
        })
    }

    async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, AiServiceError>
    where
        B: Serialize + Sync,
        T: for<'de> Deserialize<'de>,
    {
        if self.base_url.is_empty() {
            return Err(AiServiceError::NotConfigured);
        }

        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiServiceError::Status { status: status.as_u16(), body: truncate(&body) });
        }

        let bytes = response.bytes().await.map_err(map_transport)?;
        serde_json::from_slice(&bytes).map_err(|err| AiServiceError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl AiServiceApi for HttpAiService {
    async fn create_context(
        &self,
        request: &ContextRequest,
    ) -> Result<ContextCreated, AiServiceError> {
        tracing::info!(file_id = %request.file_id, "Creating AI context");
        let created: ContextCreated =
            self.post_json("/contexts", request, self.context_timeout).await?;
        if created.context_id.trim().is_empty() {
            return Err(AiServiceError::Malformed("empty contextId".to_string()));
        }
        Ok(created)
    }

    async fn correct_open(
        &self,
        request: &OpenCorrectionRequest,
    ) -> Result<OpenCorrection, AiServiceError> {
        self.post_json("/corrections/open", request, self.correction_timeout).await
    }
}

fn map_transport(err: reqwest::Error) -> AiServiceError {
    if err.is_timeout() {
        AiServiceError::Timeout
    } else {
        AiServiceError::Transport(err.to_string())
    }
}

fn truncate(body: &str) -> String {
    const LIMIT: usize = 500;
    if body.len() <= LIMIT {
        return body.to_string();
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn correction_request_uses_camel_case() {
        let request = OpenCorrectionRequest {
            context_id: "ctx-1".into(),
            question_text: "Why?".into(),
            user_answer: "Because".into(),
            include: vec!["cell".into()],
            exclude: vec![],
        };
        let json = serde_json::to_value(&request).expect("json");
        assert_eq!(json["contextId"], "ctx-1");
        assert_eq!(json["questionText"], "Why?");
        assert_eq!(json["userAnswer"], "Because");
        assert_eq!(json["include"][0], "cell");
    }

    #[test]
    fn correction_payload_tolerates_missing_ideal_answer() {
        let parsed: OpenCorrection =
            serde_json::from_str(r#"{"score": 72.5, "feedback": "Good"}"#).expect("parse");
        assert_eq!(parsed.score, 72.5);
        assert!(parsed.ideal_answer.is_none());
    }

    #[test]
    fn long_error_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let truncated = truncate(&body);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 503);
    }

    #[tokio::test]
    async fn unconfigured_service_fails_fast() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let service = HttpAiService::from_settings(&settings).expect("service");
        let request = ContextRequest {
            file_id: "unit-1-abc".into(),
            content_base64: String::new(),
            file_name: "unit.html".into(),
        };

        assert!(matches!(
            service.create_context(&request).await,
            Err(AiServiceError::NotConfigured)
        ));
    }
}
