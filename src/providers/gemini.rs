//! Gemini `generateContent` REST client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{Provider, ProviderConnector, ProviderError};
use crate::config::ProviderConfig;
use crate::context::{ContextTurn, TurnRole};

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default REST base URL for model endpoints
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Creates [`GeminiClient`]s
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    base_url: String,
    model: String,
    connect_timeout: Duration,
}

impl GeminiConnector {
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            connect_timeout: config.connect_timeout,
        }
    }
}

impl ProviderConnector for GeminiConnector {
    fn connect(&self, api_key: &SecretString) -> Result<Arc<dyn Provider>, ProviderError> {
        let key = api_key.expose_secret();
        if key.is_empty() || key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ProviderError::InvalidKey(
                "key must be non-empty and contain no whitespace".to_string(),
            ));
        }

        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to build http client: {e}")))?;

        Ok(Arc::new(GeminiClient {
            client,
            api_key: api_key.clone(),
            endpoint: format!(
                "{}/{}:generateContent",
                self.base_url.trim_end_matches('/'),
                self.model
            ),
        }))
    }
}

/// Client bound to one credential and model
pub struct GeminiClient {
    client: Client,
    api_key: SecretString,
    endpoint: String,
}

#[async_trait]
impl Provider for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, context: &[ContextTurn]) -> Result<String, ProviderError> {
        let request = build_request(context);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("failed to parse response: {e}")))?;

        extract_text(parsed)
    }
}

/// The endpoint's `contents` only carry `user` and `model` roles
const fn wire_role(role: TurnRole) -> &'static str {
    match role {
        TurnRole::Assistant => "model",
        TurnRole::User | TurnRole::System => "user",
    }
}

fn build_request(context: &[ContextTurn]) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: context
            .iter()
            .map(|turn| Content {
                role: wire_role(turn.role),
                parts: vec![Part { text: &turn.text }],
            })
            .collect(),
    }
}

fn map_http_error(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|w| w.error.message)
        .unwrap_or_else(|| {
            if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body.chars().take(200).collect()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(message),
        _ => ProviderError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, ProviderError> {
    if let Some(feedback) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Malformed(format!("prompt blocked: {feedback}")));
    }

    let text: String = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::Malformed("no text in response".to_string()));
    }
    Ok(text)
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}
