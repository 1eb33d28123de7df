//! Model adapter for the Anthropic Messages API.
//!
//! Unlike the CLI backend this one cannot drive tool use in the workspace;
//! it serves planning calls and text-only agents, and deployments that
//! need full tool use configure the `claude-code` backend instead.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::models::cost::estimate_turn_cost;
use crate::domain::ports::model_adapter::{
    ModelAdapter, ModelError, ModelErrorKind, ModelRequest, ModelResponse,
};
use crate::infrastructure::runtime::model::resolve_model_id;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 8192;

/// [`ModelAdapter`] for the direct Messages API.
pub struct AnthropicApiAdapter {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicApiAdapter {
    pub fn new(api_key: String) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, api_key)
    }

    pub fn with_api_base(api_base: impl Into<String>, api_key: String) -> Self {
        let client = reqwest::Client::new();
        Self {
            client,
            api_base: api_base.into(),
            api_key,
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> ModelError {
        let kind = match status.as_u16() {
            401 | 403 => ModelErrorKind::Auth,
            404 => ModelErrorKind::NotFound,
            429 => ModelErrorKind::RateLimited,
            500..=599 => ModelErrorKind::Network,
            _ => ModelErrorKind::InvalidResponse,
        };
        ModelError::new(kind, format!("API error {status}: {body}"))
    }
}

#[async_trait]
impl ModelAdapter for AnthropicApiAdapter {
    fn name(&self) -> &'static str {
        "anthropic-api"
    }

    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let model = resolve_model_id(&request.model);
        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": [
                { "role": "user", "content": request.user_prompt }
            ],
        });
        if !request.system_prompt.is_empty() {
            body["system"] = serde_json::Value::String(request.system_prompt.clone());
        }

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .timeout(request.timeout)
            .header("content-type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    ModelErrorKind::Timeout
                } else {
                    ModelErrorKind::Network
                };
                ModelError::new(kind, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            ModelError::new(ModelErrorKind::InvalidResponse, format!("bad response: {e}"))
        })?;
        let text = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return Err(ModelError::new(
                ModelErrorKind::InvalidResponse,
                "API returned no text content",
            ));
        }

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        let cost_usd =
            estimate_turn_cost(&model, parsed.usage.input_tokens, parsed.usage.output_tokens);
        debug!(model = %model, duration_ms, cost_usd = ?cost_usd, "messages turn complete");
        Ok(ModelResponse {
            text,
            cost_usd,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            duration_ms,
        })
    }
}
