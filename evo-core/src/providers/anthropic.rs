//! Anthropic Messages API provider implementation.
//!
//! Key differences from OpenAI-compatible APIs:
//! - Auth via `x-api-key` header (not `Authorization: Bearer`)
//! - Required `anthropic-version` header
//! - System prompt is a top-level `system` field

use crate::brain::{CompletionRequest, CompletionResponse, LlmProvider, TokenUsage};
use crate::config::{LlmConfig, RetryConfig};
use crate::error::LlmError;
use crate::providers::with_retry;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// The default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The required Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider from configuration.
    ///
    /// Reads the API key from the environment variable named by `config.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!("Anthropic (env var '{}' not set)", config.api_key_env),
            })?;
        Ok(Self::new_with_key(config, api_key))
    }

    /// Create a provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            retry: config.retry.clone(),
        }
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
        });
        if let Some(system) = &request.system {
            body["system"] = Value::String(system.clone());
        }
        body
    }

    /// Pull the text of the first content block out of a Messages API response.
    fn parse_response(json: &Value) -> Result<CompletionResponse, LlmError> {
        let text = json["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"] == "text")
                    .and_then(|b| b["text"].as_str())
            })
            .ok_or_else(|| LlmError::ResponseParse {
                message: "response contained no text content block".to_string(),
            })?;

        let usage = TokenUsage {
            input_tokens: json["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
            output_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
        };

        Ok(CompletionResponse {
            text: text.to_string(),
            model: json["model"].as_str().unwrap_or_default().to_string(),
            usage,
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "Anthropic".to_string(),
            },
            429 => LlmError::RateLimited {
                retry_after_secs: 5,
            },
            500..=599 => LlmError::Connection {
                message: format!("Anthropic server error {status}: {body}"),
            },
            _ => LlmError::ApiRequest {
                message: format!("Anthropic returned {status}: {body}"),
            },
        }
    }

    async fn send_once(&self, body: &Value) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout { timeout_secs: 0 }
                } else {
                    LlmError::Connection {
                        message: format!("Request to Anthropic API failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let json: Value = serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid JSON in response: {e}"),
        })?;

        Self::parse_response(&json)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request);
        debug!(
            model = body["model"].as_str().unwrap_or_default(),
            max_tokens = request.max_tokens,
            "Sending Anthropic completion request"
        );
        let mut response = with_retry(&self.retry, || self.send_once(&body)).await?;
        response.text = response.text.trim().to_string();
        Ok(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new_with_key(&LlmConfig::default(), "test-key".into())
    }

    #[test]
    fn test_request_body_includes_system_and_model() {
        let request = CompletionRequest {
            prompt: "hello".into(),
            system: Some("be kind".into()),
            model: Some("claude-3-opus-20240229".into()),
            max_tokens: 800,
            temperature: 0.7,
        };
        let body = provider().build_request_body(&request);
        assert_eq!(body["model"], "claude-3-opus-20240229");
        assert_eq!(body["max_tokens"], 800);
        assert_eq!(body["system"], "be kind");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_request_body_defaults_model() {
        let body = provider().build_request_body(&CompletionRequest::new("x"));
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_parse_response_text_block() {
        let json = serde_json::json!({
            "model": "claude-3-haiku-20240307",
            "content": [{"type": "text", "text": "Hi there"}],
            "usage": {"input_tokens": 12, "output_tokens": 3}
        });
        let resp = AnthropicProvider::parse_response(&json).unwrap();
        assert_eq!(resp.text, "Hi there");
        assert_eq!(resp.usage.input_tokens, 12);
        assert_eq!(resp.usage.output_tokens, 3);
    }

    #[test]
    fn test_parse_response_without_text_fails() {
        let json = serde_json::json!({"content": []});
        let err = AnthropicProvider::parse_response(&json).unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }

    #[test]
    fn test_map_http_errors() {
        use reqwest::StatusCode;
        assert!(matches!(
            AnthropicProvider::map_http_error(StatusCode::UNAUTHORIZED, ""),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            AnthropicProvider::map_http_error(StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            AnthropicProvider::map_http_error(StatusCode::BAD_GATEWAY, ""),
            LlmError::Connection { .. }
        ));
        assert!(matches!(
            AnthropicProvider::map_http_error(StatusCode::BAD_REQUEST, "bad"),
            LlmError::ApiRequest { .. }
        ));
    }
}
