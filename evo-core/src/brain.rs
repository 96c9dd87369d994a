//! Text-generation interface.
//!
//! [`LlmProvider`] is the seam to the remote generation service. [`Brain`] is the
//! tier-aware front every component talks to: it picks the model and token
//! budget for the caller's tier and applies the assistant persona, so call
//! sites only deal in `(prompt, tier)`.

use crate::config::{ExpertConfig, LlmConfig, TierTable};
use crate::error::LlmError;
use crate::types::Tier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A single-turn generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Model override; providers fall back to their default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model: None,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub model: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// The remote text-generation capability.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Default model name used when a request carries no override.
    fn model_name(&self) -> &str;

    /// Whether the provider can actually reach a backend.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Tier-aware generation front used by the router, handlers and formatter.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    system_prompt: String,
    temperature: f32,
    tiers: TierTable,
    expert: ExpertConfig,
}

impl std::fmt::Debug for Brain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brain")
            .field("model", &self.provider.model_name())
            .field("configured", &self.provider.is_configured())
            .finish()
    }
}

impl Brain {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        llm: &LlmConfig,
        tiers: TierTable,
        expert: ExpertConfig,
    ) -> Self {
        Self {
            provider,
            system_prompt: llm.system_prompt.clone(),
            temperature: llm.temperature,
            tiers,
            expert,
        }
    }

    /// Conversational generation at the given tier's model and token budget.
    pub async fn ask(&self, prompt: &str, tier: Tier) -> Result<String, LlmError> {
        let limits = self.tiers.limits(tier);
        let request = CompletionRequest {
            prompt: prompt.to_string(),
            system: Some(self.system_prompt.clone()),
            model: Some(limits.model.clone()),
            max_tokens: limits.max_tokens,
            temperature: self.temperature,
        };
        tracing::debug!(tier = %tier, model = limits.model.as_str(), "Brain ask");
        Ok(self.provider.complete(request).await?.text)
    }

    /// Low-temperature generation with the expert persona and budget.
    pub async fn ask_expert(&self, prompt: &str) -> Result<String, LlmError> {
        let request = CompletionRequest {
            prompt: prompt.to_string(),
            system: Some(self.expert.system_prompt.clone()),
            model: Some(self.expert.model.clone()),
            max_tokens: self.expert.max_tokens,
            temperature: self.expert.temperature,
        };
        Ok(self.provider.complete(request).await?.text)
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_configured()
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }
}

/// Scripted provider for tests.
///
/// Returns queued responses in order, then a fixed default. Every request is
/// recorded so tests can assert how many upstream calls were made and what
/// was sent.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<Vec<Result<String, LlmError>>>,
    default_response: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(Vec::new()),
            default_response: Some("I'm a mock LLM. No queued responses available.".to_string()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            default_response: Some(text.to_string()),
            ..Self::new()
        }
    }

    /// A provider whose every call fails with a connection error.
    pub fn failing() -> Self {
        Self {
            default_response: None,
            ..Self::new()
        }
    }

    /// Queue a successful response for the next unanswered call.
    pub fn queue_response(&self, text: &str) {
        self.lock_responses().push(Ok(text.to_string()));
    }

    /// Queue a failure for the next unanswered call.
    pub fn queue_error(&self, error: LlmError) {
        self.lock_responses().push(Err(error));
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every request received.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        match self.requests.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Prompt of the most recent request.
    pub fn last_prompt(&self) -> Option<String> {
        self.requests().last().map(|r| r.prompt.clone())
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, Vec<Result<String, LlmError>>> {
        match self.responses.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        match self.requests.lock() {
            Ok(mut guard) => guard.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }

        let next = {
            let mut queue = self.lock_responses();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        };

        let text = match next {
            Some(result) => result?,
            None => match &self.default_response {
                Some(text) => text.clone(),
                None => {
                    return Err(LlmError::Connection {
                        message: "mock provider configured to fail".to_string(),
                    });
                }
            },
        };

        Ok(CompletionResponse {
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: text.len() / 4,
            },
            text,
            model,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
