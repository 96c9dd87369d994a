//! Remote text-generation providers.
//!
//! Provides concrete implementations of the `LlmProvider` trait:
//! - Anthropic Messages API (Claude models)
//! - An offline provider used when no credentials are available
//!
//! Use `create_provider()` to instantiate the appropriate provider from config.

pub mod anthropic;

use crate::brain::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::config::{LlmConfig, RetryConfig};
use crate::error::LlmError;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicProvider;

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on `LlmError::RateLimited` (respects `retry_after_secs`),
/// `LlmError::Connection` and `LlmError::Timeout`. Permanent errors return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt >= config.max_retries {
                    return Err(e);
                }
                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

fn is_retryable(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. }
    )
}

fn compute_backoff(config: &RetryConfig, attempt: u32, err: &LlmError) -> u64 {
    let computed = exponential_backoff(config, attempt);
    if let LlmError::RateLimited { retry_after_secs } = err {
        return (retry_after_secs * 1000).max(computed);
    }
    computed
}

fn exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // up to 25% jitter
        let jitter = (capped as f64 * 0.25 * rand::thread_rng().gen_range(0.0..1.0)) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Provider used when no backend credentials exist. Every call fails.
#[derive(Debug, Clone)]
pub struct OfflineProvider {
    reason: String,
}

impl OfflineProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for OfflineProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::NotConfigured {
            reason: self.reason.clone(),
        })
    }

    fn model_name(&self) -> &str {
        "offline"
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Create the provider named in the configuration.
///
/// A missing API key degrades to [`OfflineProvider`] rather than failing
/// startup: routing and formatting have local fallbacks, and the ping action
/// reports the generator as unavailable.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    match config.provider.as_str() {
        "anthropic" => match AnthropicProvider::new(config) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                tracing::warn!(error = %e, "Text generation unavailable; running offline");
                Arc::new(OfflineProvider::new(e.to_string()))
            }
        },
        other => {
            tracing::warn!(provider = other, "Unsupported provider; running offline");
            Arc::new(OfflineProvider::new(format!(
                "unsupported provider '{other}'"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_errors() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(&fast_retry(3), || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(LlmError::Connection {
                    message: "reset".into(),
                })
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_retry(3), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::AuthFailed {
                provider: "anthropic".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_retry(2), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Timeout { timeout_secs: 1 })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_respects_rate_limit_hint() {
        let config = fast_retry(1);
        let ms = compute_backoff(&config, 0, &LlmError::RateLimited { retry_after_secs: 3 });
        assert_eq!(ms, 3000);
    }

    #[tokio::test]
    async fn test_offline_provider_always_fails() {
        let provider = OfflineProvider::new("no key");
        assert!(!provider.is_configured());
        let err = provider
            .complete(CompletionRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured { .. }));
    }

    #[test]
    fn test_create_provider_without_key_is_offline() {
        let config = LlmConfig {
            api_key_env: "EVO_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..LlmConfig::default()
        };
        let provider = create_provider(&config);
        assert!(!provider.is_configured());
    }
}
