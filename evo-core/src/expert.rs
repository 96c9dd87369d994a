//! Domain-expert generation with a process-wide response cache.

use crate::brain::Brain;
use crate::config::ExpertConfig;
use crate::error::LlmError;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache key: `(domain, format, request text)`.
type CacheKey = (String, String, String);

/// Expert-persona generation front.
///
/// Results are cached by `(domain, format, request)` for a fixed TTL. The
/// lock is held only for lookups and inserts, never across the upstream call,
/// so concurrent misses on one key both go upstream and the last write wins.
pub struct ExpertService {
    brain: Arc<Brain>,
    cache: Mutex<LruCache<CacheKey, (Instant, String)>>,
    ttl: Duration,
}

impl std::fmt::Debug for ExpertService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpertService")
            .field("ttl", &self.ttl)
            .field("cached", &self.cached_entries())
            .finish()
    }
}

impl ExpertService {
    pub fn new(brain: Arc<Brain>, config: &ExpertConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            brain,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl: Duration::from_secs(config.cache_ttl_secs),
        }
    }

    /// Expert answer for `request_text` in the given domain and output format.
    pub async fn generate_expert_response(
        &self,
        request_text: &str,
        domain: &str,
        format: &str,
    ) -> Result<String, LlmError> {
        let key = (
            domain.to_string(),
            format.to_string(),
            request_text.to_string(),
        );
        if let Some(hit) = self.lookup(&key) {
            debug!(domain, format, "Expert cache hit");
            return Ok(hit);
        }

        let prompt = build_expert_prompt(request_text, domain, format);
        let result = self.brain.ask_expert(&prompt).await?.trim().to_string();
        self.store(key, result.clone());
        Ok(result)
    }

    /// Production-ready code for `request_text`.
    pub async fn generate_expert_code(
        &self,
        request_text: &str,
        language: &str,
        framework: &str,
    ) -> Result<String, LlmError> {
        let framework_line = if framework.is_empty() {
            String::new()
        } else {
            format!("Using framework: {framework}")
        };
        let prompt = format!(
            "Generate clean, production-ready {language} code for: {request_text}\n\
             {framework_line}\n\n\
             Requirements:\n\
             - Follow best practices and conventions\n\
             - Include proper error handling\n\
             - Add meaningful comments\n\
             - Make it modular and reusable\n\
             - Include basic tests if applicable\n"
        );
        self.generate_expert_response(&prompt, "software-development", "code-module")
            .await
    }

    /// A complete tool or module design named `tool_name`.
    pub async fn generate_expert_tool(
        &self,
        request_text: &str,
        tool_name: &str,
        capabilities: &[String],
    ) -> Result<String, LlmError> {
        let capabilities_line = if capabilities.is_empty() {
            String::new()
        } else {
            format!("Capabilities required: {}", capabilities.join(", "))
        };
        let prompt = format!(
            "Design and implement a complete tool/module: {tool_name}\n\n\
             Purpose: {request_text}\n\
             {capabilities_line}\n\n\
             Create a comprehensive solution including:\n\
             - Main class/module architecture\n\
             - Configuration options\n\
             - Error handling and validation\n\
             - Usage examples\n\
             - API documentation\n\
             - Security considerations\n"
        );
        self.generate_expert_response(&prompt, "software-architecture", "complete-tool")
            .await
    }

    /// Number of entries currently held, expired or not.
    pub fn cached_entries(&self) -> usize {
        match self.cache.lock() {
            Ok(cache) => cache.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<String> {
        let mut cache = match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (stored_at, value) = cache.get(key)?;
        if stored_at.elapsed() < self.ttl {
            return Some(value.clone());
        }
        cache.pop(key);
        None
    }

    fn store(&self, key: CacheKey, value: String) {
        let mut cache = match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.put(key, (Instant::now(), value));
    }
}

fn build_expert_prompt(request_text: &str, domain: &str, format: &str) -> String {
    format!(
        "You are a world-class, PhD-level expert in {domain}.\n\
         Deliver a {format} addressing:\n\
         {request_text}\n\n\
         Requirements:\n\
         - Authoritative, detailed\n\
         - Structured with headings\n\
         - Actionable steps if relevant\n\
         - Cite best practices\n\
         - Concise yet comprehensive\n\
         - Maintain security & ethics\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::config::{LlmConfig, TierTable};

    fn service(mock: Arc<MockLlmProvider>, ttl_secs: u64) -> ExpertService {
        let config = ExpertConfig {
            cache_ttl_secs: ttl_secs,
            ..ExpertConfig::default()
        };
        let brain = Arc::new(Brain::new(
            mock,
            &LlmConfig::default(),
            TierTable::default(),
            config.clone(),
        ));
        ExpertService::new(brain, &config)
    }

    #[tokio::test]
    async fn test_repeat_request_served_from_cache() {
        let mock = Arc::new(MockLlmProvider::with_response("  expert answer  "));
        let svc = service(mock.clone(), 3600);

        let first = svc
            .generate_expert_response("explain tcp", "networking", "report")
            .await
            .unwrap();
        let second = svc
            .generate_expert_response("explain tcp", "networking", "report")
            .await
            .unwrap();

        assert_eq!(first, "expert answer");
        assert_eq!(second, first);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(svc.cached_entries(), 1);
    }

    #[tokio::test]
    async fn test_cache_key_includes_domain_and_format() {
        let mock = Arc::new(MockLlmProvider::with_response("x"));
        let svc = service(mock.clone(), 3600);
        svc.generate_expert_response("q", "a", "report").await.unwrap();
        svc.generate_expert_response("q", "b", "report").await.unwrap();
        svc.generate_expert_response("q", "a", "summary").await.unwrap();
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_expired_entry_goes_upstream() {
        let mock = Arc::new(MockLlmProvider::with_response("x"));
        let svc = service(mock.clone(), 0);
        svc.generate_expert_response("q", "d", "f").await.unwrap();
        svc.generate_expert_response("q", "d", "f").await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let mock = Arc::new(MockLlmProvider::with_response("recovered"));
        mock.queue_error(LlmError::Timeout { timeout_secs: 1 });
        let svc = service(mock.clone(), 3600);
        assert!(svc.generate_expert_response("q", "d", "f").await.is_err());
        assert_eq!(svc.cached_entries(), 0);
        let ok = svc.generate_expert_response("q", "d", "f").await.unwrap();
        assert_eq!(ok, "recovered");
    }

    #[tokio::test]
    async fn test_code_prompt_mentions_language_and_framework() {
        let mock = Arc::new(MockLlmProvider::with_response("fn main() {}"));
        let svc = service(mock.clone(), 3600);
        svc.generate_expert_code("reverse a string", "rust", "tokio")
            .await
            .unwrap();
        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("PhD-level expert in software-development"));
        assert!(prompt.contains("Deliver a code-module"));
        assert!(prompt.contains("production-ready rust code for: reverse a string"));
        assert!(prompt.contains("Using framework: tokio"));
    }

    #[tokio::test]
    async fn test_tool_prompt_lists_capabilities() {
        let mock = Arc::new(MockLlmProvider::with_response("tool"));
        let svc = service(mock.clone(), 3600);
        svc.generate_expert_tool(
            "parse logs",
            "LogParser",
            &["streaming".to_string(), "json".to_string()],
        )
        .await
        .unwrap();
        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("software-architecture"));
        assert!(prompt.contains("complete tool/module: LogParser"));
        assert!(prompt.contains("Capabilities required: streaming, json"));
    }
}
