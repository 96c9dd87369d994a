//! Configuration system for the Evo gateway.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit config file -> environment. The user-level file lives at
//! `<config_dir>/evo/config.toml`; environment variables are prefixed with
//! `EVO_` and nest with `__` (e.g. `EVO_SERVER__PORT=8080`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::types::Tier;

/// Top-level configuration for the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvoConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tiers: TierTable,
    #[serde(default)]
    pub expert: ExpertConfig,
    #[serde(default)]
    pub swarm: SwarmConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Remote text-generation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name. Only `anthropic` is wired today.
    pub provider: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Override for the provider base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Assistant persona sent with every conversational call.
    pub system_prompt: String,
    pub temperature: f32,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            system_prompt: "You are Evo AI, a precise and truthful assistant. Always answer with \
                            respect for all religions and scriptures. Never disrespect any \
                            religion or scripture. Always be respectful and kind."
                .to_string(),
            temperature: 0.7,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff for transient provider errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Per-tier model choice, token budget and swarm activation cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierLimits {
    pub model: String,
    pub max_tokens: u32,
    pub swarm_max_modules: usize,
}

const BASIC_MODEL: &str = "claude-3-haiku-20240307";
const PREMIUM_MODEL: &str = "claude-3-opus-20240229";

/// Limits for every tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    pub free: TierLimits,
    pub pro: TierLimits,
    pub paid: TierLimits,
    pub enterprise: TierLimits,
}

impl TierTable {
    pub fn limits(&self, tier: Tier) -> &TierLimits {
        match tier {
            Tier::Free => &self.free,
            Tier::Pro => &self.pro,
            Tier::Paid => &self.paid,
            Tier::Enterprise => &self.enterprise,
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        let limits = |model: &str, max_tokens, swarm_max_modules| TierLimits {
            model: model.to_string(),
            max_tokens,
            swarm_max_modules,
        };
        Self {
            free: limits(BASIC_MODEL, 300, 1),
            pro: limits(BASIC_MODEL, 800, 3),
            paid: limits(PREMIUM_MODEL, 800, 3),
            enterprise: limits(BASIC_MODEL, 800, 999),
        }
    }
}

/// Settings for the expert-response service and its cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for ExpertConfig {
    fn default() -> Self {
        Self {
            model: BASIC_MODEL.to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            system_prompt: "You are an expert AI assistant.".to_string(),
            cache_ttl_secs: 3600,
            cache_capacity: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Agent count reported alongside swarm results.
    pub max_agents: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self { max_agents: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Environment variable holding the token signing secret.
    pub jwt_secret_env: String,
    /// Secret used when the environment variable is unset.
    pub fallback_secret: String,
    pub token_ttl_hours: i64,
}

impl SecurityConfig {
    /// Signing secret: the environment variable if set, else the fallback.
    pub fn resolve_secret(&self) -> String {
        std::env::var(&self.jwt_secret_env)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.fallback_secret.clone())
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret_env: "JWT_SECRET".to_string(),
            fallback_secret: "evo-secret".to_string(),
            token_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Hides debug detail from error responses when set.
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            production: false,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`EVO_*`, plus `SWARM_MAX_AGENTS`)
/// 2. Explicit config file (must exist when given)
/// 3. User config (`<config_dir>/evo/config.toml`)
/// 4. Built-in defaults
pub fn load_config(explicit: Option<&Path>) -> Result<EvoConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(EvoConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("ai", "evo", "evo") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("EVO_").split("__"));

    let mut config: EvoConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;

    if let Ok(raw) = std::env::var("SWARM_MAX_AGENTS") {
        if let Ok(n) = raw.trim().parse::<usize>() {
            config.swarm.max_agents = n;
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &EvoConfig) -> Result<(), ConfigError> {
    for tier in [Tier::Free, Tier::Pro, Tier::Paid, Tier::Enterprise] {
        let limits = config.tiers.limits(tier);
        if limits.swarm_max_modules == 0 {
            return Err(ConfigError::Invalid {
                message: format!("tiers.{tier}.swarm_max_modules must be at least 1"),
            });
        }
        if limits.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                message: format!("tiers.{tier}.max_tokens must be positive"),
            });
        }
    }
    if config.security.token_ttl_hours <= 0 {
        return Err(ConfigError::Invalid {
            message: "security.token_ttl_hours must be positive".to_string(),
        });
    }
    Ok(())
}
