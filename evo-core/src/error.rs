//! Error types for the Evo gateway core.
//!
//! Uses `thiserror` for public API error types. The top-level [`EvoError`]
//! mirrors the request taxonomy the gateway reports to callers: validation,
//! authorization, unknown actions and upstream (generation or collaborator)
//! failures, each with a fixed HTTP status.

use std::path::PathBuf;

/// Top-level error type for the Evo core library.
#[derive(Debug, thiserror::Error)]
pub enum EvoError {
    #[error("{message}")]
    Validation { message: String },

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthError),

    #[error("Unknown action: {name}")]
    UnknownAction { name: String },

    #[error("Upstream error: {0}")]
    Upstream(#[from] LlmError),

    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvoError {
    /// Shorthand for a missing or malformed payload field.
    pub fn validation(message: impl Into<String>) -> Self {
        EvoError::Validation {
            message: message.into(),
        }
    }

    /// HTTP status code this error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            EvoError::Validation { .. } | EvoError::UnknownAction { .. } => 400,
            EvoError::Authorization(auth) => auth.status_code(),
            EvoError::Upstream(_)
            | EvoError::Security(_)
            | EvoError::Config(_)
            | EvoError::Serialization(_) => 500,
        }
    }
}

/// Errors from the remote text-generation service.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("No text-generation provider is configured ({reason})")]
    NotConfigured { reason: String },
}

/// Credential failures for permission-gated actions.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No token provided")]
    MissingCredential,

    #[error("Invalid token: {reason}")]
    InvalidCredential { reason: String },

    #[error("Insufficient permissions: '{permission}' required")]
    InsufficientPermission { permission: String },
}

impl AuthError {
    /// 401 for missing/invalid credentials, 403 for a valid but under-privileged one.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::MissingCredential | AuthError::InvalidCredential { .. } => 401,
            AuthError::InsufficientPermission { .. } => 403,
        }
    }
}

/// Errors from the encryption and token primitives.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Encryption failed: {0}")]
    EncryptFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptFailed(String),

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid hex input for '{field}'")]
    InvalidHex { field: String },

    #[error("Token signing failed: {0}")]
    SigningFailed(String),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `EvoError`.
pub type Result<T> = std::result::Result<T, EvoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_is_bare_message() {
        let err = EvoError::validation("Question is required for ask_truth");
        assert_eq!(err.to_string(), "Question is required for ask_truth");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_auth_status_codes() {
        let missing: EvoError = AuthError::MissingCredential.into();
        assert_eq!(missing.status_code(), 401);

        let invalid: EvoError = AuthError::InvalidCredential {
            reason: "bad signature".into(),
        }
        .into();
        assert_eq!(invalid.status_code(), 401);

        let forbidden: EvoError = AuthError::InsufficientPermission {
            permission: "encrypt".into(),
        }
        .into();
        assert_eq!(forbidden.status_code(), 403);
        assert_eq!(
            forbidden.to_string(),
            "Authorization error: Insufficient permissions: 'encrypt' required"
        );
    }

    #[test]
    fn test_unknown_action_is_client_error() {
        let err = EvoError::UnknownAction {
            name: "teleport".into(),
        };
        assert_eq!(err.to_string(), "Unknown action: teleport");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_upstream_from_llm_error() {
        let err: EvoError = LlmError::Timeout { timeout_secs: 30 }.into();
        assert!(matches!(err, EvoError::Upstream(_)));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Upstream error: Request timed out after 30s");
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: EvoError = serde_err.into();
        assert!(matches!(err, EvoError::Serialization(_)));
    }

    #[test]
    fn test_security_error_variants() {
        let err = SecurityError::InvalidKeyLength(16);
        assert_eq!(
            err.to_string(),
            "Invalid key length: expected 32 bytes, got 16"
        );
        let err = SecurityError::InvalidHex { field: "iv".into() };
        assert_eq!(err.to_string(), "Invalid hex input for 'iv'");
    }
}
