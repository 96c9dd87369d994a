//! Encryption and bearer-token primitives for the permission-gated actions.
//!
//! - [`SecurityManager`]: AES-256-GCM with a fixed associated-data label,
//!   hex-encoded ciphertext, nonce and tag.
//! - [`RbacManager`]: HS256 JSON Web Tokens carrying `{userId, role}`, and
//!   the role → permission table.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::config::SecurityConfig;
use crate::error::{AuthError, SecurityError};

const AAD: &[u8] = b"evo-ai-security";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Name of the cipher reported in encryption metadata.
pub const ALGORITHM: &str = "AES-256-GCM";

/// Hex-encoded output of [`SecurityManager::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub encrypted: String,
    pub key: String,
    pub iv: String,
    pub tag: String,
}

impl EncryptedData {
    /// Short key fingerprint safe to return to callers.
    pub fn key_id(&self) -> String {
        let prefix: String = self.key.chars().take(8).collect();
        format!("{prefix}...")
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecurityManager;

impl SecurityManager {
    pub fn new() -> Self {
        Self
    }

    /// Encrypt `plaintext`. A fresh random key is generated when `key_hex` is `None`.
    pub fn encrypt(
        &self,
        plaintext: &str,
        key_hex: Option<&str>,
    ) -> Result<EncryptedData, SecurityError> {
        let key = match key_hex {
            Some(hex_key) => decode_key(hex_key)?,
            None => {
                let mut key = [0u8; KEY_LEN];
                OsRng.fill_bytes(&mut key);
                key
            }
        };
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| SecurityError::InvalidKeyLength(key.len()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: AAD,
                },
            )
            .map_err(|e| SecurityError::EncryptFailed(e.to_string()))?;

        // The tag is the trailing 16 bytes of the sealed output.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(EncryptedData {
            encrypted: hex::encode(ciphertext),
            key: hex::encode(key),
            iv: hex::encode(nonce_bytes),
            tag: hex::encode(tag),
        })
    }

    /// Reverse [`SecurityManager::encrypt`]; all inputs are hex.
    pub fn decrypt(
        &self,
        encrypted: &str,
        key_hex: &str,
        iv_hex: &str,
        tag_hex: &str,
    ) -> Result<String, SecurityError> {
        let key = decode_key(key_hex)?;
        let iv = decode_field(iv_hex, "iv")?;
        if iv.len() != NONCE_LEN {
            return Err(SecurityError::DecryptFailed(format!(
                "iv must be {NONCE_LEN} bytes, got {}",
                iv.len()
            )));
        }
        let tag = decode_field(tag_hex, "tag")?;
        if tag.len() != TAG_LEN {
            return Err(SecurityError::DecryptFailed(format!(
                "tag must be {TAG_LEN} bytes, got {}",
                tag.len()
            )));
        }
        let mut sealed = decode_field(encrypted, "encrypted")?;
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| SecurityError::InvalidKeyLength(key.len()))?;
        let plain = cipher
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &sealed,
                    aad: AAD,
                },
            )
            .map_err(|e| SecurityError::DecryptFailed(e.to_string()))?;

        String::from_utf8(plain).map_err(|e| SecurityError::DecryptFailed(e.to_string()))
    }
}

fn decode_key(key_hex: &str) -> Result<[u8; KEY_LEN], SecurityError> {
    let bytes = decode_field(key_hex, "key")?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| SecurityError::InvalidKeyLength(bytes.len()))
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>, SecurityError> {
    hex::decode(value).map_err(|_| SecurityError::InvalidHex {
        field: field.to_string(),
    })
}

/// Claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub role: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Issues and verifies bearer tokens and answers permission checks.
pub struct RbacManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for RbacManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RbacManager")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RbacManager {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        let secret = secret.as_ref();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(
            config.resolve_secret().into_bytes(),
            Duration::hours(config.token_ttl_hours),
        )
    }

    /// Permissions granted to `role`. Unknown roles get none.
    pub fn permissions(role: &str) -> &'static [&'static str] {
        match role {
            "admin" => &["read", "write", "delete", "encrypt", "decrypt"],
            "user" => &["read", "write"],
            "guest" => &["read"],
            _ => &[],
        }
    }

    pub fn has_permission(&self, role: &str, permission: &str) -> bool {
        Self::permissions(role).contains(&permission)
    }

    pub fn generate_token(&self, user_id: &str, role: &str) -> Result<String, SecurityError> {
        self.generate_token_at(user_id, role, Utc::now())
    }

    /// Issue a token as if at `issued_at`.
    pub fn generate_token_at(
        &self,
        user_id: &str,
        role: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, SecurityError> {
        let claims = Claims {
            user_id: user_id.to_string(),
            role: role.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SecurityError::SigningFailed(e.to_string()))
    }

    /// Check algorithm, signature and expiry, returning the claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(decoded) => Ok(decoded.claims),
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidSignature => "signature mismatch",
                    ErrorKind::InvalidAlgorithm => "unexpected algorithm",
                    _ => "malformed token",
                };
                Err(AuthError::InvalidCredential {
                    reason: reason.to_string(),
                })
            }
        }
    }

    /// Verify an optional bearer credential and require `permission` of its role.
    pub fn authorize(&self, bearer: Option<&str>, permission: &str) -> Result<Claims, AuthError> {
        let token = bearer
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredential)?;
        let claims = self.verify_token(token)?;
        if !self.has_permission(&claims.role, permission) {
            return Err(AuthError::InsufficientPermission {
                permission: permission.to_string(),
            });
        }
        Ok(claims)
    }
}
