use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Clock skew tolerance applied to `nbf`.
const NOT_BEFORE_SKEW_SECS: i64 = 5;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub exp: i64,
    pub nbf: i64,
}

/// Signs short-lived HS256 bearer tokens from an access key pair.
///
/// Built per request from configuration; tokens are never cached.
pub struct CredentialIssuer {
    issuer_id: String,
    encoding_key: EncodingKey,
    ttl: Duration,
}

impl CredentialIssuer {
    /// Fails if either half of the key pair is absent or blank.
    pub fn new(
        issuer_id: Option<&str>,
        secret: Option<&str>,
        ttl: Duration,
    ) -> Result<Self, CredentialError> {
        let issuer_id = issuer_id
            .filter(|s| !s.trim().is_empty())
            .ok_or(CredentialError::Missing("ACCESS_KEY_ID"))?;
        let secret = secret
            .filter(|s| !s.trim().is_empty())
            .ok_or(CredentialError::Missing("ACCESS_KEY_SECRET"))?;

        Ok(Self {
            issuer_id: issuer_id.to_string(),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
        })
    }

    /// Sign a fresh token valid from now for the configured TTL.
    pub fn issue(&self) -> Result<String, CredentialError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: self.issuer_id.clone(),
            exp: now + self.ttl.as_secs() as i64,
            nbf: now - NOT_BEFORE_SKEW_SECS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(CredentialError::Sign)
    }

    /// `Authorization` header value for a fresh token.
    pub fn bearer_header(&self) -> Result<String, CredentialError> {
        Ok(format!("Bearer {}", self.issue()?))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("Failed to sign bearer token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}
