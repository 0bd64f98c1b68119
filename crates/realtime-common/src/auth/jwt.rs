//! JWT verification for handshake credentials
//!
//! Decodes and validates HMAC-signed bearer tokens using the `jsonwebtoken` crate.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (the identity the connection acts as)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Optional space separated scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Claims {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// Whether `scope` lists the given entry
    #[must_use]
    pub fn has_scope(&self, wanted: &str) -> bool {
        self.scope
            .as_deref()
            .is_some_and(|scopes| scopes.split_whitespace().any(|s| s == wanted))
    }
}

/// Token verification errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Failed to encode token")]
    Encode,
}

/// Verifies (and, for tooling and tests, issues) HMAC JWTs
#[derive(Clone)]
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for `subject` valid for `ttl_seconds`
    pub fn issue(
        &self,
        subject: &str,
        scope: Option<&str>,
        ttl_seconds: i64,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
            scope: scope.map(str::to_string),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|_| TokenError::Encode)
    }

    /// Decode and validate a token
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        Ok(token_data.claims)
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}
