//! Authorization resolvers
//!
//! A bearer token is read from the `Authorization` header, falling back to a cookie.
//! No token at all is "missing" (401); a token that cannot be used is "invalid" (403).

use super::Credential;
use crate::error::RouterError;
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum_extra::headers::{authorization::Bearer, Authorization, Cookie, HeaderMapExt};
use realtime_common::{TokenError, TokenVerifier};

/// Authorization failures at handshake time
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No credentials were presented")]
    Missing,

    #[error("{0}")]
    Invalid(String),
}

impl From<AuthError> for RouterError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing => Self::AuthMissing,
            AuthError::Invalid(reason) => Self::AuthInvalid(reason),
        }
    }
}

/// Resolves handshake headers into a credential
#[async_trait]
pub trait AuthorizationResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Credential, AuthError>;
}

/// Accepts any bearer token as an opaque credential
#[derive(Debug, Clone)]
pub struct HeaderTokenResolver {
    cookie_name: String,
}

impl HeaderTokenResolver {
    #[must_use]
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }

    /// Raw token from the headers
    pub fn extract(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        match headers.typed_try_get::<Authorization<Bearer>>() {
            Ok(Some(Authorization(bearer))) => {
                let token = bearer.token().trim();
                if token.is_empty() {
                    return Err(AuthError::Invalid("Empty bearer token".to_string()));
                }
                return Ok(token.to_string());
            }
            Ok(None) => {}
            Err(_) => {
                return Err(AuthError::Invalid(
                    "Authorization header is not a bearer token".to_string(),
                ))
            }
        }

        headers
            .typed_get::<Cookie>()
            .and_then(|cookie| cookie.get(&self.cookie_name).map(str::to_string))
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::Missing)
    }
}

impl Default for HeaderTokenResolver {
    fn default() -> Self {
        Self::new("token")
    }
}

#[async_trait]
impl AuthorizationResolver for HeaderTokenResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Credential, AuthError> {
        self.extract(headers).map(Credential::token)
    }
}

/// Accepts only bearer tokens that verify as JWTs
#[derive(Debug, Clone)]
pub struct JwtResolver {
    headers: HeaderTokenResolver,
    verifier: TokenVerifier,
}

impl JwtResolver {
    #[must_use]
    pub fn new(headers: HeaderTokenResolver, verifier: TokenVerifier) -> Self {
        Self { headers, verifier }
    }
}

#[async_trait]
impl AuthorizationResolver for JwtResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Credential, AuthError> {
        let token = self.headers.extract(headers)?;

        let claims = self.verifier.verify(&token).map_err(|e| match e {
            TokenError::Expired => AuthError::Invalid("Token expired".to_string()),
            TokenError::Invalid | TokenError::Encode => {
                AuthError::Invalid("Token could not be verified".to_string())
            }
        })?;

        Ok(Credential::token(token)
            .with_subject(claims.sub)
            .with_scope(claims.scope))
    }
}
