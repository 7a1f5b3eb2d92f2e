//! Token Validator
//!
//! Syntax checks on the bearer header, then signature and expiry through the
//! identity provider under a bounded timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::provider::IdentityProvider;
use crate::domain::value_object::token::VerifiedToken;
use crate::error::{AuthError, AuthResult};

const BEARER_PREFIX: &str = "Bearer ";

pub struct TokenValidator<P> {
    provider: Arc<P>,
    timeout: Duration,
}

impl<P> TokenValidator<P>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    pub fn new(provider: Arc<P>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Token part of an `Authorization: Bearer <token>` header
    pub fn extract_bearer(header: Option<&str>) -> AuthResult<&str> {
        let token = header
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .ok_or(AuthError::InvalidToken)?;

        if token.is_empty() || token.contains(char::is_whitespace) {
            return Err(AuthError::InvalidToken);
        }
        Ok(token)
    }

    /// Verify a raw token
    ///
    /// ## Errors
    /// * `InvalidToken` - malformed or bad signature (never retry)
    /// * `ExpiredToken` - refresh and retry once
    /// * `ProviderUnreachable` - timeout or transport failure (retryable)
    pub async fn validate(&self, raw_token: &str) -> AuthResult<VerifiedToken> {
        if raw_token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let decoded = tokio::time::timeout(self.timeout, self.provider.verify_token(raw_token))
            .await
            .map_err(|_| {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Token verification timed out");
                AuthError::ProviderUnreachable
            })??;

        Ok(VerifiedToken::from_decoded(raw_token, decoded))
    }
}
