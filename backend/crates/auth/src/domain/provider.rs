//! Identity Provider Port
//!
//! The external identity provider owns credentials and token signatures.
//! The core only decides what to do with its answers.

use chrono::Duration;
use std::fmt;

use crate::domain::value_object::{
    role::Role, session_id::SessionId, subject_id::SubjectId, token::DecodedToken,
};

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub subject_id: SubjectId,
    pub email: String,
    pub email_verified: bool,
}

/// What to bind into a freshly minted token pair
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub subject_id: SubjectId,
    pub session_id: SessionId,
    pub role: Role,
    pub email_verified: bool,
    pub identity_ttl: Duration,
    pub refresh_ttl: Duration,
}

#[derive(Clone)]
pub struct IssuedTokens {
    pub identity_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for IssuedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IssuedTokens([REDACTED])")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("token rejected by identity provider")]
    InvalidToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("credentials rejected by identity provider")]
    InvalidCredentials,

    #[error("identity provider unreachable: {0}")]
    Unreachable(String),

    /// Local key or configuration fault; retrying cannot help
    #[error("identity provider internal error: {0}")]
    Internal(String),
}

/// Identity provider trait
#[trait_variant::make(IdentityProvider: Send)]
pub trait LocalIdentityProvider {
    async fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderIdentity, ProviderError>;

    /// Verify signature and expiry
    async fn verify_token(&self, raw_token: &str) -> Result<DecodedToken, ProviderError>;

    async fn issue_tokens(&self, grant: &TokenGrant) -> Result<IssuedTokens, ProviderError>;
}
