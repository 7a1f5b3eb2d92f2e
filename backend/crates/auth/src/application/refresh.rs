//! Refresh Use Case
//!
//! Trades a refresh token for a new token pair on the same session. The old
//! refresh token is blacklisted before the new pair is minted, so each one is
//! usable once even under concurrent replay.

use platform::client::ClientFingerprint;
use std::fmt;

use crate::application::services::{AuthProvider, AuthServices, AuthStore};
use crate::application::token_blacklist::Revocation;
use crate::domain::entity::audit_record::{AuditAction, AuditRecord};
use crate::domain::provider::TokenGrant;
use crate::domain::value_object::{
    revocation_reason::RevocationReason,
    subject_id::SubjectId,
    token::{TokenKind, VerifiedToken},
};
use crate::error::{AuthError, AuthResult};

pub struct RefreshOutput {
    pub identity_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for RefreshOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshOutput([REDACTED])")
    }
}

pub struct RefreshUseCase<'a, R, P> {
    services: &'a AuthServices<R, P>,
}

impl<'a, R, P> RefreshUseCase<'a, R, P>
where
    R: AuthStore,
    P: AuthProvider,
{
    pub fn new(services: &'a AuthServices<R, P>) -> Self {
        Self { services }
    }

    pub async fn execute(&self, refresh_token: &str, client: &ClientFingerprint) -> AuthResult<RefreshOutput> {
        let mut subject = None;
        let result = self.run(refresh_token, &mut subject).await;

        let mut record = AuditRecord::auth_event(AuditAction::TokenRefresh).with_client(client);
        if let Some(subject) = &subject {
            record = record.with_actor(subject);
        }
        if let Err(err) = &result {
            record = record.with_error(err.code());
        }
        self.services.audit.log_auth_event(record).await;

        result
    }

    async fn run(&self, raw_token: &str, subject: &mut Option<SubjectId>) -> AuthResult<RefreshOutput> {
        let services = self.services;
        let raw_token = raw_token.trim();
        if raw_token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let token: VerifiedToken = services.validator.validate(raw_token).await?;
        *subject = Some(token.subject_id.clone());
        if token.kind != TokenKind::Refresh {
            return Err(AuthError::InvalidToken);
        }

        // Same precedence as authorize: listed hash, then session, then cutoff
        let revocation = services.blacklist.revocation(&token).await?;
        if revocation == Some(Revocation::Listed) {
            return Err(AuthError::Blacklisted);
        }
        let session_id = token.session_id().ok_or(AuthError::InvalidToken)?;
        if !services.sessions.is_active(session_id).await? {
            return Err(AuthError::SessionTerminated);
        }
        if revocation.is_some() {
            return Err(AuthError::Blacklisted);
        }

        let assignment = services.roles.resolve_role(&token.subject_id).await?;
        let grant = TokenGrant {
            subject_id: token.subject_id.clone(),
            session_id: session_id.clone(),
            role: assignment.role,
            email_verified: token.claims.email_verified || assignment.email_verified,
            identity_ttl: services.config.identity_ttl(),
            refresh_ttl: services.config.refresh_ttl(),
        };

        // Claim the presented token before minting; a concurrent replay loses here
        if !services.blacklist.blacklist(&token, RevocationReason::Rotated).await? {
            return Err(AuthError::Blacklisted);
        }
        let tokens = services
            .provider_call(services.provider.issue_tokens(&grant))
            .await?;

        tracing::debug!(subject_id = %token.subject_id, session = %session_id, "Tokens refreshed");
        Ok(RefreshOutput {
            identity_token: tokens.identity_token,
            refresh_token: tokens.refresh_token,
        })
    }
}
