//! Sign In Use Case
//!
//! The provider checks credentials; the core checks provisioning, opens the
//! session and asks the provider for tokens bound to it.

use platform::client::ClientFingerprint;
use std::fmt;

use crate::application::services::{AuthProvider, AuthServices, AuthStore};
use crate::domain::entity::audit_record::{AuditAction, AuditRecord, LOGIN_TARGET_PREFIX};
use crate::domain::provider::{Credentials, TokenGrant};
use crate::domain::value_object::{
    revocation_reason::RevocationReason, role::Role, session_id::SessionId, subject_id::SubjectId,
};
use crate::error::{AuthError, AuthResult};

/// Sign in output
pub struct SignInOutput {
    pub subject_id: SubjectId,
    pub role: Role,
    pub session_id: SessionId,
    pub identity_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for SignInOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInOutput")
            .field("subject_id", &self.subject_id)
            .field("role", &self.role)
            .field("session_id", &self.session_id)
            .field("identity_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

pub struct SignInUseCase<'a, R, P> {
    services: &'a AuthServices<R, P>,
}

impl<'a, R, P> SignInUseCase<'a, R, P>
where
    R: AuthStore,
    P: AuthProvider,
{
    pub fn new(services: &'a AuthServices<R, P>) -> Self {
        Self { services }
    }

    pub async fn execute(
        &self,
        credentials: Credentials,
        device: &ClientFingerprint,
    ) -> AuthResult<SignInOutput> {
        let services = self.services;

        let identity = match services
            .provider_call(services.provider.verify_credentials(&credentials))
            .await
        {
            Ok(identity) => identity,
            Err(err) => {
                let record = AuditRecord::auth_event(AuditAction::Login)
                    .with_target(format!(
                        "{LOGIN_TARGET_PREFIX}{}",
                        credentials.email.trim().to_lowercase()
                    ))
                    .with_client(device)
                    .with_error(err.code());
                services.audit.log_auth_event(record).await;
                tracing::warn!(code = err.code(), "Sign in rejected");
                return Err(err);
            }
        };
        let subject_id = identity.subject_id;

        let assignment = match services.roles.resolve_role(&subject_id).await {
            Ok(assignment) => assignment,
            Err(err) => {
                self.record_failure(&subject_id, device, &err).await;
                return Err(err);
            }
        };

        let session_id = services.sessions.create_session(&subject_id, device).await?;

        let grant = TokenGrant {
            subject_id: subject_id.clone(),
            session_id: session_id.clone(),
            role: assignment.role,
            email_verified: identity.email_verified || assignment.email_verified,
            identity_ttl: services.config.identity_ttl(),
            refresh_ttl: services.config.refresh_ttl(),
        };
        let tokens = match services
            .provider_call(services.provider.issue_tokens(&grant))
            .await
        {
            Ok(tokens) => tokens,
            Err(err) => {
                // Abandoned session; nothing was handed out for it
                if let Err(e) = services
                    .sessions
                    .terminate_session(&session_id, RevocationReason::SecurityEvent)
                    .await
                {
                    tracing::error!(
                        subject_id = %subject_id,
                        session = %session_id,
                        error = %e,
                        "Failed to terminate abandoned session"
                    );
                }
                self.record_failure(&subject_id, device, &err).await;
                return Err(err);
            }
        };

        let record = AuditRecord::auth_event(AuditAction::Login)
            .with_actor(&subject_id)
            .with_target(format!("session:{}", session_id.handle()))
            .with_client(device);
        services.audit.log_auth_event(record).await;

        tracing::info!(
            subject_id = %subject_id,
            session = %session_id,
            role = %assignment.role,
            "Subject signed in"
        );

        Ok(SignInOutput {
            subject_id,
            role: assignment.role,
            session_id,
            identity_token: tokens.identity_token,
            refresh_token: tokens.refresh_token,
        })
    }

    async fn record_failure(&self, subject_id: &SubjectId, device: &ClientFingerprint, err: &AuthError) {
        let record = AuditRecord::auth_event(AuditAction::Login)
            .with_actor(subject_id)
            .with_client(device)
            .with_error(err.code());
        self.services.audit.log_auth_event(record).await;
        tracing::warn!(subject_id = %subject_id, code = err.code(), "Sign in rejected");
    }
}
