//! Sign Out Use Case
//!
//! Logout revokes whatever the caller can prove it holds. Tokens that no longer
//! verify are skipped: an expired token needs no blacklist entry.

use platform::client::ClientFingerprint;

use crate::application::services::{AuthProvider, AuthServices, AuthStore};
use crate::domain::entity::audit_record::{AuditAction, AuditRecord};
use crate::domain::value_object::{
    revocation_reason::RevocationReason, session_id::SessionId, subject_id::SubjectId,
    token::VerifiedToken,
};
use crate::error::{AuthError, AuthResult};

/// Sign out input
#[derive(Default)]
pub struct SignOutInput {
    pub identity_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Also end every other session and deny every earlier token of the subject
    pub all_devices: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignOutOutput {
    /// At least one presented token was verified and revoked
    pub success: bool,
    pub sessions_terminated: u64,
}

pub struct SignOutUseCase<'a, R, P> {
    services: &'a AuthServices<R, P>,
}

impl<'a, R, P> SignOutUseCase<'a, R, P>
where
    R: AuthStore,
    P: AuthProvider,
{
    pub fn new(services: &'a AuthServices<R, P>) -> Self {
        Self { services }
    }

    pub async fn execute(&self, input: SignOutInput, client: &ClientFingerprint) -> AuthResult<SignOutOutput> {
        let raw_tokens: Vec<&str> = [input.identity_token.as_deref(), input.refresh_token.as_deref()]
            .into_iter()
            .flatten()
            .filter(|token| !token.is_empty())
            .collect();
        if raw_tokens.is_empty() {
            return Err(AuthError::BadRequest("no token to sign out".into()));
        }

        let mut verified: Vec<VerifiedToken> = Vec::with_capacity(raw_tokens.len());
        for raw in raw_tokens {
            match self.services.validator.validate(raw).await {
                Ok(token) => verified.push(token),
                Err(AuthError::InvalidToken | AuthError::ExpiredToken) => {
                    tracing::debug!("Skipping unverifiable token on sign out");
                }
                Err(err) => return Err(err),
            }
        }

        let Some(subject_id) = verified.first().map(|token| token.subject_id.clone()) else {
            return Ok(SignOutOutput {
                success: false,
                sessions_terminated: 0,
            });
        };
        if verified.iter().any(|token| token.subject_id != subject_id) {
            return Err(AuthError::BadRequest("tokens belong to different subjects".into()));
        }

        let reason = if input.all_devices {
            RevocationReason::LogoutAllDevices
        } else {
            RevocationReason::Logout
        };

        let mut sessions_terminated = 0;
        if input.all_devices {
            // The subject cutoff covers every token presented here as well
            sessions_terminated += self
                .services
                .sessions
                .terminate_all_sessions(&subject_id, reason)
                .await?;
            self.services
                .blacklist
                .blacklist_all_for_subject(&subject_id, reason)
                .await?;
        } else {
            for token in &verified {
                self.services.blacklist.blacklist(token, reason).await?;
                if let Some(session_id) = token.session_id() {
                    if self.services.sessions.terminate_session(session_id, reason).await? {
                        sessions_terminated += 1;
                    }
                }
            }
        }

        let action = if input.all_devices {
            AuditAction::LogoutAllDevices
        } else {
            AuditAction::Logout
        };
        let record = AuditRecord::auth_event(action)
            .with_actor(&subject_id)
            .with_client(client)
            .with_new_values(serde_json::json!({ "sessions_terminated": sessions_terminated }));
        self.services.audit.log_auth_event(record).await;

        tracing::info!(
            subject_id = %subject_id,
            all_devices = input.all_devices,
            sessions_terminated,
            "Subject signed out"
        );

        Ok(SignOutOutput {
            success: true,
            sessions_terminated,
        })
    }

    /// End one of the caller's own sessions ("sign out that device"), by handle
    ///
    /// Returns `false` if it had already ended. Handles of other subjects are `TargetNotFound`.
    pub async fn revoke_session(
        &self,
        owner: &SubjectId,
        handle: &str,
        client: &ClientFingerprint,
    ) -> AuthResult<bool> {
        let session_id: SessionId = self
            .services
            .sessions
            .find_by_handle(owner, handle)
            .await?
            .ok_or(AuthError::TargetNotFound)?;

        let terminated = self
            .services
            .sessions
            .terminate_session(&session_id, RevocationReason::RevokedByUser)
            .await?;

        if terminated {
            let record = AuditRecord::auth_event(AuditAction::SessionRevoked)
                .with_actor(owner)
                .with_target(format!("session:{handle}"))
                .with_client(client);
            self.services.audit.log_auth_event(record).await;
        }
        Ok(terminated)
    }
}
