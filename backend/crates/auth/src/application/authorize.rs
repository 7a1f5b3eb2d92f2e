//! Authorize Use Case
//!
//! The single pass/fail decision for protected operations. Steps run in a fixed
//! order and stop at the first failure:
//!
//! 1. bearer extraction
//! 2. token validation
//! 3. blacklist (token hash)
//! 4. session liveness (when the token names a session), then the subject cutoff
//! 5. email verification (skippable)
//! 6. role, permission and route requirements

use chrono::{DateTime, Utc};
use platform::client::ClientFingerprint;
use std::collections::BTreeSet;

use crate::application::services::{AuthProvider, AuthServices, AuthStore};
use crate::application::token_blacklist::Revocation;
use crate::application::token_validator::TokenValidator;
use crate::domain::entity::audit_record::{AuditAction, AuditRecord};
use crate::domain::value_object::{
    permission::{Permission, route_allowed},
    role::Role,
    session_id::SessionId,
    subject_id::SubjectId,
    token::{TokenHash, TokenKind, VerifiedToken},
};
use crate::error::{AuthError, AuthResult};

/// Caller requirements for one authorization decision
#[derive(Debug, Clone, Default)]
pub struct AuthorizeOptions {
    /// Empty means any provisioned role
    pub required_roles: Vec<Role>,
    /// Must be set when more than one role is listed
    pub allow_multiple_roles: bool,
    /// All must be held
    pub required_permissions: Vec<Permission>,
    pub skip_email_verification: bool,
    /// Checked against the role route table when present
    pub route: Option<String>,
}

impl AuthorizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_role(mut self, role: Role) -> Self {
        self.required_roles = vec![role];
        self.allow_multiple_roles = false;
        self
    }

    pub fn require_any_role(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.required_roles = roles.into_iter().collect();
        self.allow_multiple_roles = true;
        self
    }

    pub fn require_permission(mut self, permission: Permission) -> Self {
        self.required_permissions.push(permission);
        self
    }

    pub fn skip_email_verification(mut self) -> Self {
        self.skip_email_verification = true;
        self
    }

    pub fn for_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn validate(&self) -> AuthResult<()> {
        if self.required_roles.len() > 1 && !self.allow_multiple_roles {
            return Err(AuthError::BadRequest(
                "several required roles given without allow_multiple_roles".into(),
            ));
        }
        if self.route.as_deref().is_some_and(|route| !route.starts_with('/')) {
            return Err(AuthError::BadRequest("route must be an absolute path".into()));
        }
        Ok(())
    }

    /// Admin satisfies any role requirement
    fn role_satisfied(&self, role: Role) -> bool {
        self.required_roles.is_empty() || role.is_admin() || self.required_roles.contains(&role)
    }
}

/// Identity attached to a request after a successful decision. Never refreshed mid-request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    subject_id: SubjectId,
    role: Role,
    permissions: BTreeSet<Permission>,
    session_id: Option<SessionId>,
    email_verified: bool,
    token_hash: TokenHash,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl AuthContext {
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    pub fn token_hash(&self) -> &TokenHash {
        &self.token_hash
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

pub struct AuthorizeUseCase<'a, R, P> {
    services: &'a AuthServices<R, P>,
}

impl<'a, R, P> AuthorizeUseCase<'a, R, P>
where
    R: AuthStore,
    P: AuthProvider,
{
    pub fn new(services: &'a AuthServices<R, P>) -> Self {
        Self { services }
    }

    /// Run the pipeline. A rejection appends exactly one failed audit record.
    pub async fn execute(
        &self,
        authorization: Option<&str>,
        client: &ClientFingerprint,
        options: &AuthorizeOptions,
    ) -> AuthResult<AuthContext> {
        options.validate()?;

        let mut subject = None;
        match self.run(authorization, options, &mut subject).await {
            Ok(context) => Ok(context),
            Err(err) => {
                self.record_rejection(&err, subject.as_ref(), client, options).await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        authorization: Option<&str>,
        options: &AuthorizeOptions,
        subject: &mut Option<SubjectId>,
    ) -> AuthResult<AuthContext> {
        let raw_token = TokenValidator::<P>::extract_bearer(authorization)?;

        let token = self.validate(raw_token, subject).await?;
        *subject = Some(token.subject_id.clone());

        let revocation = self.services.blacklist.revocation(&token).await?;
        if revocation == Some(Revocation::Listed) {
            return Err(AuthError::Blacklisted);
        }

        if let Some(session_id) = token.session_id() {
            if !self.services.sessions.is_active(session_id).await? {
                return Err(AuthError::SessionTerminated);
            }
        }

        // Cutoff-revoked tokens whose session is still live, or that carry none
        if revocation.is_some() {
            return Err(AuthError::Blacklisted);
        }

        if !options.skip_email_verification && !token.claims.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        let assignment = self.services.roles.resolve_role(&token.subject_id).await?;
        if !options.role_satisfied(assignment.role) {
            return Err(AuthError::InsufficientRole);
        }
        if !assignment.has_all(&options.required_permissions) {
            return Err(AuthError::InsufficientPermission);
        }
        if let Some(route) = options.route.as_deref() {
            if !route_allowed(assignment.role, route) {
                return Err(AuthError::InsufficientRole);
            }
        }

        if let Some(session_id) = token.session_id() {
            self.services.sessions.touch(session_id);
        }

        Ok(AuthContext {
            subject_id: token.subject_id,
            role: assignment.role,
            permissions: assignment.permissions,
            session_id: token.claims.session_id,
            email_verified: token.claims.email_verified,
            token_hash: token.token_hash,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
        })
    }

    /// Validator step; only identity tokens authorize requests.
    ///
    /// A token that fails validation but whose hash is blacklisted reports
    /// `Blacklisted`, so a revoked token is never told apart by its expiry.
    /// The subject recorded with the entry becomes the rejection's actor.
    async fn validate(&self, raw_token: &str, subject: &mut Option<SubjectId>) -> AuthResult<VerifiedToken> {
        match self.services.validator.validate(raw_token).await {
            Ok(token) if token.kind == TokenKind::Identity => Ok(token),
            Ok(_) => Err(AuthError::InvalidToken),
            Err(err @ (AuthError::InvalidToken | AuthError::ExpiredToken)) => {
                match self.services.blacklist.listed_entry(&TokenHash::of(raw_token)).await? {
                    Some(entry) => {
                        *subject = Some(entry.subject_id);
                        Err(AuthError::Blacklisted)
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn record_rejection(
        &self,
        err: &AuthError,
        subject: Option<&SubjectId>,
        client: &ClientFingerprint,
        options: &AuthorizeOptions,
    ) {
        let mut record = AuditRecord::auth_event(AuditAction::Authorize)
            .with_target(options.route.clone().unwrap_or_else(|| "authorize".to_string()))
            .with_client(client)
            .with_error(err.code());
        if let Some(subject) = subject {
            record = record.with_actor(subject);
        }

        match err {
            AuthError::Blacklisted => {
                tracing::warn!(subject_id = ?subject.map(SubjectId::as_str), "Revoked token presented");
            }
            _ => {
                tracing::debug!(code = err.code(), subject_id = ?subject.map(SubjectId::as_str), "Authorization rejected");
            }
        }
        self.services.audit.log_auth_event(record).await;
    }
}
