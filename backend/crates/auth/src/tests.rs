//! Scenario tests over the whole access core, in memory

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use platform::client::ClientFingerprint;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tower::ServiceExt;

use crate::application::{
    AuthConfig, AuthServices, AuthorizeOptions, AuthorizeUseCase, PromoteRoleUseCase,
    ProvisionInput, ProvisionUseCase, RefreshUseCase, SignInOutput, SignInUseCase, SignOutInput,
    SignOutUseCase,
};
use crate::domain::entity::audit_record::{AuditAction, AuditRecord};
use crate::domain::entity::role_assignment::RoleAssignment;
use crate::domain::provider::{
    Credentials, IdentityProvider, IssuedTokens, ProviderError, ProviderIdentity, TokenGrant,
};
use crate::domain::service::suspicious::{PatternKind, Severity, is_failed_login};
use crate::domain::value_object::{
    permission::{Permission, all_route_prefixes, route_prefixes},
    revocation_reason::RevocationReason,
    role::Role,
    subject_id::SubjectId,
    time_range::TimeRange,
    token::{DecodedToken, TokenClaims, TokenKind},
};
use crate::error::AuthError;
use crate::infra::memory::InMemoryAuthRepository;
use crate::presentation::{admin_router, auth_router};

// ============================================================================
// Fake identity provider
// ============================================================================

#[derive(Default)]
struct FakeState {
    /// email -> (password, identity)
    accounts: HashMap<String, (String, ProviderIdentity)>,
    tokens: HashMap<String, DecodedToken>,
    delay: Option<Duration>,
}

/// Identity provider double: opaque random tokens looked up in a table
#[derive(Clone, Default)]
pub struct FakeIdentityProvider {
    state: Arc<Mutex<FakeState>>,
    unreachable: Arc<AtomicBool>,
    refuse_issuing: Arc<AtomicBool>,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, email: &str, password: &str, subject_id: &SubjectId, email_verified: bool) {
        let identity = ProviderIdentity {
            subject_id: subject_id.clone(),
            email: email.to_string(),
            email_verified,
        };
        self.state
            .lock()
            .accounts
            .insert(email.to_lowercase(), (password.to_string(), identity));
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Credentials and verification keep working; minting fails
    pub fn set_refuse_issuing(&self, refuse: bool) {
        self.refuse_issuing.store(refuse, Ordering::SeqCst);
    }

    /// Register a token and return its raw form
    pub fn mint(&self, token: DecodedToken) -> String {
        let raw = format!("{}.{}", token.kind, platform::crypto::random_token(24));
        self.state.lock().tokens.insert(raw.clone(), token);
        raw
    }

    pub fn mint_identity(&self, subject_id: &SubjectId, issued_at: DateTime<Utc>) -> String {
        self.mint(DecodedToken {
            subject_id: subject_id.clone(),
            kind: TokenKind::Identity,
            issued_at,
            expires_at: issued_at + ChronoDuration::hours(1),
            claims: TokenClaims {
                email_verified: true,
                ..Default::default()
            },
        })
    }

    /// Make a known token report as expired from now on
    pub fn expire(&self, raw: &str) {
        if let Some(token) = self.state.lock().tokens.get_mut(raw) {
            token.expires_at = Utc::now() - ChronoDuration::seconds(1);
        }
    }

    async fn simulate_network(&self) -> Result<(), ProviderError> {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unreachable("connection refused".into()));
        }
        Ok(())
    }
}

impl IdentityProvider for FakeIdentityProvider {
    async fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderIdentity, ProviderError> {
        self.simulate_network().await?;

        let state = self.state.lock();
        match state.accounts.get(&credentials.email.trim().to_lowercase()) {
            Some((password, identity)) if *password == credentials.password => Ok(identity.clone()),
            _ => Err(ProviderError::InvalidCredentials),
        }
    }

    async fn verify_token(&self, raw_token: &str) -> Result<DecodedToken, ProviderError> {
        self.simulate_network().await?;

        let state = self.state.lock();
        let token = state.tokens.get(raw_token).ok_or(ProviderError::InvalidToken)?;
        if token.expires_at <= Utc::now() {
            return Err(ProviderError::ExpiredToken);
        }
        Ok(token.clone())
    }

    async fn issue_tokens(&self, grant: &TokenGrant) -> Result<IssuedTokens, ProviderError> {
        self.simulate_network().await?;
        if self.refuse_issuing.load(Ordering::SeqCst) {
            return Err(ProviderError::Unreachable("token service down".into()));
        }

        let issued_at = Utc::now();
        let claims = TokenClaims {
            session_id: Some(grant.session_id.clone()),
            email_verified: grant.email_verified,
            role: Some(grant.role),
            extra: Default::default(),
        };
        let identity_token = self.mint(DecodedToken {
            subject_id: grant.subject_id.clone(),
            kind: TokenKind::Identity,
            issued_at,
            expires_at: issued_at + grant.identity_ttl,
            claims: claims.clone(),
        });
        let refresh_token = self.mint(DecodedToken {
            subject_id: grant.subject_id.clone(),
            kind: TokenKind::Refresh,
            issued_at,
            expires_at: issued_at + grant.refresh_ttl,
            claims,
        });

        Ok(IssuedTokens {
            identity_token,
            refresh_token,
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

type Services = AuthServices<InMemoryAuthRepository, FakeIdentityProvider>;

struct Harness {
    repo: InMemoryAuthRepository,
    provider: FakeIdentityProvider,
    services: Arc<Services>,
}

impl Harness {
    fn new() -> Self {
        let repo = InMemoryAuthRepository::new();
        let provider = FakeIdentityProvider::new();
        let config = AuthConfig {
            provider_timeout: Duration::from_millis(500),
            ..AuthConfig::development()
        };
        let services = Arc::new(AuthServices::new(repo.clone(), provider.clone(), config));
        Self {
            repo,
            provider,
            services,
        }
    }

    /// Provisioned subject with a provider account `<id>@learnity.test` / `pw-<id>`
    async fn subject(&self, id: &str, role: Role, email_verified: bool) -> SubjectId {
        let subject_id = SubjectId::new(id).unwrap();
        self.provider
            .add_account(&email(id), &password(id), &subject_id, email_verified);
        let inserted = self
            .services
            .roles
            .provision(&RoleAssignment::new(subject_id.clone(), role, email_verified))
            .await
            .unwrap();
        assert!(inserted);
        subject_id
    }

    async fn login(&self, id: &str) -> SignInOutput {
        SignInUseCase::new(&self.services)
            .execute(credentials(id, &password(id)), &client())
            .await
            .unwrap()
    }

    async fn authorize(&self, token: &str, options: &AuthorizeOptions) -> Result<crate::application::AuthContext, AuthError> {
        AuthorizeUseCase::new(&self.services)
            .execute(Some(&bearer(token)), &client(), options)
            .await
    }

    fn records(&self, action: AuditAction) -> Vec<AuditRecord> {
        self.repo
            .audit_records()
            .into_iter()
            .filter(|record| record.action == action)
            .collect()
    }
}

fn email(id: &str) -> String {
    format!("{id}@learnity.test")
}

fn password(id: &str) -> String {
    format!("pw-{id}")
}

fn credentials(id: &str, password: &str) -> Credentials {
    Credentials {
        email: email(id),
        password: password.to_string(),
    }
}

fn client() -> ClientFingerprint {
    ClientFingerprint::from_parts(Some("test-agent/1.0"), None, Some("10.0.0.1".parse().unwrap()))
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_authorize_live_session_returns_token_subject() {
    let h = Harness::new();
    let u1 = h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;

    let context = h
        .authorize(&login.identity_token, &AuthorizeOptions::new())
        .await
        .unwrap();

    assert_eq!(context.subject_id(), &u1);
    assert_eq!(context.role(), Role::Student);
    assert_eq!(context.session_id(), Some(&login.session_id));
    assert!(context.has_permission(Permission::EnrollCourses));
    assert!(h.records(AuditAction::Authorize).is_empty());
}

#[tokio::test]
async fn test_student_requiring_teacher_is_insufficient_role_with_one_audit_record() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    assert!(h.services.sessions.is_active(&login.session_id).await.unwrap());

    let err = h
        .authorize(&login.identity_token, &AuthorizeOptions::new().require_role(Role::Teacher))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InsufficientRole));
    assert_eq!(err.status_code(), 403);

    let denials = h.records(AuditAction::Authorize);
    assert_eq!(denials.len(), 1);
    assert!(!denials[0].success);
    assert_eq!(denials[0].error_message.as_deref(), Some("INSUFFICIENT_ROLE"));
    assert_eq!(denials[0].actor_id.as_ref().map(SubjectId::as_str), Some("u1"));
}

#[tokio::test]
async fn test_admin_satisfies_teacher_requirement() {
    let h = Harness::new();
    h.subject("root", Role::Admin, true).await;
    let login = h.login("root").await;

    let options = AuthorizeOptions::new()
        .require_role(Role::Teacher)
        .require_permission(Permission::ViewAuditLogs);
    assert!(h.authorize(&login.identity_token, &options).await.is_ok());
}

#[tokio::test]
async fn test_missing_or_malformed_bearer_is_invalid_token() {
    let h = Harness::new();
    let use_case = AuthorizeUseCase::new(&h.services);

    let err = use_case
        .execute(None, &client(), &AuthorizeOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
    assert_eq!(err.status_code(), 401);

    let err = use_case
        .execute(Some("Bearer forged"), &client(), &AuthorizeOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
    assert_eq!(h.records(AuditAction::Authorize).len(), 2);
}

#[tokio::test]
async fn test_refresh_token_does_not_authorize() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;

    let err = h
        .authorize(&login.refresh_token, &AuthorizeOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
}

#[tokio::test]
async fn test_expired_token_is_reported_as_expired() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    h.provider.expire(&login.identity_token);

    let err = h
        .authorize(&login.identity_token, &AuthorizeOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ExpiredToken));
    assert_eq!(err.code(), "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_blacklisted_token_rejected_even_after_expiry() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;

    let output = SignOutUseCase::new(&h.services)
        .execute(
            SignOutInput {
                identity_token: Some(login.identity_token.clone()),
                ..Default::default()
            },
            &client(),
        )
        .await
        .unwrap();
    assert!(output.success);
    assert_eq!(output.sessions_terminated, 1);

    let err = h
        .authorize(&login.identity_token, &AuthorizeOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Blacklisted));

    h.provider.expire(&login.identity_token);
    let err = h
        .authorize(&login.identity_token, &AuthorizeOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Blacklisted));
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn test_expired_revoked_token_is_attributed_to_its_subject() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    SignOutUseCase::new(&h.services)
        .execute(
            SignOutInput {
                identity_token: Some(login.identity_token.clone()),
                ..Default::default()
            },
            &client(),
        )
        .await
        .unwrap();
    h.provider.expire(&login.identity_token);

    let err = h
        .authorize(&login.identity_token, &AuthorizeOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Blacklisted));

    let rejection = h.records(AuditAction::Authorize).pop().unwrap();
    assert_eq!(rejection.actor_id.as_ref().map(SubjectId::as_str), Some("u1"));

    let range = TimeRange::last(ChronoDuration::hours(1), Utc::now() + ChronoDuration::seconds(1));
    let patterns = h.services.audit.detect_suspicious_patterns(&range).await.unwrap();
    assert!(
        patterns
            .iter()
            .any(|p| p.kind == PatternKind::BlacklistedTokenUse && p.subject == "u1")
    );
    assert!(patterns.iter().all(|p| p.subject != "authorize"));
}

#[tokio::test]
async fn test_unverified_email_is_rejected_unless_skipped() {
    let h = Harness::new();
    h.subject("u1", Role::Student, false).await;
    let login = h.login("u1").await;

    let err = h
        .authorize(&login.identity_token, &AuthorizeOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::EmailNotVerified));

    let context = h
        .authorize(&login.identity_token, &AuthorizeOptions::new().skip_email_verification())
        .await
        .unwrap();
    assert!(!context.email_verified());
}

#[tokio::test]
async fn test_route_option_uses_role_table() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;

    let allowed = AuthorizeOptions::new().for_route("/courses/42");
    assert!(h.authorize(&login.identity_token, &allowed).await.is_ok());

    let denied = AuthorizeOptions::new().for_route("/dashboard/teacher");
    let err = h.authorize(&login.identity_token, &denied).await.unwrap_err();
    assert!(matches!(err, AuthError::InsufficientRole));

    let denial = h.records(AuditAction::Authorize).pop().unwrap();
    assert_eq!(denial.target_resource.as_deref(), Some("/dashboard/teacher"));
}

#[tokio::test]
async fn test_audit_failure_never_changes_the_decision() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    h.repo.fail_audit_appends(true);

    assert!(
        h.authorize(&login.identity_token, &AuthorizeOptions::new())
            .await
            .is_ok()
    );
    let err = h
        .authorize(&login.identity_token, &AuthorizeOptions::new().require_role(Role::Admin))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InsufficientRole));
    assert!(h.records(AuditAction::Authorize).is_empty());
}

#[tokio::test]
async fn test_slow_provider_is_retryable_unreachable() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    h.provider.set_delay(Duration::from_secs(2));

    let err = h
        .authorize(&login.identity_token, &AuthorizeOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnreachable));
    assert!(err.is_retryable());
}

// ============================================================================
// Sessions and blacklist
// ============================================================================

#[tokio::test]
async fn test_session_round_trip_and_idempotent_terminate() {
    let h = Harness::new();
    let u1 = h.subject("u1", Role::Student, true).await;
    let sessions = &h.services.sessions;

    let session_id = sessions.create_session(&u1, &client()).await.unwrap();
    assert!(sessions.is_active(&session_id).await.unwrap());

    assert!(sessions.terminate_session(&session_id, RevocationReason::Logout).await.unwrap());
    assert!(!sessions.terminate_session(&session_id, RevocationReason::Logout).await.unwrap());
    assert!(!sessions.is_active(&session_id).await.unwrap());
}

#[tokio::test]
async fn test_revoking_own_session_twice_audits_once() {
    let h = Harness::new();
    let u1 = h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    let handle = login.session_id.handle();
    let use_case = SignOutUseCase::new(&h.services);

    assert!(use_case.revoke_session(&u1, &handle, &client()).await.unwrap());
    assert!(!use_case.revoke_session(&u1, &handle, &client()).await.unwrap());
    assert_eq!(h.records(AuditAction::SessionRevoked).len(), 1);

    let err = h
        .authorize(&login.identity_token, &AuthorizeOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionTerminated));
}

#[tokio::test]
async fn test_foreign_session_handle_is_not_found() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let u2 = h.subject("u2", Role::Student, true).await;
    let login = h.login("u1").await;

    let err = SignOutUseCase::new(&h.services)
        .revoke_session(&u2, &login.session_id.handle(), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TargetNotFound));
    assert!(h.services.sessions.is_active(&login.session_id).await.unwrap());
}

#[tokio::test]
async fn test_terminate_all_ends_earlier_sessions_only() {
    let h = Harness::new();
    let u1 = h.subject("u1", Role::Student, true).await;
    let sessions = &h.services.sessions;

    let s1 = sessions.create_session(&u1, &client()).await.unwrap();
    let s2 = sessions.create_session(&u1, &client()).await.unwrap();

    let ended = sessions
        .terminate_all_sessions(&u1, RevocationReason::LogoutAllDevices)
        .await
        .unwrap();
    assert_eq!(ended, 2);
    assert!(!sessions.is_active(&s1).await.unwrap());
    assert!(!sessions.is_active(&s2).await.unwrap());

    let s3 = sessions.create_session(&u1, &client()).await.unwrap();
    assert!(sessions.is_active(&s3).await.unwrap());

    let listed = sessions.list_for_subject(&u1).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed.iter().filter(|(_, active)| *active).count(), 1);
}

#[tokio::test]
async fn test_blacklist_all_covers_unseen_tokens_up_to_cutoff() {
    let h = Harness::new();
    let u1 = h.subject("u1", Role::Student, true).await;
    let validator = &h.services.validator;

    let before = h.provider.mint_identity(&u1, Utc::now() - ChronoDuration::minutes(5));
    let cutoff = h
        .services
        .blacklist
        .blacklist_all_for_subject(&u1, RevocationReason::SecurityEvent)
        .await
        .unwrap();
    // Whole microseconds, matching the precision tokens carry
    assert_eq!(cutoff.timestamp_subsec_nanos() % 1_000, 0);
    let after = h.provider.mint_identity(&u1, cutoff + ChronoDuration::microseconds(1));

    let before = validator.validate(&before).await.unwrap();
    let after = validator.validate(&after).await.unwrap();
    assert!(h.services.blacklist.is_revoked(&before).await.unwrap());
    assert!(!h.services.blacklist.is_revoked(&after).await.unwrap());
    assert!(!h.services.blacklist.is_blacklisted(&before.token_hash).await.unwrap());
}

#[tokio::test]
async fn test_sessionless_token_before_cutoff_is_blacklisted() {
    let h = Harness::new();
    let u1 = h.subject("u1", Role::Student, true).await;
    let raw = h.provider.mint_identity(&u1, Utc::now() - ChronoDuration::minutes(1));
    h.services
        .blacklist
        .blacklist_all_for_subject(&u1, RevocationReason::SecurityEvent)
        .await
        .unwrap();

    let err = h.authorize(&raw, &AuthorizeOptions::new()).await.unwrap_err();
    assert!(matches!(err, AuthError::Blacklisted));
}

#[tokio::test]
async fn test_logout_all_devices_terminates_every_session() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let first = h.login("u1").await;
    let second = h.login("u1").await;

    let output = SignOutUseCase::new(&h.services)
        .execute(
            SignOutInput {
                identity_token: Some(first.identity_token.clone()),
                all_devices: true,
                ..Default::default()
            },
            &client(),
        )
        .await
        .unwrap();
    assert!(output.success);
    assert_eq!(output.sessions_terminated, 2);

    for token in [&first.identity_token, &second.identity_token] {
        let err = h.authorize(token, &AuthorizeOptions::new()).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionTerminated));
    }
    assert_eq!(h.records(AuditAction::LogoutAllDevices).len(), 1);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let again = h.login("u1").await;
    assert!(
        h.authorize(&again.identity_token, &AuthorizeOptions::new())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_logout_input_rules() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    h.subject("u2", Role::Student, true).await;
    let use_case = SignOutUseCase::new(&h.services);

    let err = use_case
        .execute(SignOutInput::default(), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BadRequest(_)));

    let output = use_case
        .execute(
            SignOutInput {
                identity_token: Some("unknown".into()),
                ..Default::default()
            },
            &client(),
        )
        .await
        .unwrap();
    assert!(!output.success);

    let a = h.login("u1").await;
    let b = h.login("u2").await;
    let err = use_case
        .execute(
            SignOutInput {
                identity_token: Some(a.identity_token),
                refresh_token: Some(b.refresh_token),
                all_devices: false,
            },
            &client(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BadRequest(_)));
}

#[tokio::test]
async fn test_prune_is_audited() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    SignOutUseCase::new(&h.services)
        .execute(
            SignOutInput {
                identity_token: Some(login.identity_token),
                refresh_token: Some(login.refresh_token),
                all_devices: false,
            },
            &client(),
        )
        .await
        .unwrap();
    assert_eq!(h.repo.blacklist_len(), 2);

    let removed = h.services.prune_blacklist(None).await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(h.repo.blacklist_len(), 2);
    assert_eq!(h.records(AuditAction::BlacklistPrune).len(), 1);
}

// ============================================================================
// Login and refresh
// ============================================================================

#[tokio::test]
async fn test_login_for_unprovisioned_subject_creates_no_session() {
    let h = Harness::new();
    let ghost = SubjectId::new("ghost").unwrap();
    h.provider
        .add_account(&email("ghost"), &password("ghost"), &ghost, true);

    let err = SignInUseCase::new(&h.services)
        .execute(credentials("ghost", &password("ghost")), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SubjectNotFound));
    assert_eq!(err.status_code(), 403);
    assert!(h.services.sessions.list_for_subject(&ghost).await.unwrap().is_empty());

    let failure = h.records(AuditAction::Login).pop().unwrap();
    assert!(!failure.success);
    assert_eq!(failure.error_message.as_deref(), Some("SUBJECT_NOT_FOUND"));
}

#[tokio::test]
async fn test_wrong_password_is_recorded_as_failed_login() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;

    let err = SignInUseCase::new(&h.services)
        .execute(
            Credentials {
                email: " U1@Learnity.TEST".into(),
                password: "nope".into(),
            },
            &client(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let failure = h.records(AuditAction::Login).pop().unwrap();
    assert!(is_failed_login(&failure));
    assert_eq!(failure.ip_address.as_deref(), Some("10.0.0.1"));
}

#[tokio::test]
async fn test_unreachable_provider_is_not_a_failed_login() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    h.provider.set_unreachable(true);

    let err = SignInUseCase::new(&h.services)
        .execute(credentials("u1", &password("u1")), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnreachable));
    assert_eq!(err.status_code(), 503);

    let failure = h.records(AuditAction::Login).pop().unwrap();
    assert!(!failure.success);
    assert!(!is_failed_login(&failure));
}

#[tokio::test]
async fn test_failed_cleanup_still_records_the_failed_login() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    h.provider.set_refuse_issuing(true);
    h.repo.fail_session_terminations(true);

    let err = SignInUseCase::new(&h.services)
        .execute(credentials("u1", &password("u1")), &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnreachable));

    let failure = h.records(AuditAction::Login).pop().unwrap();
    assert!(!failure.success);
    assert_eq!(failure.actor_id.as_ref().map(SubjectId::as_str), Some("u1"));
    assert_eq!(failure.error_message.as_deref(), Some("PROVIDER_UNREACHABLE"));
}

#[tokio::test]
async fn test_refresh_rotates_the_refresh_token() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    let use_case = RefreshUseCase::new(&h.services);

    let rotated = use_case.execute(&login.refresh_token, &client()).await.unwrap();
    assert_ne!(rotated.refresh_token, login.refresh_token);
    assert!(
        h.authorize(&rotated.identity_token, &AuthorizeOptions::new())
            .await
            .is_ok()
    );

    let err = use_case.execute(&login.refresh_token, &client()).await.unwrap_err();
    assert!(matches!(err, AuthError::Blacklisted));

    let err = use_case.execute(&login.identity_token, &client()).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));

    let refreshes = h.records(AuditAction::TokenRefresh);
    assert_eq!(refreshes.len(), 3);
    assert_eq!(refreshes.iter().filter(|record| record.success).count(), 1);
}

#[tokio::test]
async fn test_concurrent_refresh_of_one_token_rotates_once() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    h.provider.set_delay(Duration::from_millis(50));

    let first = RefreshUseCase::new(&h.services);
    let second = RefreshUseCase::new(&h.services);
    let first_client = client();
    let second_client = client();
    let (a, b) = tokio::join!(
        first.execute(&login.refresh_token, &first_client),
        second.execute(&login.refresh_token, &second_client),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(AuthError::Blacklisted)))
    );
}

#[tokio::test]
async fn test_refresh_after_logout_is_session_terminated() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    SignOutUseCase::new(&h.services)
        .execute(
            SignOutInput {
                identity_token: Some(login.identity_token.clone()),
                ..Default::default()
            },
            &client(),
        )
        .await
        .unwrap();

    let err = RefreshUseCase::new(&h.services)
        .execute(&login.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionTerminated));
}

// ============================================================================
// Roles
// ============================================================================

#[tokio::test]
async fn test_route_access_by_role() {
    let h = Harness::new();
    let student = h.subject("s", Role::Student, true).await;
    let admin = h.subject("a", Role::Admin, true).await;
    let roles = &h.services.roles;

    let student_prefixes = route_prefixes(Role::Student);
    let reserved = route_prefixes(Role::Teacher)
        .iter()
        .chain(route_prefixes(Role::Admin))
        .filter(|prefix| !student_prefixes.contains(*prefix));
    for prefix in reserved {
        assert!(!roles.validate_route_access(&student, prefix).await.unwrap(), "{prefix}");
    }

    for prefix in all_route_prefixes() {
        assert!(roles.validate_route_access(&admin, prefix).await.unwrap(), "{prefix}");
    }
}

#[tokio::test]
async fn test_promote_role_takes_effect_immediately() {
    let h = Harness::new();
    let admin = h.subject("root", Role::Admin, true).await;
    let target = h.subject("t1", Role::Teacher, true).await;
    let login = h.login("t1").await;
    let teacher_only = AuthorizeOptions::new().require_role(Role::Teacher);

    assert!(h.authorize(&login.identity_token, &teacher_only).await.is_ok());

    let assignment = PromoteRoleUseCase::new(&h.services)
        .execute(&target, Role::Student, &admin, &client())
        .await
        .unwrap();
    assert_eq!(assignment.role, Role::Student);

    let err = h.authorize(&login.identity_token, &teacher_only).await.unwrap_err();
    assert!(matches!(err, AuthError::InsufficientRole));

    let change = h.records(AuditAction::RoleChange).pop().unwrap();
    assert!(change.success);
    assert_eq!(change.old_values.as_ref().unwrap()["role"], "teacher");
    assert_eq!(change.new_values.as_ref().unwrap()["role"], "student");
    assert_eq!(change.actor_id.as_ref(), Some(&admin));
}

#[tokio::test]
async fn test_promote_role_guards() {
    let h = Harness::new();
    let admin = h.subject("root", Role::Admin, true).await;
    let student = h.subject("s1", Role::Student, true).await;
    let teacher = h.subject("t1", Role::Teacher, true).await;
    let nobody = SubjectId::new("nobody").unwrap();
    let use_case = PromoteRoleUseCase::new(&h.services);

    let err = use_case
        .execute(&teacher, Role::Admin, &student, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InsufficientRole));

    let err = use_case
        .execute(&admin, Role::Student, &admin, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidRoleTransition));

    let err = use_case
        .execute(&teacher, Role::RejectedTeacher, &admin, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidRoleTransition));

    let err = use_case
        .execute(&nobody, Role::Teacher, &admin, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TargetNotFound));
    assert_eq!(err.status_code(), 404);

    let failures = h.records(AuditAction::RoleChange);
    assert_eq!(failures.len(), 4);
    assert!(failures.iter().all(|record| !record.success));
}

#[tokio::test]
async fn test_provision_accepts_initial_roles_once() {
    let h = Harness::new();
    let use_case = ProvisionUseCase::new(&h.services);
    let new_subject = |role| ProvisionInput {
        subject_id: SubjectId::new("fresh").unwrap(),
        initial_role: role,
        email_verified: false,
    };

    let err = use_case
        .execute(new_subject(Role::Teacher), None, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidRoleTransition));

    let assignment = use_case
        .execute(new_subject(Role::PendingTeacher), None, &client())
        .await
        .unwrap();
    assert_eq!(assignment.role, Role::PendingTeacher);

    let err = use_case
        .execute(new_subject(Role::Student), None, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SubjectExists));
    assert_eq!(err.status_code(), 409);
    assert_eq!(h.records(AuditAction::SubjectProvisioned).len(), 1);
}

// ============================================================================
// Audit reporting
// ============================================================================

async fn failed_logins(h: &Harness, subject: &SubjectId, count: usize) {
    for _ in 0..count {
        let record = AuditRecord::auth_event(AuditAction::Login)
            .with_actor(subject)
            .with_client(&client())
            .with_error(AuthError::InvalidCredentials.code());
        h.services.audit.log_auth_event(record).await;
    }
}

#[tokio::test]
async fn test_five_failed_logins_raise_a_medium_pattern() {
    let h = Harness::new();
    let u2 = SubjectId::new("u2").unwrap();
    failed_logins(&h, &u2, 5).await;

    let range = TimeRange::last(ChronoDuration::hours(1), Utc::now() + ChronoDuration::seconds(1));
    let patterns = h.services.audit.detect_suspicious_patterns(&range).await.unwrap();

    let pattern = patterns
        .iter()
        .find(|p| p.kind == PatternKind::RepeatedFailedLogins)
        .unwrap();
    assert_eq!(pattern.subject, "u2");
    assert!(pattern.severity >= Severity::Medium);
    assert_eq!(pattern.count, 5);
}

#[tokio::test]
async fn test_ten_failed_logins_raise_a_high_alert() {
    let h = Harness::new();
    let u3 = SubjectId::new("u3").unwrap();
    failed_logins(&h, &u3, 10).await;

    let alerts = h.services.audit.check_for_alerts().await.unwrap();
    let alert = alerts
        .iter()
        .find(|a| a.kind == PatternKind::RepeatedFailedLogins)
        .unwrap();
    assert_eq!(alert.subject, "u3");
    assert_eq!(alert.severity, Severity::High);
}

#[tokio::test]
async fn test_summary_and_failed_login_analysis() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    h.login("u1").await;
    for _ in 0..3 {
        let _ = SignInUseCase::new(&h.services)
            .execute(credentials("u1", "wrong"), &client())
            .await;
    }

    let range = TimeRange::last(ChronoDuration::hours(1), Utc::now() + ChronoDuration::seconds(1));
    let summary = h.services.audit.get_audit_summary(&range).await.unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.failed_logins, 3);
    assert_eq!(summary.successes, 1);

    let analysis = h.services.audit.get_failed_login_analysis(&range).await.unwrap();
    assert_eq!(analysis.total, 3);
    assert_eq!(analysis.by_ip[0].key, "10.0.0.1");
    assert_eq!(analysis.by_ip[0].count, 3);
    assert_eq!(analysis.by_reason[0].key, "INVALID_CREDENTIALS");
    assert_eq!(analysis.by_subject[0].key, "login:u1@learnity.test");
}

// ============================================================================
// HTTP
// ============================================================================

fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "test-agent/1.0");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).header(header::USER_AGENT, "test-agent/1.0");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_http_login_me_and_sessions() {
    let h = Harness::new();
    h.subject("u1", Role::Student, false).await;
    let app = auth_router(h.services.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            None,
            serde_json::json!({ "email": email("u1"), "password": password("u1") }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["subjectId"], "u1");
    assert_eq!(body["role"], "student");
    let token = body["identityToken"].as_str().unwrap().to_string();

    let response = app.clone().oneshot(get_request("/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = read_json(response).await;
    assert_eq!(me["subjectId"], "u1");
    assert_eq!(me["emailVerified"], false);

    let response = app.clone().oneshot(get_request("/sessions", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = read_json(response).await;
    let sessions = listing["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["current"], true);
    let handle = sessions[0]["handle"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/sessions/{handle}"))
                .header(header::AUTHORIZATION, bearer(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["revoked"], true);

    let response = app.oneshot(get_request("/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["code"], "SESSION_TERMINATED");
}

#[tokio::test]
async fn test_http_rejections_carry_codes() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let app = auth_router(h.services.clone());

    let response = app.clone().oneshot(get_request("/me", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["code"], "INVALID_TOKEN");
    assert!(body["message"].is_string());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            None,
            serde_json::json!({ "email": email("u1"), "password": "wrong" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["code"], "INVALID_CREDENTIALS");

    let no_agent = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "email": email("u1"), "password": password("u1") }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(no_agent).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_http_malformed_body_is_bad_request_with_code() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let app = auth_router(h.services.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            None,
            serde_json::json!({ "email": email("u1") }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(!body["message"].as_str().unwrap().contains("password"));

    let untyped = Request::builder()
        .method("POST")
        .uri("/refresh")
        .header(header::USER_AGENT, "test-agent/1.0")
        .body(Body::from("refreshToken=abc"))
        .unwrap();
    let response = app.oneshot(untyped).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_http_logout_uses_bearer_when_body_is_empty() {
    let h = Harness::new();
    h.subject("u1", Role::Student, true).await;
    let login = h.login("u1").await;
    let app = auth_router(h.services.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/logout")
                .header(header::AUTHORIZATION, bearer(&login.identity_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["sessionsTerminated"], 1);
}

#[tokio::test]
async fn test_http_admin_routes_require_admin() {
    let h = Harness::new();
    h.subject("root", Role::Admin, true).await;
    h.subject("u1", Role::Student, true).await;
    h.subject("p1", Role::PendingTeacher, true).await;
    let admin = h.login("root").await;
    let student = h.login("u1").await;
    let app = admin_router(h.services.clone());

    let response = app
        .clone()
        .oneshot(get_request("/audit/summary", Some(&student.identity_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json(response).await["code"], "INSUFFICIENT_ROLE");

    let response = app
        .clone()
        .oneshot(get_request("/audit/summary", Some(&admin.identity_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(read_json(response).await["total"].as_u64().unwrap() >= 2);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/roles",
            Some(&admin.identity_token),
            serde_json::json!({ "subjectId": "p1", "role": "teacher" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["role"], "teacher");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/subjects",
            Some(&admin.identity_token),
            serde_json::json!({ "subjectId": "newcomer", "initialRole": "student" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(get_request(
            "/audit/failed-logins?from=2000-01-01T00:00:00Z&to=1999-01-01T00:00:00Z",
            Some(&admin.identity_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_request(
            "POST",
            "/blacklist/prune",
            Some(&admin.identity_token),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["removed"], 0);
}
