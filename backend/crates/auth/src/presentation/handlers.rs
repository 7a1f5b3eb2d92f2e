//! HTTP Handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use std::sync::Arc;

use platform::client::{extract_authorization, extract_fingerprint};

use crate::application::token_validator::TokenValidator;
use crate::application::{
    AuthProvider, AuthServices, AuthStore, PromoteRoleUseCase, ProvisionInput, ProvisionUseCase,
    RefreshUseCase, SignInUseCase, SignOutInput, SignOutUseCase,
};
use crate::domain::entity::session::SessionInfo;
use crate::domain::provider::Credentials;
use crate::domain::service::{
    audit_analysis::{Alert, AuditSummary, FailedLoginAnalysis},
    suspicious::SuspiciousPattern,
};
use crate::domain::value_object::subject_id::SubjectId;
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, MeResponse, PromoteRoleRequest,
    ProvisionRequest, PruneResponse, RefreshRequest, RevokeSessionResponse,
    RoleAssignmentResponse, SessionsResponse, TimeRangeQuery, TokenPairResponse,
};
use crate::presentation::middleware::{ClientInfo, CurrentAuth, JsonBody};

/// Shared state for auth handlers
pub struct AuthAppState<R, P> {
    pub services: Arc<AuthServices<R, P>>,
}

impl<R, P> AuthAppState<R, P> {
    pub fn new(services: Arc<AuthServices<R, P>>) -> Self {
        Self { services }
    }
}

impl<R, P> Clone for AuthAppState<R, P> {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
        }
    }
}

// ============================================================================
// Login
// ============================================================================

/// POST /api/auth/login
pub async fn login<R, P>(
    State(state): State<AuthAppState<R, P>>,
    headers: HeaderMap,
    ClientInfo(client): ClientInfo,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AuthResult<Json<LoginResponse>>
where
    R: AuthStore,
    P: AuthProvider,
{
    // Sessions are bound to a device, so a User-Agent is mandatory here
    let device = extract_fingerprint(&headers, client.ip)?;

    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AuthError::BadRequest("email and password are required".into()));
    }

    let credentials = Credentials {
        email: req.email,
        password: req.password,
    };

    let output = SignInUseCase::new(&state.services)
        .execute(credentials, &device)
        .await?;

    Ok(Json(output.into()))
}

// ============================================================================
// Logout
// ============================================================================

/// POST /api/auth/logout
///
/// Without an `identityToken` in the body the bearer token is used.
pub async fn logout<R, P>(
    State(state): State<AuthAppState<R, P>>,
    headers: HeaderMap,
    ClientInfo(client): ClientInfo,
    body: Option<JsonBody<LogoutRequest>>,
) -> AuthResult<Json<LogoutResponse>>
where
    R: AuthStore,
    P: AuthProvider,
{
    let req = body.map(|JsonBody(req)| req).unwrap_or_default();

    let identity_token = req.identity_token.or_else(|| {
        let authorization = extract_authorization(&headers);
        TokenValidator::<P>::extract_bearer(authorization.as_deref())
            .ok()
            .map(str::to_string)
    });

    let input = SignOutInput {
        identity_token,
        refresh_token: req.refresh_token,
        all_devices: req.all_devices,
    };

    let output = SignOutUseCase::new(&state.services)
        .execute(input, &client)
        .await?;

    Ok(Json(output.into()))
}

// ============================================================================
// Refresh
// ============================================================================

/// POST /api/auth/refresh
pub async fn refresh<R, P>(
    State(state): State<AuthAppState<R, P>>,
    ClientInfo(client): ClientInfo,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> AuthResult<Json<TokenPairResponse>>
where
    R: AuthStore,
    P: AuthProvider,
{
    let output = RefreshUseCase::new(&state.services)
        .execute(&req.refresh_token, &client)
        .await?;

    Ok(Json(output.into()))
}

// ============================================================================
// Current subject (requires authentication)
// ============================================================================

/// GET /api/auth/me
pub async fn me(CurrentAuth(context): CurrentAuth) -> Json<MeResponse> {
    Json(MeResponse::from(&context))
}

/// GET /api/auth/sessions
pub async fn list_sessions<R, P>(
    State(state): State<AuthAppState<R, P>>,
    CurrentAuth(context): CurrentAuth,
) -> AuthResult<Json<SessionsResponse>>
where
    R: AuthStore,
    P: AuthProvider,
{
    let sessions = state
        .services
        .sessions
        .list_for_subject(context.subject_id())
        .await?
        .iter()
        .map(|(session, active)| SessionInfo::from_session(session, *active, context.session_id()))
        .collect();

    Ok(Json(SessionsResponse { sessions }))
}

/// DELETE /api/auth/sessions/{handle}
pub async fn revoke_session<R, P>(
    State(state): State<AuthAppState<R, P>>,
    CurrentAuth(context): CurrentAuth,
    ClientInfo(client): ClientInfo,
    Path(handle): Path<String>,
) -> AuthResult<Json<RevokeSessionResponse>>
where
    R: AuthStore,
    P: AuthProvider,
{
    let revoked = SignOutUseCase::new(&state.services)
        .revoke_session(context.subject_id(), &handle, &client)
        .await?;

    Ok(Json(RevokeSessionResponse { revoked }))
}

// ============================================================================
// Administration (requires admin)
// ============================================================================

/// POST /api/admin/roles
pub async fn promote_role<R, P>(
    State(state): State<AuthAppState<R, P>>,
    CurrentAuth(admin): CurrentAuth,
    ClientInfo(client): ClientInfo,
    JsonBody(req): JsonBody<PromoteRoleRequest>,
) -> AuthResult<Json<RoleAssignmentResponse>>
where
    R: AuthStore,
    P: AuthProvider,
{
    let target = SubjectId::new(req.subject_id)?;

    let assignment = PromoteRoleUseCase::new(&state.services)
        .execute(&target, req.role, admin.subject_id(), &client)
        .await?;

    Ok(Json(assignment.into()))
}

/// POST /api/admin/subjects
pub async fn provision<R, P>(
    State(state): State<AuthAppState<R, P>>,
    CurrentAuth(actor): CurrentAuth,
    ClientInfo(client): ClientInfo,
    JsonBody(req): JsonBody<ProvisionRequest>,
) -> AuthResult<(StatusCode, Json<RoleAssignmentResponse>)>
where
    R: AuthStore,
    P: AuthProvider,
{
    let input = ProvisionInput {
        subject_id: SubjectId::new(req.subject_id)?,
        initial_role: req.initial_role,
        email_verified: req.email_verified,
    };

    let assignment = ProvisionUseCase::new(&state.services)
        .execute(input, Some(actor.subject_id()), &client)
        .await?;

    Ok((StatusCode::CREATED, Json(assignment.into())))
}

/// POST /api/admin/blacklist/prune
pub async fn prune_blacklist<R, P>(
    State(state): State<AuthAppState<R, P>>,
    CurrentAuth(actor): CurrentAuth,
) -> AuthResult<Json<PruneResponse>>
where
    R: AuthStore,
    P: AuthProvider,
{
    let removed = state.services.prune_blacklist(Some(actor.subject_id())).await?;
    Ok(Json(PruneResponse { removed }))
}

// ============================================================================
// Audit reporting (requires admin)
// ============================================================================

/// GET /api/admin/audit/summary
pub async fn audit_summary<R, P>(
    State(state): State<AuthAppState<R, P>>,
    Query(query): Query<TimeRangeQuery>,
) -> AuthResult<Json<AuditSummary>>
where
    R: AuthStore,
    P: AuthProvider,
{
    let range = query.into_range(Utc::now())?;
    Ok(Json(state.services.audit.get_audit_summary(&range).await?))
}

/// GET /api/admin/audit/patterns
pub async fn audit_patterns<R, P>(
    State(state): State<AuthAppState<R, P>>,
    Query(query): Query<TimeRangeQuery>,
) -> AuthResult<Json<Vec<SuspiciousPattern>>>
where
    R: AuthStore,
    P: AuthProvider,
{
    let range = query.into_range(Utc::now())?;
    Ok(Json(state.services.audit.detect_suspicious_patterns(&range).await?))
}

/// GET /api/admin/audit/alerts
pub async fn audit_alerts<R, P>(
    State(state): State<AuthAppState<R, P>>,
) -> AuthResult<Json<Vec<Alert>>>
where
    R: AuthStore,
    P: AuthProvider,
{
    Ok(Json(state.services.audit.check_for_alerts().await?))
}

/// GET /api/admin/audit/failed-logins
pub async fn failed_logins<R, P>(
    State(state): State<AuthAppState<R, P>>,
    Query(query): Query<TimeRangeQuery>,
) -> AuthResult<Json<FailedLoginAnalysis>>
where
    R: AuthStore,
    P: AuthProvider,
{
    let range = query.into_range(Utc::now())?;
    Ok(Json(state.services.audit.get_failed_login_analysis(&range).await?))
}
