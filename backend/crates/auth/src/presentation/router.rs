//! Auth Routers
//!
//! `auth_router` is mounted at `/api/auth`, `admin_router` at `/api/admin`.

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;

use crate::application::{AuthProvider, AuthServices, AuthStore, AuthorizeOptions};
use crate::domain::value_object::{permission::Permission, role::Role};
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::middleware::{AuthGuard, require_auth};

/// Sign-in flow plus the caller's own sessions
pub fn auth_router<R, P>(services: Arc<AuthServices<R, P>>) -> Router
where
    R: AuthStore,
    P: AuthProvider,
{
    // Unverified subjects may still see and manage their own sessions
    let guard = AuthGuard::new(
        services.clone(),
        AuthorizeOptions::new().skip_email_verification(),
    );

    let protected = Router::new()
        .route("/me", get(handlers::me))
        .route("/sessions", get(handlers::list_sessions::<R, P>))
        .route("/sessions/{handle}", delete(handlers::revoke_session::<R, P>))
        .route_layer(middleware::from_fn_with_state(guard, require_auth::<R, P>));

    Router::new()
        .route("/login", post(handlers::login::<R, P>))
        .route("/logout", post(handlers::logout::<R, P>))
        .route("/refresh", post(handlers::refresh::<R, P>))
        .merge(protected)
        .with_state(AuthAppState::new(services))
}

/// Role management, provisioning and audit reporting; admin only
pub fn admin_router<R, P>(services: Arc<AuthServices<R, P>>) -> Router
where
    R: AuthStore,
    P: AuthProvider,
{
    let guarded = |permission: Permission| {
        let options = AuthorizeOptions::new()
            .require_role(Role::Admin)
            .require_permission(permission);
        middleware::from_fn_with_state(
            AuthGuard::new(services.clone(), options),
            require_auth::<R, P>,
        )
    };

    let roles = Router::new()
        .route("/roles", post(handlers::promote_role::<R, P>))
        .route_layer(guarded(Permission::ManageRoles));

    let subjects = Router::new()
        .route("/subjects", post(handlers::provision::<R, P>))
        .route_layer(guarded(Permission::ManageUsers));

    let audit = Router::new()
        .route("/audit/summary", get(handlers::audit_summary::<R, P>))
        .route("/audit/patterns", get(handlers::audit_patterns::<R, P>))
        .route("/audit/alerts", get(handlers::audit_alerts::<R, P>))
        .route("/audit/failed-logins", get(handlers::failed_logins::<R, P>))
        .route_layer(guarded(Permission::ViewAuditLogs));

    let security = Router::new()
        .route("/blacklist/prune", post(handlers::prune_blacklist::<R, P>))
        .route_layer(guarded(Permission::ManageSecurity));

    Router::new()
        .merge(roles)
        .merge(subjects)
        .merge(audit)
        .merge(security)
        .with_state(AuthAppState::new(services))
}
