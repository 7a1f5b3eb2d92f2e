//! Auth Error Types
//!
//! Every failure the access core can produce. Each variant maps to exactly one
//! `kernel::error::ErrorKind` and one stable machine-readable code.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

use crate::domain::provider::ProviderError;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, malformed or signature-mismatched token
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    /// Token hash listed, or issued before the subject's cutoff
    #[error("Token has been revoked")]
    Blacklisted,

    #[error("Session terminated")]
    SessionTerminated,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("Insufficient role")]
    InsufficientRole,

    #[error("Insufficient permission")]
    InsufficientPermission,

    /// Transient; the only retryable variant
    #[error("Identity provider unreachable")]
    ProviderUnreachable,

    /// Identity exists at the provider but has no role assignment
    #[error("Subject not provisioned")]
    SubjectNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Subject already provisioned")]
    SubjectExists,

    /// Admin operation on a subject or session that does not exist
    #[error("Target not found")]
    TargetNotFound,

    #[error("Role transition not allowed")]
    InvalidRoleTransition,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable code sent on the wire and stored in audit records
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::ExpiredToken => "TOKEN_EXPIRED",
            AuthError::Blacklisted => "TOKEN_REVOKED",
            AuthError::SessionTerminated => "SESSION_TERMINATED",
            AuthError::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            AuthError::InsufficientRole => "INSUFFICIENT_ROLE",
            AuthError::InsufficientPermission => "INSUFFICIENT_PERMISSION",
            AuthError::ProviderUnreachable => "PROVIDER_UNREACHABLE",
            AuthError::SubjectNotFound => "SUBJECT_NOT_FOUND",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::SubjectExists => "SUBJECT_EXISTS",
            AuthError::TargetNotFound => "NOT_FOUND",
            AuthError::InvalidRoleTransition => "INVALID_ROLE_TRANSITION",
            AuthError::BadRequest(_) => "BAD_REQUEST",
            AuthError::MissingHeader(_) => "MISSING_HEADER",
            AuthError::Database(_) | AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::Blacklisted
            | AuthError::SessionTerminated
            | AuthError::InvalidCredentials => ErrorKind::Unauthorized,
            AuthError::EmailNotVerified
            | AuthError::InsufficientRole
            | AuthError::InsufficientPermission
            | AuthError::SubjectNotFound => ErrorKind::Forbidden,
            AuthError::TargetNotFound => ErrorKind::NotFound,
            AuthError::SubjectExists => ErrorKind::Conflict,
            AuthError::InvalidRoleTransition
            | AuthError::BadRequest(_)
            | AuthError::MissingHeader(_) => ErrorKind::BadRequest,
            AuthError::ProviderUnreachable => ErrorKind::ServiceUnavailable,
            AuthError::Database(_) | AuthError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::ProviderUnreachable)
    }

    /// Client hint attached to the wire body
    fn action(&self) -> Option<&'static str> {
        match self {
            AuthError::ExpiredToken => Some("refresh_token"),
            AuthError::ProviderUnreachable => Some("retry_later"),
            AuthError::EmailNotVerified => Some("verify_email"),
            AuthError::InvalidToken
            | AuthError::Blacklisted
            | AuthError::SessionTerminated => Some("sign_in"),
            _ => None,
        }
    }

    /// Convert to AppError; internal details never reach the message
    pub fn to_app_error(&self) -> AppError {
        let message = match self {
            AuthError::BadRequest(detail) => detail.clone(),
            AuthError::MissingHeader(header) => format!("Missing required header: {header}"),
            AuthError::Database(_) | AuthError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let err = AppError::new(self.kind(), message).with_code(self.code());
        match self.action() {
            Some(action) => err.with_action(action),
            None => err,
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::ProviderUnreachable => {
                tracing::warn!("Identity provider unreachable");
            }
            AuthError::Blacklisted => {
                tracing::warn!("Revoked token presented");
            }
            AuthError::SubjectNotFound => {
                tracing::warn!("Verified identity without role assignment");
            }
            _ => {
                tracing::debug!(code = self.code(), "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidToken => AuthError::InvalidToken,
            ProviderError::ExpiredToken => AuthError::ExpiredToken,
            ProviderError::InvalidCredentials => AuthError::InvalidCredentials,
            ProviderError::Unreachable(_) => AuthError::ProviderUnreachable,
            ProviderError::Internal(detail) => AuthError::Internal(detail),
        }
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        // Deserializer detail names fields and types; it stays in the logs
        tracing::debug!(detail = %rejection.body_text(), "Rejected request body");
        AuthError::BadRequest("Malformed request body".into())
    }
}

impl From<platform::client::FingerprintError> for AuthError {
    fn from(err: platform::client::FingerprintError) -> Self {
        match err {
            platform::client::FingerprintError::MissingHeader(header) => {
                AuthError::MissingHeader(header)
            }
        }
    }
}
