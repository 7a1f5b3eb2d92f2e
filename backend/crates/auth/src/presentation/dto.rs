//! API DTOs (Data Transfer Objects)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::application::{AuthContext, RefreshOutput, SignInOutput, SignOutOutput};
use crate::domain::entity::role_assignment::RoleAssignment;
use crate::domain::entity::session::SessionInfo;
use crate::domain::value_object::{permission::Permission, role::Role, time_range::TimeRange};
use crate::error::AuthResult;

// ============================================================================
// Login
// ============================================================================

/// Login request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub subject_id: String,
    pub role: Role,
    pub identity_token: String,
    pub refresh_token: String,
}

impl From<SignInOutput> for LoginResponse {
    fn from(output: SignInOutput) -> Self {
        Self {
            subject_id: output.subject_id.as_str().to_string(),
            role: output.role,
            identity_token: output.identity_token,
            refresh_token: output.refresh_token,
        }
    }
}

// ============================================================================
// Logout
// ============================================================================

/// Logout request; the identity token may come from the `Authorization` header instead
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub identity_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub all_devices: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub success: bool,
    pub sessions_terminated: u64,
}

impl From<SignOutOutput> for LogoutResponse {
    fn from(output: SignOutOutput) -> Self {
        Self {
            success: output.success,
            sessions_terminated: output.sessions_terminated,
        }
    }
}

// ============================================================================
// Refresh
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub identity_token: String,
    pub refresh_token: String,
}

impl From<RefreshOutput> for TokenPairResponse {
    fn from(output: RefreshOutput) -> Self {
        Self {
            identity_token: output.identity_token,
            refresh_token: output.refresh_token,
        }
    }
}

// ============================================================================
// Current subject
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub subject_id: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub email_verified: bool,
    pub expires_at_ms: i64,
}

impl From<&AuthContext> for MeResponse {
    fn from(context: &AuthContext) -> Self {
        Self {
            subject_id: context.subject_id().as_str().to_string(),
            role: context.role(),
            permissions: context.permissions().iter().copied().collect(),
            email_verified: context.email_verified(),
            expires_at_ms: context.expires_at().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionResponse {
    pub revoked: bool,
}

// ============================================================================
// Administration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteRoleRequest {
    pub subject_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub subject_id: String,
    pub initial_role: Role,
    #[serde(default)]
    pub email_verified: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentResponse {
    pub subject_id: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub email_verified: bool,
    pub profile_complete: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<RoleAssignment> for RoleAssignmentResponse {
    fn from(assignment: RoleAssignment) -> Self {
        Self {
            subject_id: assignment.subject_id.as_str().to_string(),
            role: assignment.role,
            permissions: assignment.permissions.into_iter().collect(),
            email_verified: assignment.email_verified,
            profile_complete: assignment.profile_complete,
            updated_at: assignment.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneResponse {
    pub removed: u64,
}

// ============================================================================
// Audit reporting
// ============================================================================

/// Report range query; RFC 3339 bounds, defaulting to the last 24 hours
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeRangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRangeQuery {
    pub const DEFAULT_SPAN_HOURS: i64 = 24;

    pub fn into_range(self, now: DateTime<Utc>) -> AuthResult<TimeRange> {
        let end = self.to.unwrap_or(now);
        let start = self
            .from
            .unwrap_or_else(|| end - Duration::hours(Self::DEFAULT_SPAN_HOURS));
        TimeRange::new(start, end)
    }
}
