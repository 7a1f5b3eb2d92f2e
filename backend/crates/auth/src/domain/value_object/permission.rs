//! Capability tags and the static role tables
//!
//! Both tables are data, not scattered literals: every grant and every
//! route prefix a role can reach is listed here and nowhere else.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "courses:read")]
    ViewCourses,
    #[serde(rename = "courses:enroll")]
    EnrollCourses,
    #[serde(rename = "courses:manage")]
    ManageOwnCourses,
    #[serde(rename = "sessions:join")]
    JoinLiveSessions,
    #[serde(rename = "sessions:host")]
    HostLiveSessions,
    #[serde(rename = "messages:send")]
    SendMessages,
    #[serde(rename = "quests:participate")]
    ParticipateQuests,
    #[serde(rename = "wallet:use")]
    UseWallet,
    #[serde(rename = "wallet:payout")]
    ReceivePayouts,
    #[serde(rename = "teacher_application:submit")]
    ApplyAsTeacher,
    #[serde(rename = "teacher_application:read")]
    ViewApplicationStatus,
    #[serde(rename = "teacher_application:review")]
    ReviewApplications,
    #[serde(rename = "users:manage")]
    ManageUsers,
    #[serde(rename = "roles:manage")]
    ManageRoles,
    #[serde(rename = "audit:read")]
    ViewAuditLogs,
    #[serde(rename = "security:manage")]
    ManageSecurity,
}

impl Permission {
    pub const ALL: [Permission; 16] = [
        Permission::ViewCourses,
        Permission::EnrollCourses,
        Permission::ManageOwnCourses,
        Permission::JoinLiveSessions,
        Permission::HostLiveSessions,
        Permission::SendMessages,
        Permission::ParticipateQuests,
        Permission::UseWallet,
        Permission::ReceivePayouts,
        Permission::ApplyAsTeacher,
        Permission::ViewApplicationStatus,
        Permission::ReviewApplications,
        Permission::ManageUsers,
        Permission::ManageRoles,
        Permission::ViewAuditLogs,
        Permission::ManageSecurity,
    ];

    pub const fn code(&self) -> &'static str {
        use Permission::*;
        match self {
            ViewCourses => "courses:read",
            EnrollCourses => "courses:enroll",
            ManageOwnCourses => "courses:manage",
            JoinLiveSessions => "sessions:join",
            HostLiveSessions => "sessions:host",
            SendMessages => "messages:send",
            ParticipateQuests => "quests:participate",
            UseWallet => "wallet:use",
            ReceivePayouts => "wallet:payout",
            ApplyAsTeacher => "teacher_application:submit",
            ViewApplicationStatus => "teacher_application:read",
            ReviewApplications => "teacher_application:review",
            ManageUsers => "users:manage",
            ManageRoles => "roles:manage",
            ViewAuditLogs => "audit:read",
            ManageSecurity => "security:manage",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

use Permission::*;

const STUDENT_PERMISSIONS: &[Permission] = &[
    ViewCourses,
    EnrollCourses,
    JoinLiveSessions,
    SendMessages,
    ParticipateQuests,
    UseWallet,
    ApplyAsTeacher,
];

const TEACHER_PERMISSIONS: &[Permission] = &[
    ViewCourses,
    ManageOwnCourses,
    JoinLiveSessions,
    HostLiveSessions,
    SendMessages,
    UseWallet,
    ReceivePayouts,
];

const PENDING_TEACHER_PERMISSIONS: &[Permission] = &[ViewCourses, ViewApplicationStatus];

const REJECTED_TEACHER_PERMISSIONS: &[Permission] =
    &[ViewCourses, ViewApplicationStatus, ApplyAsTeacher];

/// Grants a role carries by default
pub fn default_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Student => STUDENT_PERMISSIONS,
        Role::Teacher => TEACHER_PERMISSIONS,
        Role::PendingTeacher => PENDING_TEACHER_PERMISSIONS,
        Role::RejectedTeacher => REJECTED_TEACHER_PERMISSIONS,
        Role::Admin => &Permission::ALL,
    }
}

/// Route prefixes per role. Admin is additionally allowed on every prefix listed here.
pub const ROUTE_TABLE: &[(Role, &[&str])] = &[
    (
        Role::Student,
        &[
            "/dashboard/student",
            "/courses",
            "/sessions",
            "/messages",
            "/quests",
            "/wallet",
            "/notifications",
            "/profile",
        ],
    ),
    (
        Role::Teacher,
        &[
            "/dashboard/teacher",
            "/courses",
            "/sessions",
            "/messages",
            "/wallet",
            "/notifications",
            "/profile",
        ],
    ),
    (
        Role::PendingTeacher,
        &["/application", "/notifications", "/profile"],
    ),
    (Role::RejectedTeacher, &["/application", "/profile"]),
    (Role::Admin, &["/dashboard/admin", "/admin"]),
];

/// Prefixes listed for `role` itself
pub fn route_prefixes(role: Role) -> &'static [&'static str] {
    ROUTE_TABLE
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, prefixes)| *prefixes)
        .unwrap_or(&[])
}

/// Every prefix in the table, deduplicated
pub fn all_route_prefixes() -> Vec<&'static str> {
    let mut all: Vec<&'static str> = ROUTE_TABLE
        .iter()
        .flat_map(|(_, prefixes)| prefixes.iter().copied())
        .collect();
    all.sort_unstable();
    all.dedup();
    all
}

/// Segment-aware prefix match: `/courses` matches `/courses` and `/courses/1`, not `/coursesx`
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Strip query/fragment and trailing slash; reject relative or traversing paths
fn normalize_route(route: &str) -> Option<&str> {
    let path = route.split(['?', '#']).next().unwrap_or("");
    if !path.starts_with('/') || path.split('/').any(|segment| segment == "..") {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    Some(if trimmed.is_empty() { "/" } else { trimmed })
}

/// Whether `role` may reach `route`. Unknown routes are denied.
pub fn route_allowed(role: Role, route: &str) -> bool {
    let Some(path) = normalize_route(route) else {
        return false;
    };

    if role.is_admin() {
        return all_route_prefixes()
            .into_iter()
            .any(|prefix| matches_prefix(path, prefix));
    }

    route_prefixes(role)
        .iter()
        .any(|prefix| matches_prefix(path, prefix))
}
