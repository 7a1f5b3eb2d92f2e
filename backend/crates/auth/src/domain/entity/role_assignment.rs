//! Role Assignment Entity

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::domain::value_object::{
    permission::{Permission, default_permissions},
    role::Role,
    subject_id::SubjectId,
};
use crate::error::{AuthError, AuthResult};

/// The single active role of a subject, with its permission set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleAssignment {
    pub subject_id: SubjectId,
    pub role: Role,
    pub permissions: BTreeSet<Permission>,
    pub profile_complete: bool,
    pub email_verified: bool,
    pub updated_at: DateTime<Utc>,
}

impl RoleAssignment {
    pub fn new(subject_id: SubjectId, role: Role, email_verified: bool) -> Self {
        Self {
            subject_id,
            role,
            permissions: default_permissions(role).iter().copied().collect(),
            profile_complete: false,
            email_verified,
            updated_at: Utc::now(),
        }
    }

    /// Whitelist check: only an explicit grant allows
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn has_all(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(*p))
    }

    /// Move to `next`, replacing the permission set with the new role's defaults
    pub fn transition_to(&mut self, next: Role) -> AuthResult<Role> {
        if !self.role.can_transition_to(next) {
            return Err(AuthError::InvalidRoleTransition);
        }
        let previous = self.role;
        self.role = next;
        self.permissions = default_permissions(next).iter().copied().collect();
        self.updated_at = Utc::now();
        Ok(previous)
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "role": self.role,
            "permissions": self.permissions,
        })
    }
}
