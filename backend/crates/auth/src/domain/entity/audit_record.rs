//! Audit Record Entity
//!
//! Append-only. Built with the `with_*` methods and handed to the audit logger.

use chrono::{DateTime, Utc};
use kernel::id::AuditRecordId;
use platform::client::ClientFingerprint;
use serde::Serialize;
use std::fmt;

use crate::domain::value_object::subject_id::SubjectId;

/// Target prefix of a login attempt, followed by the normalized email
pub const LOGIN_TARGET_PREFIX: &str = "login:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditRecordType {
    AuthEvent,
    AdminAction,
}

impl AuditRecordType {
    pub const fn code(&self) -> &'static str {
        match self {
            AuditRecordType::AuthEvent => "auth_event",
            AuditRecordType::AdminAction => "admin_action",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "auth_event" => Some(AuditRecordType::AuthEvent),
            "admin_action" => Some(AuditRecordType::AdminAction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Logout,
    LogoutAllDevices,
    TokenRefresh,
    Authorize,
    SessionRevoked,
    RoleChange,
    SubjectProvisioned,
    BlacklistPrune,
}

impl AuditAction {
    pub const ALL: [AuditAction; 9] = [
        AuditAction::Login,
        AuditAction::Logout,
        AuditAction::LogoutAllDevices,
        AuditAction::TokenRefresh,
        AuditAction::Authorize,
        AuditAction::SessionRevoked,
        AuditAction::RoleChange,
        AuditAction::SubjectProvisioned,
        AuditAction::BlacklistPrune,
    ];

    pub const fn code(&self) -> &'static str {
        use AuditAction::*;
        match self {
            Login => "login",
            Logout => "logout",
            LogoutAllDevices => "logout_all_devices",
            TokenRefresh => "token_refresh",
            Authorize => "authorize",
            SessionRevoked => "session_revoked",
            RoleChange => "role_change",
            SubjectProvisioned => "subject_provisioned",
            BlacklistPrune => "blacklist_prune",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.code() == code)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub record_type: AuditRecordType,
    pub actor_id: Option<SubjectId>,
    pub action: AuditAction,
    pub target_resource: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_fingerprint: Option<String>,
    pub success: bool,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl AuditRecord {
    pub fn new(record_type: AuditRecordType, action: AuditAction) -> Self {
        Self {
            id: AuditRecordId::new(),
            timestamp: Utc::now(),
            record_type,
            actor_id: None,
            action,
            target_resource: None,
            ip_address: None,
            user_agent: None,
            device_fingerprint: None,
            success: true,
            old_values: None,
            new_values: None,
            error_message: None,
        }
    }

    pub fn auth_event(action: AuditAction) -> Self {
        Self::new(AuditRecordType::AuthEvent, action)
    }

    pub fn admin_action(action: AuditAction) -> Self {
        Self::new(AuditRecordType::AdminAction, action)
    }

    pub fn with_actor(mut self, actor_id: &SubjectId) -> Self {
        self.actor_id = Some(actor_id.clone());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_resource = Some(target.into());
        self
    }

    /// IP, user agent and device hash from the request fingerprint
    pub fn with_client(mut self, client: &ClientFingerprint) -> Self {
        self.ip_address = client.ip_string();
        self.user_agent = client.user_agent.clone();
        self.device_fingerprint = Some(client.hash_hex());
        self
    }

    pub fn with_change(
        mut self,
        old_values: serde_json::Value,
        new_values: serde_json::Value,
    ) -> Self {
        self.old_values = Some(old_values);
        self.new_values = Some(new_values);
        self
    }

    pub fn with_new_values(mut self, new_values: serde_json::Value) -> Self {
        self.new_values = Some(new_values);
        self
    }

    /// Marks the record failed
    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        self.error_message = Some(error_message.into());
        self.success = false;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Who the record is about: the actor, else the attempted login
    /// (`login:<email>` for failed logins of unknown subjects)
    pub fn subject_key(&self) -> Option<&str> {
        self.actor_id.as_ref().map(SubjectId::as_str).or_else(|| {
            self.target_resource
                .as_deref()
                .filter(|target| target.starts_with(LOGIN_TARGET_PREFIX))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_error_marks_failure() {
        let record = AuditRecord::auth_event(AuditAction::Authorize).with_error("INVALID_TOKEN");
        assert!(!record.success);
        assert_eq!(record.error_message.as_deref(), Some("INVALID_TOKEN"));
    }

    #[test]
    fn test_subject_key_prefers_actor() {
        let actor = SubjectId::new("u1").unwrap();
        let record = AuditRecord::auth_event(AuditAction::Login)
            .with_actor(&actor)
            .with_target("login:u1@example.com");
        assert_eq!(record.subject_key(), Some("u1"));

        let anonymous = AuditRecord::auth_event(AuditAction::Login).with_target("login:x@y.z");
        assert_eq!(anonymous.subject_key(), Some("login:x@y.z"));
    }

    #[test]
    fn test_route_target_is_not_a_subject() {
        let record = AuditRecord::auth_event(AuditAction::Authorize)
            .with_target("authorize")
            .with_error("TOKEN_REVOKED");
        assert_eq!(record.subject_key(), None);

        let routed = AuditRecord::auth_event(AuditAction::Authorize).with_target("/courses");
        assert_eq!(routed.subject_key(), None);
    }

    #[test]
    fn test_action_codes_roundtrip() {
        for action in AuditAction::ALL {
            assert_eq!(AuditAction::from_code(action.code()), Some(action));
        }
    }

    #[test]
    fn test_serializes_type_field() {
        let json = serde_json::to_value(AuditRecord::admin_action(AuditAction::RoleChange)).unwrap();
        assert_eq!(json["type"], "admin_action");
        assert_eq!(json["action"], "role_change");
    }
}
