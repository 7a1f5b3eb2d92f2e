use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a session ended or a token was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Logout,
    LogoutAllDevices,
    RevokedByUser,
    /// Refresh token replaced by a newer one
    Rotated,
    SecurityEvent,
    RoleChange,
    AdminAction,
}

impl RevocationReason {
    pub const ALL: [RevocationReason; 7] = [
        RevocationReason::Logout,
        RevocationReason::LogoutAllDevices,
        RevocationReason::RevokedByUser,
        RevocationReason::Rotated,
        RevocationReason::SecurityEvent,
        RevocationReason::RoleChange,
        RevocationReason::AdminAction,
    ];

    pub const fn code(&self) -> &'static str {
        use RevocationReason::*;
        match self {
            Logout => "logout",
            LogoutAllDevices => "logout_all_devices",
            RevokedByUser => "revoked_by_user",
            Rotated => "rotated",
            SecurityEvent => "security_event",
            RoleChange => "role_change",
            AdminAction => "admin_action",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|reason| reason.code() == code)
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
