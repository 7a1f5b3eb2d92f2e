//! Session Entity
//!
//! One row per login on one device. Never hard-deleted: termination only
//! stamps `terminated_at` and the reason.

use chrono::{DateTime, Utc};
use platform::client::ClientFingerprint;

use crate::domain::value_object::{
    revocation_reason::RevocationReason, session_id::SessionId, subject_id::SubjectId,
};

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub subject_id: SubjectId,
    /// Hex SHA-256 of user agent + device id
    pub device_fingerprint: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<RevocationReason>,
    /// Subject generation recorded at creation; assigned by the store
    pub generation: i64,
}

impl Session {
    pub fn new(subject_id: SubjectId, device: &ClientFingerprint) -> Self {
        let now = Utc::now();

        Self {
            session_id: SessionId::generate(),
            subject_id,
            device_fingerprint: device.hash_hex(),
            client_ip: device.ip_string(),
            user_agent: device.user_agent.clone(),
            created_at: now,
            last_seen_at: now,
            terminated_at: None,
            termination_reason: None,
            generation: 0,
        }
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminated_at.is_some()
    }

    /// Liveness given the subject's current generation
    pub fn is_live(&self, current_generation: i64) -> bool {
        !self.is_terminated() && self.generation >= current_generation
    }
}

/// Device listing entry; refers to the session by its handle only
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub handle: String,
    pub device_fingerprint: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub active: bool,
    pub current: bool,
}

impl SessionInfo {
    pub fn from_session(session: &Session, active: bool, current: Option<&SessionId>) -> Self {
        Self {
            handle: session.session_id.handle(),
            device_fingerprint: session.device_fingerprint.clone(),
            client_ip: session.client_ip.clone(),
            user_agent: session.user_agent.clone(),
            created_at: session.created_at,
            last_seen_at: session.last_seen_at,
            active,
            current: current.is_some_and(|id| *id == session.session_id),
        }
    }
}
