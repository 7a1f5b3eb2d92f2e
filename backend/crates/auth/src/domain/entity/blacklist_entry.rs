//! Blacklist Entities

use chrono::{DateTime, Utc};

use crate::domain::value_object::{
    revocation_reason::RevocationReason,
    subject_id::SubjectId,
    token::{TokenHash, TokenKind, VerifiedToken},
};

/// A single denied token, kept only until the token would have expired anyway
#[derive(Debug, Clone)]
pub struct BlacklistEntry {
    pub token_hash: TokenHash,
    pub token_kind: TokenKind,
    pub subject_id: SubjectId,
    pub reason: RevocationReason,
    pub blacklisted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BlacklistEntry {
    pub fn for_token(token: &VerifiedToken, reason: RevocationReason) -> Self {
        Self {
            token_hash: token.token_hash,
            token_kind: token.kind,
            subject_id: token.subject_id.clone(),
            reason,
            blacklisted_at: Utc::now(),
            expires_at: token.expires_at,
        }
    }

    pub fn is_redundant_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Per-subject cutoff: every token issued at or before `revoked_after` is denied
#[derive(Debug, Clone)]
pub struct SubjectRevocation {
    pub subject_id: SubjectId,
    pub revoked_after: DateTime<Utc>,
    pub reason: RevocationReason,
}
