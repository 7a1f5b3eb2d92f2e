//! Token value objects
//!
//! Raw tokens never leave the request that carried them; everything persisted or
//! logged refers to a token by its SHA-256 hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::role::Role;
use super::session_id::SessionId;
use super::subject_id::SubjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Identity,
    Refresh,
}

impl TokenKind {
    pub const fn code(&self) -> &'static str {
        match self {
            TokenKind::Identity => "identity",
            TokenKind::Refresh => "refresh",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "identity" => Some(TokenKind::Identity),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// SHA-256 of the raw token; the only form a token is stored in
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    pub fn of(raw_token: &str) -> Self {
        Self(platform::crypto::sha256(raw_token.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        platform::crypto::to_hex(&self.0)
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenHash({}..)", &self.to_hex()[..12])
    }
}

/// Claims the core reads out of a verified token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenClaims {
    /// Session the token was minted for (`sid`)
    pub session_id: Option<SessionId>,
    pub email_verified: bool,
    /// Role hint embedded at issue time; never trusted over the resolver
    pub role: Option<Role>,
    /// Remaining custom claims, passed through untouched
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Provider output after signature and expiry verification
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    pub subject_id: SubjectId,
    pub kind: TokenKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claims: TokenClaims,
}

/// A decoded token together with the hash of its raw form
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    pub subject_id: SubjectId,
    pub kind: TokenKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claims: TokenClaims,
    pub token_hash: TokenHash,
}

impl VerifiedToken {
    pub fn from_decoded(raw_token: &str, decoded: DecodedToken) -> Self {
        Self {
            subject_id: decoded.subject_id,
            kind: decoded.kind,
            issued_at: decoded.issued_at,
            expires_at: decoded.expires_at,
            claims: decoded.claims,
            token_hash: TokenHash::of(raw_token),
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.claims.session_id.as_ref()
    }
}
