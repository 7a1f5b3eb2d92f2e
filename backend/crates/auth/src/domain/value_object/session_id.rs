//! Session identifier
//!
//! 256 bits of OS randomness, URL-safe base64. Handled like a credential:
//! `Debug` and `Display` only ever show a short prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub const ENTROPY_BYTES: usize = 32;
    /// Length of the unpadded base64url encoding of `ENTROPY_BYTES`
    pub const ENCODED_LEN: usize = 43;

    pub fn generate() -> Self {
        Self(platform::crypto::random_token(Self::ENTROPY_BYTES))
    }

    /// Parse an untrusted value (token claim, path segment)
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == Self::ENCODED_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn from_db(raw: String) -> Self {
        Self(raw)
    }

    /// Full value; only for the wire and the store
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-secret reference for listing and revoking a session without exposing it
    pub fn handle(&self) -> String {
        let digest = platform::crypto::sha256(self.0.as_bytes());
        platform::crypto::to_hex(&digest[..8])
    }

    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("{prefix}***")
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.redacted())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
