use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, AuthResult};

/// Opaque subject identifier issued by the identity provider
///
/// Never generated or mutated here; only carried and compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub const MAX_LEN: usize = 128;

    pub fn new(raw: impl Into<String>) -> AuthResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > Self::MAX_LEN {
            return Err(AuthError::BadRequest("Invalid subject identifier".to_string()));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(AuthError::BadRequest("Invalid subject identifier".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Trusted value read back from the store
    pub fn from_db(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
