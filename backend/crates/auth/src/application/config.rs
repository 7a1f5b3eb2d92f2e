//! Application Configuration
//!
//! Configuration for the Auth application layer.

use std::time::Duration;

use crate::domain::service::suspicious::{AuditRules, Severity};

/// Upper bound for how long a cached role may be served
pub const MAX_ROLE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Auth application configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// `iss` claim minted into and required from tokens
    pub issuer: String,
    /// `aud` claim minted into and required from tokens
    pub audience: String,
    /// HS256 key for locally minted tokens (32 bytes)
    pub token_signing_secret: [u8; 32],
    /// Identity token TTL (1 hour)
    pub identity_token_ttl: Duration,
    /// Refresh token TTL (30 days)
    pub refresh_token_ttl: Duration,
    /// Bound on every identity provider call
    pub provider_timeout: Duration,
    /// Role cache TTL; clamped to `MAX_ROLE_CACHE_TTL`
    pub role_cache_ttl: Duration,
    pub audit_rules: AuditRules,
    /// Lookback used by `check_for_alerts`
    pub alert_window: Duration,
    pub alert_min_severity: Severity,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "learnity".to_string(),
            audience: "learnity-api".to_string(),
            token_signing_secret: [0u8; 32],
            identity_token_ttl: Duration::from_secs(3600),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 3600),
            provider_timeout: Duration::from_secs(5),
            role_cache_ttl: Duration::from_secs(30),
            audit_rules: AuditRules::default(),
            alert_window: Duration::from_secs(3600),
            alert_min_severity: Severity::Medium,
        }
    }
}

impl AuthConfig {
    /// Create config with a random signing secret
    pub fn with_random_secret() -> Self {
        Self {
            token_signing_secret: platform::crypto::random_array::<32>(),
            ..Default::default()
        }
    }

    /// Create config for development
    pub fn development() -> Self {
        Self {
            issuer: "learnity-dev".to_string(),
            ..Self::with_random_secret()
        }
    }

    pub fn role_cache_ttl(&self) -> Duration {
        self.role_cache_ttl.min(MAX_ROLE_CACHE_TTL)
    }

    pub fn identity_ttl(&self) -> chrono::Duration {
        to_chrono(self.identity_token_ttl)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        to_chrono(self.refresh_token_ttl)
    }

    /// Longest lifetime any issued token can have; subject cutoffs older than this are moot
    pub fn max_token_lifetime(&self) -> chrono::Duration {
        to_chrono(self.identity_token_ttl.max(self.refresh_token_ttl))
    }

    pub fn alert_window(&self) -> chrono::Duration {
        to_chrono(self.alert_window)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
