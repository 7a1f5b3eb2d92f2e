//! Auth services container
//!
//! Built once at startup and shared behind an `Arc`; use cases borrow it per call.

use std::future::Future;
use std::sync::Arc;

use crate::application::audit_logger::AuditLogger;
use crate::application::config::AuthConfig;
use crate::application::role_resolver::RoleResolver;
use crate::application::session_store::SessionStore;
use crate::application::token_blacklist::TokenBlacklist;
use crate::application::token_validator::TokenValidator;
use crate::domain::entity::audit_record::{AuditAction, AuditRecord};
use crate::domain::provider::{IdentityProvider, ProviderError};
use crate::domain::repository::{
    AuditRepository, BlacklistRepository, RoleRepository, SessionRepository,
};
use crate::domain::value_object::subject_id::SubjectId;
use crate::error::{AuthError, AuthResult};

/// Every repository the access core needs, behind one store
pub trait AuthStore:
    SessionRepository + BlacklistRepository + RoleRepository + AuditRepository + Send + Sync + 'static
{
}

impl<T> AuthStore for T where
    T: SessionRepository
        + BlacklistRepository
        + RoleRepository
        + AuditRepository
        + Send
        + Sync
        + 'static
{
}

/// Identity provider usable from shared state
pub trait AuthProvider: IdentityProvider + Send + Sync + 'static {}

impl<T> AuthProvider for T where T: IdentityProvider + Send + Sync + 'static {}

pub struct AuthServices<R, P> {
    pub config: Arc<AuthConfig>,
    pub provider: Arc<P>,
    pub validator: TokenValidator<P>,
    pub blacklist: TokenBlacklist<R>,
    pub sessions: SessionStore<R>,
    pub roles: RoleResolver<R>,
    pub audit: AuditLogger<R>,
}

impl<R, P> AuthServices<R, P>
where
    R: AuthStore,
    P: AuthProvider,
{
    pub fn new(repo: R, provider: P, config: AuthConfig) -> Self {
        let repo = Arc::new(repo);
        let provider = Arc::new(provider);

        Self {
            validator: TokenValidator::new(provider.clone(), config.provider_timeout),
            blacklist: TokenBlacklist::new(repo.clone(), config.max_token_lifetime()),
            sessions: SessionStore::new(repo.clone()),
            roles: RoleResolver::new(repo.clone(), config.role_cache_ttl()),
            audit: AuditLogger::new(repo, &config),
            provider,
            config: Arc::new(config),
        }
    }

    /// Await a provider call under the configured timeout
    pub(crate) async fn provider_call<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> AuthResult<T> {
        match tokio::time::timeout(self.config.provider_timeout, call).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => {
                tracing::warn!("Identity provider call timed out");
                Err(AuthError::ProviderUnreachable)
            }
        }
    }

    /// Prune the blacklist and record who triggered it
    pub async fn prune_blacklist(&self, actor: Option<&SubjectId>) -> AuthResult<u64> {
        let removed = self.blacklist.prune().await?;

        let mut record = AuditRecord::admin_action(AuditAction::BlacklistPrune)
            .with_target("token_blacklist")
            .with_new_values(serde_json::json!({ "removed": removed }));
        if let Some(actor) = actor {
            record = record.with_actor(actor);
        }
        self.audit.log_admin_action(record).await;

        Ok(removed)
    }
}
