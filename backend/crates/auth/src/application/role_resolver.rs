//! Role/Permission Resolver
//!
//! Reads role assignments through a short TTL cache. Every role write goes
//! through `assign`/`provision`, which invalidate before returning.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::domain::entity::role_assignment::RoleAssignment;
use crate::domain::repository::RoleRepository;
use crate::domain::value_object::{
    permission::{Permission, route_allowed},
    subject_id::SubjectId,
};
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone)]
struct CachedRole {
    assignment: RoleAssignment,
    cached_at: Instant,
}

pub struct RoleResolver<R> {
    repo: Arc<R>,
    cache: DashMap<SubjectId, CachedRole>,
    ttl: Duration,
    /// Bumped on every invalidation; loads that raced one are not cached
    epoch: AtomicU64,
}

impl<R> RoleResolver<R>
where
    R: RoleRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, ttl: Duration) -> Self {
        Self {
            repo,
            cache: DashMap::new(),
            ttl,
            epoch: AtomicU64::new(0),
        }
    }

    /// ## Errors
    /// * `SubjectNotFound` - verified identity without an assignment
    pub async fn resolve_role(&self, subject_id: &SubjectId) -> AuthResult<RoleAssignment> {
        if let Some(hit) = self.cached(subject_id) {
            return Ok(hit);
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let assignment = self
            .repo
            .find_assignment(subject_id)
            .await?
            .ok_or(AuthError::SubjectNotFound)?;

        if self.epoch.load(Ordering::Acquire) == epoch {
            self.cache.insert(
                subject_id.clone(),
                CachedRole {
                    assignment: assignment.clone(),
                    cached_at: Instant::now(),
                },
            );
        }
        Ok(assignment)
    }

    fn cached(&self, subject_id: &SubjectId) -> Option<RoleAssignment> {
        let fresh = {
            let entry = self.cache.get(subject_id)?;
            (entry.cached_at.elapsed() < self.ttl).then(|| entry.assignment.clone())
        };
        if fresh.is_none() {
            self.cache.remove(subject_id);
        }
        fresh
    }

    /// Whitelist only; an unprovisioned subject holds nothing
    pub async fn has_permission(&self, subject_id: &SubjectId, permission: Permission) -> AuthResult<bool> {
        match self.resolve_role(subject_id).await {
            Ok(assignment) => Ok(assignment.has_permission(permission)),
            Err(AuthError::SubjectNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn validate_route_access(&self, subject_id: &SubjectId, route: &str) -> AuthResult<bool> {
        match self.resolve_role(subject_id).await {
            Ok(assignment) => Ok(route_allowed(assignment.role, route)),
            Err(AuthError::SubjectNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Role and permission claims for embedding or display
    pub async fn custom_claims(
        &self,
        subject_id: &SubjectId,
    ) -> AuthResult<BTreeMap<String, serde_json::Value>> {
        let assignment = self.resolve_role(subject_id).await?;
        let permissions: Vec<&str> = assignment.permissions.iter().map(Permission::code).collect();

        Ok(BTreeMap::from([
            ("role".to_string(), serde_json::json!(assignment.role)),
            ("permissions".to_string(), serde_json::json!(permissions)),
            ("email_verified".to_string(), serde_json::json!(assignment.email_verified)),
            ("profile_complete".to_string(), serde_json::json!(assignment.profile_complete)),
        ]))
    }

    /// Current assignment straight from the store
    pub async fn load_uncached(&self, subject_id: &SubjectId) -> AuthResult<Option<RoleAssignment>> {
        self.repo.find_assignment(subject_id).await
    }

    /// Persist a changed assignment and drop any cached copy
    pub async fn assign(&self, assignment: &RoleAssignment) -> AuthResult<()> {
        self.repo.update_assignment(assignment).await?;
        self.invalidate(&assignment.subject_id);
        Ok(())
    }

    /// Insert a first assignment; `false` if one already exists
    pub async fn provision(&self, assignment: &RoleAssignment) -> AuthResult<bool> {
        let inserted = self.repo.insert_assignment(assignment).await?;
        self.invalidate(&assignment.subject_id);
        Ok(inserted)
    }

    pub fn invalidate(&self, subject_id: &SubjectId) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cache.remove(subject_id);
        tracing::debug!(subject_id = %subject_id, "Role cache invalidated");
    }
}
