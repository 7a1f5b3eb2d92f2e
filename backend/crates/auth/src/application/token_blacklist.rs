//! Token Blacklist
//!
//! Two denial mechanisms share one check: individual token hashes, and a
//! per-subject cutoff that denies every token issued at or before it.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;

use crate::domain::entity::blacklist_entry::{BlacklistEntry, SubjectRevocation};
use crate::domain::repository::BlacklistRepository;
use crate::domain::value_object::{
    revocation_reason::RevocationReason,
    subject_id::SubjectId,
    token::{TokenHash, VerifiedToken},
};
use crate::error::AuthResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    /// The token's own hash is on the blacklist
    Listed,
    /// Issued at or before the subject's revoke-all cutoff
    SubjectCutoff,
}

pub struct TokenBlacklist<R> {
    repo: Arc<R>,
    max_token_lifetime: Duration,
}

impl<R> TokenBlacklist<R>
where
    R: BlacklistRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, max_token_lifetime: Duration) -> Self {
        Self {
            repo,
            max_token_lifetime,
        }
    }

    pub async fn is_blacklisted(&self, token_hash: &TokenHash) -> AuthResult<bool> {
        self.repo.contains(token_hash).await
    }

    /// The entry for a listed hash, carrying the subject it was issued to
    pub async fn listed_entry(&self, token_hash: &TokenHash) -> AuthResult<Option<BlacklistEntry>> {
        self.repo.find_entry(token_hash).await
    }

    /// How a token is revoked, if at all; a listed hash wins over a cutoff
    pub async fn revocation(&self, token: &VerifiedToken) -> AuthResult<Option<Revocation>> {
        if self.repo.contains(&token.token_hash).await? {
            return Ok(Some(Revocation::Listed));
        }
        let cutoff = self.repo.subject_revoked_after(&token.subject_id).await?;
        Ok(cutoff
            .is_some_and(|cutoff| token.issued_at <= cutoff)
            .then_some(Revocation::SubjectCutoff))
    }

    /// Hash listed, or issued at or before the subject's latest cutoff
    pub async fn is_revoked(&self, token: &VerifiedToken) -> AuthResult<bool> {
        Ok(self.revocation(token).await?.is_some())
    }

    /// Deny a single token until its natural expiry
    ///
    /// Returns `true` only for the call that listed the hash, so a concurrent
    /// caller racing on the same token sees `false`.
    pub async fn blacklist(&self, token: &VerifiedToken, reason: RevocationReason) -> AuthResult<bool> {
        let entry = BlacklistEntry::for_token(token, reason);
        if entry.is_redundant_at(entry.blacklisted_at) {
            tracing::debug!(token = ?token.token_hash, "Skipping blacklist of expired token");
            return Ok(false);
        }

        if !self.repo.insert_entry(&entry).await? {
            return Ok(false);
        }
        tracing::info!(
            subject_id = %token.subject_id,
            kind = %token.kind,
            reason = %reason,
            "Token blacklisted"
        );
        Ok(true)
    }

    /// Deny every token issued to `subject_id` up to now, seen or not
    pub async fn blacklist_all_for_subject(
        &self,
        subject_id: &SubjectId,
        reason: RevocationReason,
    ) -> AuthResult<DateTime<Utc>> {
        // Issue times travel with microsecond precision
        let revocation = SubjectRevocation {
            subject_id: subject_id.clone(),
            revoked_after: Utc::now().trunc_subsecs(6),
            reason,
        };
        self.repo.upsert_subject_revocation(&revocation).await?;

        tracing::info!(subject_id = %subject_id, reason = %reason, "All tokens revoked for subject");
        Ok(revocation.revoked_after)
    }

    /// Drop entries whose tokens have expired anyway
    pub async fn prune(&self) -> AuthResult<u64> {
        let now = Utc::now();
        let removed = self.repo.prune(now, now - self.max_token_lifetime).await?;
        tracing::info!(removed, "Blacklist pruned");
        Ok(removed)
    }
}
