//! Repository Traits
//!
//! Interfaces for data persistence. Implementations live in the infrastructure layer.

use chrono::{DateTime, Utc};

use crate::domain::entity::{
    audit_record::AuditRecord,
    blacklist_entry::{BlacklistEntry, SubjectRevocation},
    role_assignment::RoleAssignment,
    session::Session,
};
use crate::domain::value_object::{
    revocation_reason::RevocationReason, session_id::SessionId, subject_id::SubjectId,
    time_range::TimeRange, token::TokenHash,
};
use crate::error::AuthResult;

/// Session repository trait
#[trait_variant::make(SessionRepository: Send)]
pub trait LocalSessionRepository {
    /// Insert a session stamped with the subject's current generation; returns that generation
    async fn create(&self, session: &Session) -> AuthResult<i64>;

    async fn find_by_id(&self, session_id: &SessionId) -> AuthResult<Option<Session>>;

    /// All sessions of a subject, newest first, terminated ones included
    async fn find_by_subject(&self, subject_id: &SubjectId) -> AuthResult<Vec<Session>>;

    /// Not terminated and not behind the subject's generation
    async fn is_active(&self, session_id: &SessionId) -> AuthResult<bool>;

    /// Set `terminated_at`; `false` if already terminated or absent
    async fn terminate(
        &self,
        session_id: &SessionId,
        reason: RevocationReason,
    ) -> AuthResult<bool>;

    /// Bump the generation and terminate every older live session; returns how many were terminated
    async fn terminate_all_for_subject(
        &self,
        subject_id: &SubjectId,
        reason: RevocationReason,
    ) -> AuthResult<u64>;

    /// Update `last_seen_at`
    async fn touch(&self, session_id: &SessionId, at: DateTime<Utc>) -> AuthResult<()>;
}

/// Token blacklist repository trait
#[trait_variant::make(BlacklistRepository: Send)]
pub trait LocalBlacklistRepository {
    /// Insert unless the hash is already listed; returns whether this call inserted it
    async fn insert_entry(&self, entry: &BlacklistEntry) -> AuthResult<bool>;

    async fn contains(&self, token_hash: &TokenHash) -> AuthResult<bool>;

    async fn find_entry(&self, token_hash: &TokenHash) -> AuthResult<Option<BlacklistEntry>>;

    /// Record a cutoff; never moves an existing cutoff backwards
    async fn upsert_subject_revocation(&self, revocation: &SubjectRevocation) -> AuthResult<()>;

    async fn subject_revoked_after(
        &self,
        subject_id: &SubjectId,
    ) -> AuthResult<Option<DateTime<Utc>>>;

    /// Delete entries expired at `now` and cutoffs older than `cutoff_floor`
    async fn prune(&self, now: DateTime<Utc>, cutoff_floor: DateTime<Utc>) -> AuthResult<u64>;
}

/// Role assignment repository trait
#[trait_variant::make(RoleRepository: Send)]
pub trait LocalRoleRepository {
    async fn find_assignment(&self, subject_id: &SubjectId) -> AuthResult<Option<RoleAssignment>>;

    /// Insert unless the subject already has an assignment; returns whether it was inserted
    async fn insert_assignment(&self, assignment: &RoleAssignment) -> AuthResult<bool>;

    async fn update_assignment(&self, assignment: &RoleAssignment) -> AuthResult<()>;
}

/// Audit record repository trait
#[trait_variant::make(AuditRepository: Send)]
pub trait LocalAuditRepository {
    async fn append(&self, record: &AuditRecord) -> AuthResult<()>;

    /// Records with timestamp inside `range`, oldest first
    async fn find_in_range(&self, range: &TimeRange) -> AuthResult<Vec<AuditRecord>>;
}
