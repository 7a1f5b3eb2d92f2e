//! In-memory Repository Implementation
//!
//! Same semantics as the PostgreSQL repository, for tests and local development.
//! Locks are never held across an await point.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::entity::{
    audit_record::AuditRecord,
    blacklist_entry::{BlacklistEntry, SubjectRevocation},
    role_assignment::RoleAssignment,
    session::Session,
};
use crate::domain::repository::{
    AuditRepository, BlacklistRepository, RoleRepository, SessionRepository,
};
use crate::domain::value_object::{
    revocation_reason::RevocationReason, session_id::SessionId, subject_id::SubjectId,
    time_range::TimeRange, token::TokenHash,
};
use crate::error::{AuthError, AuthResult};

#[derive(Default)]
struct State {
    sessions: HashMap<SessionId, Session>,
    generations: HashMap<SubjectId, i64>,
    blacklist: HashMap<TokenHash, BlacklistEntry>,
    revocations: HashMap<SubjectId, SubjectRevocation>,
    roles: HashMap<SubjectId, RoleAssignment>,
    audit: Vec<AuditRecord>,
}

impl State {
    fn generation_of(&self, subject_id: &SubjectId) -> i64 {
        self.generations.get(subject_id).copied().unwrap_or(0)
    }
}

/// In-memory auth repository; clones share state
#[derive(Clone, Default)]
pub struct InMemoryAuthRepository {
    state: Arc<Mutex<State>>,
    fail_audit: Arc<AtomicBool>,
    fail_terminations: Arc<AtomicBool>,
}

impl InMemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every audit append fail, to exercise the fallback path
    pub fn fail_audit_appends(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    /// Make single-session termination fail
    pub fn fail_session_terminations(&self, fail: bool) {
        self.fail_terminations.store(fail, Ordering::SeqCst);
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.state.lock().audit.clone()
    }

    pub fn blacklist_len(&self) -> usize {
        self.state.lock().blacklist.len()
    }
}

impl SessionRepository for InMemoryAuthRepository {
    async fn create(&self, session: &Session) -> AuthResult<i64> {
        let mut state = self.state.lock();
        if state.sessions.contains_key(&session.session_id) {
            return Err(AuthError::Internal("session id collision".into()));
        }
        let generation = state.generation_of(&session.subject_id);
        let mut stored = session.clone();
        stored.generation = generation;
        state.sessions.insert(stored.session_id.clone(), stored);
        Ok(generation)
    }

    async fn find_by_id(&self, session_id: &SessionId) -> AuthResult<Option<Session>> {
        Ok(self.state.lock().sessions.get(session_id).cloned())
    }

    async fn find_by_subject(&self, subject_id: &SubjectId) -> AuthResult<Vec<Session>> {
        let state = self.state.lock();
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.subject_id == *subject_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn is_active(&self, session_id: &SessionId) -> AuthResult<bool> {
        let state = self.state.lock();
        Ok(state
            .sessions
            .get(session_id)
            .is_some_and(|s| s.is_live(state.generation_of(&s.subject_id))))
    }

    async fn terminate(&self, session_id: &SessionId, reason: RevocationReason) -> AuthResult<bool> {
        if self.fail_terminations.load(Ordering::SeqCst) {
            return Err(AuthError::Internal("session store unavailable".into()));
        }
        let mut state = self.state.lock();
        match state.sessions.get_mut(session_id) {
            Some(session) if !session.is_terminated() => {
                session.terminated_at = Some(Utc::now());
                session.termination_reason = Some(reason);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn terminate_all_for_subject(
        &self,
        subject_id: &SubjectId,
        reason: RevocationReason,
    ) -> AuthResult<u64> {
        let mut state = self.state.lock();
        let generation = state.generation_of(subject_id) + 1;
        state.generations.insert(subject_id.clone(), generation);

        let now = Utc::now();
        let mut count = 0;
        for session in state.sessions.values_mut() {
            if session.subject_id == *subject_id && !session.is_terminated() && session.generation < generation {
                session.terminated_at = Some(now);
                session.termination_reason = Some(reason);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn touch(&self, session_id: &SessionId, at: DateTime<Utc>) -> AuthResult<()> {
        if let Some(session) = self.state.lock().sessions.get_mut(session_id) {
            session.last_seen_at = session.last_seen_at.max(at);
        }
        Ok(())
    }
}

impl BlacklistRepository for InMemoryAuthRepository {
    async fn insert_entry(&self, entry: &BlacklistEntry) -> AuthResult<bool> {
        match self.state.lock().blacklist.entry(entry.token_hash) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                Ok(true)
            }
        }
    }

    async fn contains(&self, token_hash: &TokenHash) -> AuthResult<bool> {
        Ok(self.state.lock().blacklist.contains_key(token_hash))
    }

    async fn find_entry(&self, token_hash: &TokenHash) -> AuthResult<Option<BlacklistEntry>> {
        Ok(self.state.lock().blacklist.get(token_hash).cloned())
    }

    async fn upsert_subject_revocation(&self, revocation: &SubjectRevocation) -> AuthResult<()> {
        let mut state = self.state.lock();
        match state.revocations.get_mut(&revocation.subject_id) {
            Some(existing) if existing.revoked_after >= revocation.revoked_after => {}
            Some(existing) => *existing = revocation.clone(),
            None => {
                state
                    .revocations
                    .insert(revocation.subject_id.clone(), revocation.clone());
            }
        }
        Ok(())
    }

    async fn subject_revoked_after(&self, subject_id: &SubjectId) -> AuthResult<Option<DateTime<Utc>>> {
        Ok(self
            .state
            .lock()
            .revocations
            .get(subject_id)
            .map(|r| r.revoked_after))
    }

    async fn prune(&self, now: DateTime<Utc>, cutoff_floor: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.state.lock();
        let before = state.blacklist.len() + state.revocations.len();
        state.blacklist.retain(|_, entry| entry.expires_at > now);
        state.revocations.retain(|_, r| r.revoked_after >= cutoff_floor);
        Ok((before - state.blacklist.len() - state.revocations.len()) as u64)
    }
}

impl RoleRepository for InMemoryAuthRepository {
    async fn find_assignment(&self, subject_id: &SubjectId) -> AuthResult<Option<RoleAssignment>> {
        Ok(self.state.lock().roles.get(subject_id).cloned())
    }

    async fn insert_assignment(&self, assignment: &RoleAssignment) -> AuthResult<bool> {
        let mut state = self.state.lock();
        if state.roles.contains_key(&assignment.subject_id) {
            return Ok(false);
        }
        state.roles.insert(assignment.subject_id.clone(), assignment.clone());
        Ok(true)
    }

    async fn update_assignment(&self, assignment: &RoleAssignment) -> AuthResult<()> {
        self.state
            .lock()
            .roles
            .insert(assignment.subject_id.clone(), assignment.clone());
        Ok(())
    }
}

impl AuditRepository for InMemoryAuthRepository {
    async fn append(&self, record: &AuditRecord) -> AuthResult<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(AuthError::Internal("audit store unavailable".into()));
        }
        self.state.lock().audit.push(record.clone());
        Ok(())
    }

    async fn find_in_range(&self, range: &TimeRange) -> AuthResult<Vec<AuditRecord>> {
        let mut records: Vec<AuditRecord> = self
            .state
            .lock()
            .audit
            .iter()
            .filter(|r| range.contains(r.timestamp))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}
