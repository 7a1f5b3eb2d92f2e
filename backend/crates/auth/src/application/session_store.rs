//! Session Store
//!
//! Liveness is decided by the store: a session is active while it is not
//! terminated and its recorded generation is not behind its subject's.

use chrono::Utc;
use platform::client::ClientFingerprint;
use std::sync::Arc;

use crate::domain::entity::session::Session;
use crate::domain::repository::SessionRepository;
use crate::domain::value_object::{
    revocation_reason::RevocationReason, session_id::SessionId, subject_id::SubjectId,
};
use crate::error::AuthResult;

pub struct SessionStore<R> {
    repo: Arc<R>,
}

impl<R> SessionStore<R>
where
    R: SessionRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub async fn create_session(
        &self,
        subject_id: &SubjectId,
        device: &ClientFingerprint,
    ) -> AuthResult<SessionId> {
        let session = Session::new(subject_id.clone(), device);
        let generation = self.repo.create(&session).await?;

        tracing::info!(
            subject_id = %subject_id,
            session = %session.session_id,
            generation,
            "Session created"
        );
        Ok(session.session_id)
    }

    /// Returns `true` only on the transition from live to terminated
    pub async fn terminate_session(
        &self,
        session_id: &SessionId,
        reason: RevocationReason,
    ) -> AuthResult<bool> {
        let terminated = self.repo.terminate(session_id, reason).await?;
        if terminated {
            tracing::info!(session = %session_id, reason = %reason, "Session terminated");
        }
        Ok(terminated)
    }

    pub async fn terminate_all_sessions(
        &self,
        subject_id: &SubjectId,
        reason: RevocationReason,
    ) -> AuthResult<u64> {
        let count = self.repo.terminate_all_for_subject(subject_id, reason).await?;
        tracing::info!(subject_id = %subject_id, count, reason = %reason, "All sessions terminated");
        Ok(count)
    }

    pub async fn is_active(&self, session_id: &SessionId) -> AuthResult<bool> {
        self.repo.is_active(session_id).await
    }

    pub async fn get(&self, session_id: &SessionId) -> AuthResult<Option<Session>> {
        self.repo.find_by_id(session_id).await
    }

    /// Sessions with their current liveness, newest first
    pub async fn list_for_subject(&self, subject_id: &SubjectId) -> AuthResult<Vec<(Session, bool)>> {
        let sessions = self.repo.find_by_subject(subject_id).await?;
        let mut listed = Vec::with_capacity(sessions.len());
        for session in sessions {
            let active = !session.is_terminated() && self.repo.is_active(&session.session_id).await?;
            listed.push((session, active));
        }
        Ok(listed)
    }

    /// Resolve a listing handle among the subject's own sessions
    pub async fn find_by_handle(&self, subject_id: &SubjectId, handle: &str) -> AuthResult<Option<SessionId>> {
        let sessions = self.repo.find_by_subject(subject_id).await?;
        Ok(sessions
            .into_iter()
            .map(|session| session.session_id)
            .find(|id| platform::crypto::constant_time_eq(id.handle().as_bytes(), handle.as_bytes())))
    }

    /// Update `last_seen_at` in the background; failures are only logged
    pub fn touch(&self, session_id: &SessionId) {
        let repo = self.repo.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = repo.touch(&session_id, Utc::now()).await {
                tracing::warn!(session = %session_id, error = %e, "Failed to update session activity");
            }
        });
    }
}
