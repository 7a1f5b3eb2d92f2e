//! PostgreSQL Repository Implementations

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::{
    audit_record::{AuditAction, AuditRecord, AuditRecordType},
    blacklist_entry::{BlacklistEntry, SubjectRevocation},
    role_assignment::RoleAssignment,
    session::Session,
};
use crate::domain::repository::{
    AuditRepository, BlacklistRepository, RoleRepository, SessionRepository,
};
use crate::domain::value_object::{
    permission::Permission, revocation_reason::RevocationReason, role::Role,
    session_id::SessionId, subject_id::SubjectId, time_range::TimeRange,
    token::{TokenHash, TokenKind},
};
use crate::error::{AuthError, AuthResult};

/// PostgreSQL-backed auth repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Session Repository Implementation
// ============================================================================

impl SessionRepository for PgAuthRepository {
    async fn create(&self, session: &Session) -> AuthResult<i64> {
        // Generation is read inside the insert; a concurrent bump leaves this row behind it
        let generation: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO auth_sessions (
                session_id,
                subject_id,
                device_fingerprint,
                client_ip,
                user_agent,
                created_at,
                last_seen_at,
                generation
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                COALESCE(
                    (SELECT generation FROM subject_session_generations WHERE subject_id = $2),
                    0
                )
            )
            RETURNING generation
            "#,
        )
        .bind(session.session_id.as_str())
        .bind(session.subject_id.as_str())
        .bind(&session.device_fingerprint)
        .bind(&session.client_ip)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.last_seen_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(generation)
    }

    async fn find_by_id(&self, session_id: &SessionId) -> AuthResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id,
                subject_id,
                device_fingerprint,
                client_ip,
                user_agent,
                created_at,
                last_seen_at,
                terminated_at,
                termination_reason,
                generation
            FROM auth_sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn find_by_subject(&self, subject_id: &SubjectId) -> AuthResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id,
                subject_id,
                device_fingerprint,
                client_ip,
                user_agent,
                created_at,
                last_seen_at,
                terminated_at,
                termination_reason,
                generation
            FROM auth_sessions
            WHERE subject_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(subject_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    async fn is_active(&self, session_id: &SessionId) -> AuthResult<bool> {
        let active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM auth_sessions s
                LEFT JOIN subject_session_generations g ON g.subject_id = s.subject_id
                WHERE s.session_id = $1
                  AND s.terminated_at IS NULL
                  AND s.generation >= COALESCE(g.generation, 0)
            )
            "#,
        )
        .bind(session_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(active)
    }

    async fn terminate(&self, session_id: &SessionId, reason: RevocationReason) -> AuthResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET terminated_at = $2, termination_reason = $3
            WHERE session_id = $1 AND terminated_at IS NULL
            "#,
        )
        .bind(session_id.as_str())
        .bind(Utc::now())
        .bind(reason.code())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn terminate_all_for_subject(
        &self,
        subject_id: &SubjectId,
        reason: RevocationReason,
    ) -> AuthResult<u64> {
        let mut tx = self.pool.begin().await?;

        let generation: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO subject_session_generations (subject_id, generation)
            VALUES ($1, 1)
            ON CONFLICT (subject_id)
            DO UPDATE SET generation = subject_session_generations.generation + 1
            RETURNING generation
            "#,
        )
        .bind(subject_id.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let terminated = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET terminated_at = $2, termination_reason = $3
            WHERE subject_id = $1
              AND terminated_at IS NULL
              AND generation < $4
            "#,
        )
        .bind(subject_id.as_str())
        .bind(Utc::now())
        .bind(reason.code())
        .bind(generation)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(terminated)
    }

    async fn touch(&self, session_id: &SessionId, at: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query(
            "UPDATE auth_sessions SET last_seen_at = GREATEST(last_seen_at, $2) WHERE session_id = $1",
        )
        .bind(session_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Blacklist Repository Implementation
// ============================================================================

impl BlacklistRepository for PgAuthRepository {
    async fn insert_entry(&self, entry: &BlacklistEntry) -> AuthResult<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO token_blacklist (
                token_hash,
                token_kind,
                subject_id,
                reason,
                blacklisted_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(entry.token_hash.as_bytes().as_slice())
        .bind(entry.token_kind.code())
        .bind(entry.subject_id.as_str())
        .bind(entry.reason.code())
        .bind(entry.blacklisted_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(inserted == 1)
    }

    async fn contains(&self, token_hash: &TokenHash) -> AuthResult<bool> {
        let listed: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM token_blacklist WHERE token_hash = $1)",
        )
        .bind(token_hash.as_bytes().as_slice())
        .fetch_one(&self.pool)
        .await?;

        Ok(listed)
    }

    async fn find_entry(&self, token_hash: &TokenHash) -> AuthResult<Option<BlacklistEntry>> {
        let row = sqlx::query_as::<_, BlacklistRow>(
            r#"
            SELECT
                token_kind,
                subject_id,
                reason,
                blacklisted_at,
                expires_at
            FROM token_blacklist
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_entry(*token_hash)).transpose()
    }

    async fn upsert_subject_revocation(&self, revocation: &SubjectRevocation) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subject_revocations (subject_id, revoked_after, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (subject_id) DO UPDATE
            SET revoked_after = EXCLUDED.revoked_after, reason = EXCLUDED.reason
            WHERE subject_revocations.revoked_after < EXCLUDED.revoked_after
            "#,
        )
        .bind(revocation.subject_id.as_str())
        .bind(revocation.revoked_after)
        .bind(revocation.reason.code())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn subject_revoked_after(&self, subject_id: &SubjectId) -> AuthResult<Option<DateTime<Utc>>> {
        let cutoff: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT revoked_after FROM subject_revocations WHERE subject_id = $1",
        )
        .bind(subject_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(cutoff)
    }

    async fn prune(&self, now: DateTime<Utc>, cutoff_floor: DateTime<Utc>) -> AuthResult<u64> {
        let mut tx = self.pool.begin().await?;

        let tokens = sqlx::query("DELETE FROM token_blacklist WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let cutoffs = sqlx::query("DELETE FROM subject_revocations WHERE revoked_after < $1")
            .bind(cutoff_floor)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(tokens + cutoffs)
    }
}

// ============================================================================
// Role Repository Implementation
// ============================================================================

impl RoleRepository for PgAuthRepository {
    async fn find_assignment(&self, subject_id: &SubjectId) -> AuthResult<Option<RoleAssignment>> {
        let row = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            SELECT
                subject_id,
                role,
                permissions,
                profile_complete,
                email_verified,
                updated_at
            FROM role_assignments
            WHERE subject_id = $1
            "#,
        )
        .bind(subject_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RoleAssignmentRow::into_assignment).transpose()
    }

    async fn insert_assignment(&self, assignment: &RoleAssignment) -> AuthResult<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO role_assignments (
                subject_id,
                role,
                permissions,
                profile_complete,
                email_verified,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (subject_id) DO NOTHING
            "#,
        )
        .bind(assignment.subject_id.as_str())
        .bind(assignment.role.id())
        .bind(permission_codes(assignment))
        .bind(assignment.profile_complete)
        .bind(assignment.email_verified)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(inserted == 1)
    }

    async fn update_assignment(&self, assignment: &RoleAssignment) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO role_assignments (
                subject_id,
                role,
                permissions,
                profile_complete,
                email_verified,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (subject_id) DO UPDATE SET
                role = EXCLUDED.role,
                permissions = EXCLUDED.permissions,
                profile_complete = EXCLUDED.profile_complete,
                email_verified = EXCLUDED.email_verified,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(assignment.subject_id.as_str())
        .bind(assignment.role.id())
        .bind(permission_codes(assignment))
        .bind(assignment.profile_complete)
        .bind(assignment.email_verified)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn permission_codes(assignment: &RoleAssignment) -> Vec<String> {
    assignment
        .permissions
        .iter()
        .map(|p| p.code().to_string())
        .collect()
}

// ============================================================================
// Audit Repository Implementation
// ============================================================================

impl AuditRepository for PgAuthRepository {
    async fn append(&self, record: &AuditRecord) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_records (
                id,
                occurred_at,
                record_type,
                actor_id,
                action,
                target_resource,
                ip_address,
                user_agent,
                device_fingerprint,
                success,
                old_values,
                new_values,
                error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.timestamp)
        .bind(record.record_type.code())
        .bind(record.actor_id.as_ref().map(SubjectId::as_str))
        .bind(record.action.code())
        .bind(&record.target_resource)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(&record.device_fingerprint)
        .bind(record.success)
        .bind(&record.old_values)
        .bind(&record.new_values)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_in_range(&self, range: &TimeRange) -> AuthResult<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRecordRow>(
            r#"
            SELECT
                id,
                occurred_at,
                record_type,
                actor_id,
                action,
                target_resource,
                ip_address,
                user_agent,
                device_fingerprint,
                success,
                old_values,
                new_values,
                error_message
            FROM audit_records
            WHERE occurred_at BETWEEN $1 AND $2
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditRecordRow::into_record).collect()
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    subject_id: String,
    device_fingerprint: String,
    client_ip: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    terminated_at: Option<DateTime<Utc>>,
    termination_reason: Option<String>,
    generation: i64,
}

impl SessionRow {
    fn into_session(self) -> AuthResult<Session> {
        let termination_reason = self
            .termination_reason
            .map(|code| {
                RevocationReason::from_code(&code)
                    .ok_or_else(|| AuthError::Internal(format!("Invalid termination_reason: {code}")))
            })
            .transpose()?;

        Ok(Session {
            session_id: SessionId::from_db(self.session_id),
            subject_id: SubjectId::from_db(self.subject_id),
            device_fingerprint: self.device_fingerprint,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            created_at: self.created_at,
            last_seen_at: self.last_seen_at,
            terminated_at: self.terminated_at,
            termination_reason,
            generation: self.generation,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BlacklistRow {
    token_kind: String,
    subject_id: String,
    reason: String,
    blacklisted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl BlacklistRow {
    fn into_entry(self, token_hash: TokenHash) -> AuthResult<BlacklistEntry> {
        let token_kind = TokenKind::from_code(&self.token_kind)
            .ok_or_else(|| AuthError::Internal(format!("Invalid token_kind: {}", self.token_kind)))?;
        let reason = RevocationReason::from_code(&self.reason)
            .ok_or_else(|| AuthError::Internal(format!("Invalid blacklist reason: {}", self.reason)))?;

        Ok(BlacklistEntry {
            token_hash,
            token_kind,
            subject_id: SubjectId::from_db(self.subject_id),
            reason,
            blacklisted_at: self.blacklisted_at,
            expires_at: self.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RoleAssignmentRow {
    subject_id: String,
    role: i16,
    permissions: Vec<String>,
    profile_complete: bool,
    email_verified: bool,
    updated_at: DateTime<Utc>,
}

impl RoleAssignmentRow {
    fn into_assignment(self) -> AuthResult<RoleAssignment> {
        let role = Role::from_id(self.role)
            .ok_or_else(|| AuthError::Internal(format!("Invalid role: {}", self.role)))?;

        let permissions = self
            .permissions
            .iter()
            .filter_map(|code| {
                let permission = Permission::from_code(code);
                if permission.is_none() {
                    tracing::warn!(code = %code, "Ignoring unknown permission code");
                }
                permission
            })
            .collect();

        Ok(RoleAssignment {
            subject_id: SubjectId::from_db(self.subject_id),
            role,
            permissions,
            profile_complete: self.profile_complete,
            email_verified: self.email_verified,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRecordRow {
    id: Uuid,
    occurred_at: DateTime<Utc>,
    record_type: String,
    actor_id: Option<String>,
    action: String,
    target_resource: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    device_fingerprint: Option<String>,
    success: bool,
    old_values: Option<serde_json::Value>,
    new_values: Option<serde_json::Value>,
    error_message: Option<String>,
}

impl AuditRecordRow {
    fn into_record(self) -> AuthResult<AuditRecord> {
        let record_type = AuditRecordType::from_code(&self.record_type)
            .ok_or_else(|| AuthError::Internal(format!("Invalid record_type: {}", self.record_type)))?;
        let action = AuditAction::from_code(&self.action)
            .ok_or_else(|| AuthError::Internal(format!("Invalid audit action: {}", self.action)))?;

        Ok(AuditRecord {
            id: self.id.into(),
            timestamp: self.occurred_at,
            record_type,
            actor_id: self.actor_id.map(SubjectId::from_db),
            action,
            target_resource: self.target_resource,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            device_fingerprint: self.device_fingerprint,
            success: self.success,
            old_values: self.old_values,
            new_values: self.new_values,
            error_message: self.error_message,
        })
    }
}
