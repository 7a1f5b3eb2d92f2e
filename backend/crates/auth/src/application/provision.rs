//! Provision Use Case
//!
//! Registration hook: gives a new identity its first role assignment.

use platform::client::ClientFingerprint;

use crate::application::services::{AuthProvider, AuthServices, AuthStore};
use crate::domain::entity::audit_record::{AuditAction, AuditRecord};
use crate::domain::entity::role_assignment::RoleAssignment;
use crate::domain::value_object::{role::Role, subject_id::SubjectId};
use crate::error::{AuthError, AuthResult};

pub struct ProvisionInput {
    pub subject_id: SubjectId,
    pub initial_role: Role,
    pub email_verified: bool,
}

pub struct ProvisionUseCase<'a, R, P> {
    services: &'a AuthServices<R, P>,
}

impl<'a, R, P> ProvisionUseCase<'a, R, P>
where
    R: AuthStore,
    P: AuthProvider,
{
    pub fn new(services: &'a AuthServices<R, P>) -> Self {
        Self { services }
    }

    /// Only `Student` and `PendingTeacher` are valid starting roles
    pub async fn execute(
        &self,
        input: ProvisionInput,
        actor: Option<&SubjectId>,
        client: &ClientFingerprint,
    ) -> AuthResult<RoleAssignment> {
        if !input.initial_role.is_initial() {
            return Err(AuthError::InvalidRoleTransition);
        }

        let assignment = RoleAssignment::new(input.subject_id, input.initial_role, input.email_verified);
        if !self.services.roles.provision(&assignment).await? {
            return Err(AuthError::SubjectExists);
        }

        let mut record = AuditRecord::admin_action(AuditAction::SubjectProvisioned)
            .with_target(format!("subject:{}", assignment.subject_id))
            .with_client(client)
            .with_new_values(assignment.snapshot());
        if let Some(actor) = actor {
            record = record.with_actor(actor);
        }
        self.services.audit.log_admin_action(record).await;

        tracing::info!(
            subject_id = %assignment.subject_id,
            role = %assignment.role,
            "Subject provisioned"
        );
        Ok(assignment)
    }
}
