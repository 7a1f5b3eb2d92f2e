//! Promote Role Use Case
//!
//! Administrative role changes, including teacher application review outcomes.

use platform::client::ClientFingerprint;

use crate::application::services::{AuthProvider, AuthServices, AuthStore};
use crate::domain::entity::audit_record::{AuditAction, AuditRecord};
use crate::domain::entity::role_assignment::RoleAssignment;
use crate::domain::value_object::{role::Role, subject_id::SubjectId};
use crate::error::{AuthError, AuthResult};

pub struct PromoteRoleUseCase<'a, R, P> {
    services: &'a AuthServices<R, P>,
}

impl<'a, R, P> PromoteRoleUseCase<'a, R, P>
where
    R: AuthStore,
    P: AuthProvider,
{
    pub fn new(services: &'a AuthServices<R, P>) -> Self {
        Self { services }
    }

    /// ## Errors
    /// * `InsufficientRole` - acting subject is not an admin
    /// * `TargetNotFound` - target has no role assignment
    /// * `InvalidRoleTransition` - disallowed move, or an admin changing their own role
    pub async fn execute(
        &self,
        target: &SubjectId,
        new_role: Role,
        acting_admin: &SubjectId,
        client: &ClientFingerprint,
    ) -> AuthResult<RoleAssignment> {
        let audit_target = format!("subject:{target}");

        match self.run(target, new_role, acting_admin).await {
            Ok((previous, assignment)) => {
                let record = AuditRecord::admin_action(AuditAction::RoleChange)
                    .with_actor(acting_admin)
                    .with_target(audit_target)
                    .with_client(client)
                    .with_change(previous.snapshot(), assignment.snapshot());
                self.services.audit.log_admin_action(record).await;

                tracing::info!(
                    admin = %acting_admin,
                    subject_id = %target,
                    from = %previous.role,
                    to = %assignment.role,
                    "Role changed"
                );
                Ok(assignment)
            }
            Err(err) => {
                let record = AuditRecord::admin_action(AuditAction::RoleChange)
                    .with_actor(acting_admin)
                    .with_target(audit_target)
                    .with_client(client)
                    .with_new_values(serde_json::json!({ "role": new_role }))
                    .with_error(err.code());
                self.services.audit.log_admin_action(record).await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        target: &SubjectId,
        new_role: Role,
        acting_admin: &SubjectId,
    ) -> AuthResult<(RoleAssignment, RoleAssignment)> {
        let roles = &self.services.roles;

        let admin = roles
            .load_uncached(acting_admin)
            .await?
            .ok_or(AuthError::SubjectNotFound)?;
        if !admin.role.is_admin() {
            return Err(AuthError::InsufficientRole);
        }
        if acting_admin == target {
            return Err(AuthError::InvalidRoleTransition);
        }

        let previous = roles
            .load_uncached(target)
            .await?
            .ok_or(AuthError::TargetNotFound)?;
        let mut assignment = previous.clone();
        assignment.transition_to(new_role)?;

        roles.assign(&assignment).await?;
        Ok((previous, assignment))
    }
}
