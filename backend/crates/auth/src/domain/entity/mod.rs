//! Entity Module

pub mod audit_record;
pub mod blacklist_entry;
pub mod role_assignment;
pub mod session;

pub use audit_record::{AuditAction, AuditRecord, AuditRecordType};
pub use blacklist_entry::{BlacklistEntry, SubjectRevocation};
pub use role_assignment::RoleAssignment;
pub use session::{Session, SessionInfo};
