//! Domain Layer
//!
//! Contains entities, value objects, repository and provider ports, and pure services.

pub mod entity;
pub mod provider;
pub mod repository;
pub mod service;
pub mod value_object;

// Re-exports
pub use entity::{AuditRecord, BlacklistEntry, RoleAssignment, Session};
pub use provider::IdentityProvider;
pub use repository::{AuditRepository, BlacklistRepository, RoleRepository, SessionRepository};
