//! Auth (Access Core) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository and provider ports, pure audit rules
//! - `application/` - The access core components and the use cases built on them
//! - `infra/` - PostgreSQL and in-memory stores, JWT codec, identity provider client
//! - `presentation/` - HTTP handlers, DTOs, routers, auth middleware
//!
//! ## Features
//! - Bearer token authorization with a fixed rejection order
//! - Token blacklist by hash plus per-subject revoke-all cutoffs
//! - Server-side sessions with a per-subject generation counter
//! - Role/permission resolution with a short-lived cache
//! - Append-only audit trail with suspicious-pattern detection
//!
//! ## Security Model
//! - Credentials are verified by the external identity provider only
//! - Tokens are stored and compared by SHA-256 hash, never in plain form
//! - Session ids are redacted in logs; listings expose a derived handle
//! - Roles come from the store on every decision, never from token claims

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::config::AuthConfig;
pub use application::{AuthServices, AuthorizeOptions};
pub use error::{AuthError, AuthResult};
pub use infra::identity::{RestIdentityProvider, RestProviderConfig};
pub use infra::jwt::JwtTokenCodec;
pub use infra::postgres::PgAuthRepository;
pub use presentation::router::{admin_router, auth_router};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

/// Services wired for production: PostgreSQL store and REST identity provider
pub type PgAuthServices = AuthServices<PgAuthRepository, RestIdentityProvider>;

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}

pub mod middleware {
    pub use crate::presentation::middleware::*;
}
