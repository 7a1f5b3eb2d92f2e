//! Infrastructure Layer
//!
//! Database implementations and external service integrations.

pub mod identity;
pub mod jwt;
pub mod memory;
pub mod postgres;

pub use identity::{RestIdentityProvider, RestProviderConfig};
pub use jwt::JwtTokenCodec;
pub use memory::InMemoryAuthRepository;
pub use postgres::PgAuthRepository;
