//! Presentation Layer
//!
//! HTTP handlers, DTOs, routers, and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use handlers::AuthAppState;
pub use middleware::{AuthGuard, ClientInfo, CurrentAuth, JsonBody, require_auth};
pub use router::{admin_router, auth_router};
