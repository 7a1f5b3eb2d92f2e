//! Application Layer
//!
//! Components of the access core and the use cases built on them.

pub mod audit_logger;
pub mod authorize;
pub mod config;
pub mod promote_role;
pub mod provision;
pub mod refresh;
pub mod role_resolver;
pub mod services;
pub mod session_store;
pub mod sign_in;
pub mod sign_out;
pub mod token_blacklist;
pub mod token_validator;

// Re-exports
pub use authorize::{AuthContext, AuthorizeOptions, AuthorizeUseCase};
pub use config::AuthConfig;
pub use promote_role::PromoteRoleUseCase;
pub use provision::{ProvisionInput, ProvisionUseCase};
pub use refresh::{RefreshOutput, RefreshUseCase};
pub use services::{AuthProvider, AuthServices, AuthStore};
pub use sign_in::{SignInOutput, SignInUseCase};
pub use sign_out::{SignOutInput, SignOutOutput, SignOutUseCase};
