//! Value Object Module

pub mod permission;
pub mod revocation_reason;
pub mod role;
pub mod session_id;
pub mod subject_id;
pub mod time_range;
pub mod token;

pub use permission::Permission;
pub use revocation_reason::RevocationReason;
pub use role::Role;
pub use session_id::SessionId;
pub use subject_id::SubjectId;
pub use time_range::TimeRange;
pub use token::{DecodedToken, TokenClaims, TokenHash, TokenKind, VerifiedToken};
