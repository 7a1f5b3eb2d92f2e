//! Domain Services
//!
//! Pure functions over audit records; no I/O.

pub mod audit_analysis;
pub mod suspicious;
