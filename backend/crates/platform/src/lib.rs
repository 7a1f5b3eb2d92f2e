//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (SHA-256, random tokens, constant-time compare)
//! - Client identification (device fingerprint, client IP, Authorization header)

pub mod client;
pub mod crypto;
