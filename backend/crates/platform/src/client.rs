//! Client identification utilities
//!
//! Common functions for identifying clients via HTTP headers.

use axum::http::{HeaderMap, header};
use std::net::IpAddr;

use crate::crypto::sha256;

/// Optional header a client may send to identify its device across requests
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Client fingerprint derived from request headers
///
/// Recorded on sessions and audit records; the hash binds a session to a device.
#[derive(Debug, Clone, Default)]
pub struct ClientFingerprint {
    /// SHA-256 of User-Agent and device id
    pub hash: [u8; 32],
    /// Client IP address (from X-Forwarded-For or direct connection)
    pub ip: Option<IpAddr>,
    /// Original User-Agent string (for logging/display)
    pub user_agent: Option<String>,
}

impl ClientFingerprint {
    pub fn new(hash: [u8; 32], ip: Option<IpAddr>, user_agent: Option<String>) -> Self {
        Self {
            hash,
            ip,
            user_agent,
        }
    }

    /// Fingerprint from raw parts
    pub fn from_parts(user_agent: Option<&str>, device_id: Option<&str>, ip: Option<IpAddr>) -> Self {
        let material = format!("{}\n{}", user_agent.unwrap_or(""), device_id.unwrap_or(""));
        Self::new(sha256(material.as_bytes()), ip, user_agent.map(str::to_string))
    }

    /// Hex digest for storage and audit records
    pub fn hash_hex(&self) -> String {
        crate::crypto::to_hex(&self.hash)
    }

    /// Get IP as string (for database storage)
    pub fn ip_string(&self) -> Option<String> {
        self.ip.map(|ip| ip.to_string())
    }
}

/// Error when extracting client fingerprint
#[derive(Debug, Clone, thiserror::Error)]
pub enum FingerprintError {
    #[error("Missing required header: {0}")]
    MissingHeader(String),
}

/// Strict fingerprint extraction, used where a device must be identifiable (login)
///
/// ## Returns
/// * `Err(FingerprintError)` - Missing User-Agent header
pub fn extract_fingerprint(
    headers: &HeaderMap,
    client_ip: Option<IpAddr>,
) -> Result<ClientFingerprint, FingerprintError> {
    let user_agent = header_str(headers, header::USER_AGENT.as_str())
        .ok_or_else(|| FingerprintError::MissingHeader("User-Agent".to_string()))?;

    Ok(ClientFingerprint::from_parts(
        Some(user_agent),
        header_str(headers, DEVICE_ID_HEADER),
        client_ip,
    ))
}

/// Lenient fingerprint extraction; missing headers hash as empty
pub fn fingerprint_or_default(headers: &HeaderMap, client_ip: Option<IpAddr>) -> ClientFingerprint {
    ClientFingerprint::from_parts(
        header_str(headers, header::USER_AGENT.as_str()),
        header_str(headers, DEVICE_ID_HEADER),
        client_ip,
    )
}

/// Raw `Authorization` header value, if present and valid UTF-8
pub fn extract_authorization(headers: &HeaderMap) -> Option<String> {
    header_str(headers, header::AUTHORIZATION.as_str()).map(str::to_string)
}

/// Extract client IP address from headers
///
/// Checks X-Forwarded-For header first (for reverse proxy setups),
/// then falls back to direct connection IP.
pub fn extract_client_ip(headers: &HeaderMap, direct_ip: Option<IpAddr>) -> Option<IpAddr> {
    if let Some(xff) = header_str(headers, "x-forwarded-for") {
        if let Some(first_ip) = xff.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }
    direct_ip
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
