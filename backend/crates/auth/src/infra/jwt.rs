//! JWT token codec
//!
//! HS256 tokens bound to a session. `iat` has one-second resolution, so the
//! microsecond issue time travels in `iat_us` for subject cutoff comparisons.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::provider::{IssuedTokens, ProviderError, TokenGrant};
use crate::domain::value_object::{
    role::Role,
    session_id::SessionId,
    subject_id::SubjectId,
    token::{DecodedToken, TokenClaims, TokenKind},
};

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    sub: String,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
    jti: String,
    kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sid: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat_us: Option<i64>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone)]
pub struct JwtTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
}

impl JwtTokenCodec {
    pub fn new(secret: &[u8], issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        let issuer = issuer.into();
        let audience = audience.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer,
            audience,
        }
    }

    pub fn encode(
        &self,
        grant: &TokenGrant,
        kind: TokenKind,
        ttl: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<String, ProviderError> {
        let claims = JwtClaims {
            sub: grant.subject_id.as_str().to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            jti: platform::crypto::random_token(16),
            kind,
            sid: Some(grant.session_id.as_str().to_string()),
            email_verified: grant.email_verified,
            role: Some(grant.role),
            iat_us: Some(issued_at.timestamp_micros()),
            extra: BTreeMap::new(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign token");
            ProviderError::Internal("token signing failed".into())
        })
    }

    /// Identity and refresh token for the same grant, issued at the same instant
    pub fn issue_pair(&self, grant: &TokenGrant) -> Result<IssuedTokens, ProviderError> {
        let now = Utc::now();
        Ok(IssuedTokens {
            identity_token: self.encode(grant, TokenKind::Identity, grant.identity_ttl, now)?,
            refresh_token: self.encode(grant, TokenKind::Refresh, grant.refresh_ttl, now)?,
        })
    }

    pub fn decode(&self, raw_token: &str) -> Result<DecodedToken, ProviderError> {
        use jsonwebtoken::errors::ErrorKind;

        let data = decode::<JwtClaims>(raw_token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => ProviderError::ExpiredToken,
                _ => ProviderError::InvalidToken,
            },
        )?;
        let claims = data.claims;

        let subject_id = SubjectId::new(claims.sub).map_err(|_| ProviderError::InvalidToken)?;
        let issued_at = claims
            .iat_us
            .and_then(DateTime::from_timestamp_micros)
            .or_else(|| DateTime::from_timestamp(claims.iat, 0))
            .ok_or(ProviderError::InvalidToken)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(ProviderError::InvalidToken)?;
        let session_id = match claims.sid {
            Some(sid) => Some(SessionId::parse(&sid).ok_or(ProviderError::InvalidToken)?),
            None => None,
        };

        Ok(DecodedToken {
            subject_id,
            kind: claims.kind,
            issued_at,
            expires_at,
            claims: TokenClaims {
                session_id,
                email_verified: claims.email_verified,
                role: claims.role,
                extra: claims.extra,
            },
        })
    }
}
