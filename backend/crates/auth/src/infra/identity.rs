//! REST identity provider
//!
//! Credentials are checked by the hosted identity service (Identity Toolkit
//! compatible REST API). Session tokens are minted and verified locally with
//! the shared signing key.

use serde::Deserialize;
use std::time::Duration;

use crate::domain::provider::{
    Credentials, IdentityProvider, IssuedTokens, ProviderError, ProviderIdentity, TokenGrant,
};
use crate::domain::value_object::{subject_id::SubjectId, token::DecodedToken};
use crate::infra::jwt::JwtTokenCodec;

/// Error messages the service uses for rejected credentials
const CREDENTIAL_ERRORS: &[&str] = &[
    "EMAIL_NOT_FOUND",
    "INVALID_PASSWORD",
    "INVALID_LOGIN_CREDENTIALS",
    "INVALID_EMAIL",
    "USER_DISABLED",
    "MISSING_PASSWORD",
];

#[derive(Debug, Clone)]
pub struct RestProviderConfig {
    /// e.g. `https://identitytoolkit.googleapis.com/v1`
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct RestIdentityProvider {
    http: reqwest::Client,
    config: RestProviderConfig,
    codec: JwtTokenCodec,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: String,
    id_token: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    #[serde(default)]
    email_verified: bool,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl RestIdentityProvider {
    pub fn new(config: RestProviderConfig, codec: JwtTokenCodec) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Internal(e.to_string()))?;

        Ok(Self {
            http,
            config,
            codec,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/accounts:{method}?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_key
        )
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .post(self.endpoint(method))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(transport_error);
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::Unreachable(format!("identity service returned {status}")));
        }

        let message = response
            .json::<ErrorEnvelope>()
            .await
            .map(|envelope| envelope.error.message)
            .unwrap_or_default();
        if CREDENTIAL_ERRORS.iter().any(|known| message.starts_with(known)) {
            return Err(ProviderError::InvalidCredentials);
        }

        // Misconfiguration (bad key, unknown project) rather than a bad password
        tracing::error!(%status, message = %message, method, "Identity service rejected request");
        Err(ProviderError::Unreachable(format!("identity service returned {status}")))
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Unreachable(if err.is_timeout() {
        "timeout".to_string()
    } else {
        err.to_string()
    })
}

impl IdentityProvider for RestIdentityProvider {
    async fn verify_credentials(&self, credentials: &Credentials) -> Result<ProviderIdentity, ProviderError> {
        let signed_in: SignInResponse = self
            .post(
                "signInWithPassword",
                serde_json::json!({
                    "email": credentials.email,
                    "password": credentials.password,
                    "returnSecureToken": true,
                }),
            )
            .await?;

        let lookup: LookupResponse = self
            .post("lookup", serde_json::json!({ "idToken": signed_in.id_token }))
            .await?;
        let email_verified = lookup.users.first().is_some_and(|user| user.email_verified);

        let subject_id = SubjectId::new(signed_in.local_id).map_err(|_| {
            ProviderError::Unreachable("identity service returned an invalid subject".into())
        })?;

        Ok(ProviderIdentity {
            subject_id,
            email: signed_in.email,
            email_verified,
        })
    }

    async fn verify_token(&self, raw_token: &str) -> Result<DecodedToken, ProviderError> {
        self.codec.decode(raw_token)
    }

    async fn issue_tokens(&self, grant: &TokenGrant) -> Result<IssuedTokens, ProviderError> {
        self.codec.issue_pair(grant)
    }
}
