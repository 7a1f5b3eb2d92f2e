//! Server configuration from the environment

use anyhow::{Context, bail};
use auth::{AuthConfig, RestProviderConfig};
use base64::Engine;
use base64::engine::general_purpose;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:31113";
const DEFAULT_FRONTEND_ORIGINS: &str = "http://localhost:40922,http://127.0.0.1:40922";

#[derive(Clone)]
pub struct ApiConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub frontend_origins: Vec<String>,
    pub auth: AuthConfig,
    pub provider: RestProviderConfig,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL must be set in environment")?;

        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw.parse().context("DATABASE_MAX_CONNECTIONS must be a number")?,
            Err(_) => 5,
        };

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let frontend_origins = env::var("FRONTEND_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_FRONTEND_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let auth = auth_config()?;

        let provider = RestProviderConfig {
            base_url: env::var("IDENTITY_PROVIDER_URL")
                .unwrap_or_else(|_| "https://identitytoolkit.googleapis.com/v1".to_string()),
            api_key: env::var("IDENTITY_PROVIDER_API_KEY")
                .context("IDENTITY_PROVIDER_API_KEY must be set in environment")?,
            timeout: auth.provider_timeout,
        };

        Ok(Self {
            database_url,
            max_connections,
            bind_addr,
            frontend_origins,
            auth,
            provider,
        })
    }
}

fn auth_config() -> anyhow::Result<AuthConfig> {
    let mut config = if cfg!(debug_assertions) {
        AuthConfig::development()
    } else {
        // In production, load secret from environment
        let secret_b64 = env::var("AUTH_TOKEN_SECRET")
            .context("AUTH_TOKEN_SECRET must be set in production")?;
        AuthConfig {
            token_signing_secret: decode_secret(&secret_b64)?,
            ..AuthConfig::default()
        }
    };

    if let Ok(issuer) = env::var("AUTH_ISSUER") {
        config.issuer = issuer;
    }
    if let Ok(audience) = env::var("AUTH_AUDIENCE") {
        config.audience = audience;
    }
    if let Ok(raw) = env::var("AUTH_PROVIDER_TIMEOUT_MS") {
        let millis: u64 = raw.parse().context("AUTH_PROVIDER_TIMEOUT_MS must be a number")?;
        config.provider_timeout = Duration::from_millis(millis);
    }
    if let Ok(raw) = env::var("AUTH_ROLE_CACHE_TTL_SECS") {
        let secs: u64 = raw.parse().context("AUTH_ROLE_CACHE_TTL_SECS must be a number")?;
        config.role_cache_ttl = Duration::from_secs(secs);
    }

    Ok(config)
}

fn decode_secret(secret_b64: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = general_purpose::STANDARD
        .decode(secret_b64.trim())
        .context("AUTH_TOKEN_SECRET must be base64")?;
    if bytes.len() != 32 {
        bail!("AUTH_TOKEN_SECRET must decode to 32 bytes, got {}", bytes.len());
    }
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&bytes);
    Ok(secret)
}
