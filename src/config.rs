//! # Configuration Management
//!
//! Configuration comes from the environment (12-factor style), with a `.env`
//! file loaded first when present.
//!
//! ## Environment Variables
//! - `HOST` / `PORT`: bind address (default `127.0.0.1:8000`)
//! - `DATABASE_URL`: SQLite connection string
//! - `DATABASE_MAX_CONNECTIONS`: pool size
//! - `RP_ID`, `RP_NAME`, `RP_ORIGIN`: WebAuthn relying party
//! - `RP_ALLOWED_ORIGINS`: extra origins accepted at login (comma-separated)
//! - `USER_VERIFICATION`: `preferred`, `required` or `discouraged`
//! - `CEREMONY_TIMEOUT_MS`: timeout hint sent to the browser
//! - `CHALLENGE_TTL_SECS`: lifetime of a pending ceremony
//! - `UPSTREAM_TIMEOUT_MS`: bound on every persistence / token / mail call
//! - `JWT_SECRET`, `JWT_EXPIRATION_TIME`: session tokens (seconds)
//! - `MAGIC_LINK_BASE_URL`, `MAGIC_LINK_EXPIRATION_TIME`: onboarding links
//! - `FRONTEND_URL`: where onboarding redirects for passkey setup

use crate::webauthn::types::UserVerification;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// SQLite database connection URL, e.g. `sqlite:merchants.db?mode=rwc`
    pub database_url: String,
    pub database_max_connections: u32,

    /// Relying party id: the bare domain, without scheme or port
    pub rp_id: String,
    /// Human-readable name shown by the authenticator
    pub rp_name: String,
    /// The one origin registration accepts
    pub rp_origin: String,
    /// Additional origins accepted for authentication
    pub rp_allowed_origins: Vec<String>,

    pub user_verification: UserVerification,
    pub ceremony_timeout_ms: u64,
    pub challenge_ttl: Duration,
    pub upstream_timeout: Duration,

    pub jwt_secret: String,
    pub jwt_expiration: Duration,

    /// Magic links are `magic_link_base_url` followed by the signed token
    pub magic_link_base_url: String,
    pub magic_link_expiration: Duration,
    pub frontend_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8000,
            database_url: "sqlite:merchants.db?mode=rwc".to_string(),
            database_max_connections: 5,
            rp_id: "localhost".to_string(),
            rp_name: "CryptoPay".to_string(),
            rp_origin: "http://localhost:3000".to_string(),
            rp_allowed_origins: vec!["https://localhost:3000".to_string()],
            user_verification: UserVerification::Preferred,
            ceremony_timeout_ms: 60_000,
            challenge_ttl: Duration::from_secs(300),
            upstream_timeout: Duration::from_secs(5),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_expiration: Duration::from_secs(3600),
            magic_link_base_url: "http://localhost:8000/register/".to_string(),
            magic_link_expiration: Duration::from_secs(900),
            frontend_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset variables fall back to [`Config::default`]; set but unparsable
    /// values are an error.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", defaults.port)?,
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            rp_id: env::var("RP_ID").unwrap_or(defaults.rp_id),
            rp_name: env::var("RP_NAME").unwrap_or(defaults.rp_name),
            rp_origin: env::var("RP_ORIGIN").unwrap_or(defaults.rp_origin),
            rp_allowed_origins: env::var("RP_ALLOWED_ORIGINS")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.rp_allowed_origins),
            user_verification: parse_var("USER_VERIFICATION", defaults.user_verification)?,
            ceremony_timeout_ms: parse_var("CEREMONY_TIMEOUT_MS", defaults.ceremony_timeout_ms)?,
            challenge_ttl: Duration::from_secs(parse_var(
                "CHALLENGE_TTL_SECS",
                defaults.challenge_ttl.as_secs(),
            )?),
            upstream_timeout: Duration::from_millis(parse_var(
                "UPSTREAM_TIMEOUT_MS",
                defaults.upstream_timeout.as_millis() as u64,
            )?),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                defaults.jwt_secret
            }),
            jwt_expiration: Duration::from_secs(parse_var(
                "JWT_EXPIRATION_TIME",
                defaults.jwt_expiration.as_secs(),
            )?),
            magic_link_base_url: env::var("MAGIC_LINK_BASE_URL")
                .unwrap_or(defaults.magic_link_base_url),
            magic_link_expiration: Duration::from_secs(parse_var(
                "MAGIC_LINK_EXPIRATION_TIME",
                defaults.magic_link_expiration.as_secs(),
            )?),
            frontend_url: env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
        };

        Ok(config)
    }

    /// Socket address for `tokio::net::TcpListener::bind()`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Every origin accepted during authentication: the primary origin first
    pub fn login_origins(&self) -> Vec<String> {
        let mut origins = vec![self.rp_origin.clone()];
        for origin in &self.rp_allowed_origins {
            if !origins.contains(origin) {
                origins.push(origin.clone());
            }
        }
        origins
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
