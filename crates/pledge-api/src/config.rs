//! Service configuration loaded from environment variables.
//!
//! Every setting has a development default, so the server starts with no
//! configuration at all. `.env` files are loaded by the binary before this
//! runs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    /// Env: `PLEDGE_HOST`
    pub host: String,

    /// Env: `PLEDGE_PORT`
    pub port: u16,

    /// Env: `PLEDGE_DB_PATH`
    pub db_path: PathBuf,

    /// HMAC secret for session tokens.
    /// Env: `PLEDGE_JWT_SECRET`
    pub jwt_secret: String,

    /// Origin used to build the public link baked into QR codes.
    /// Env: `PLEDGE_PUBLIC_URL`
    pub public_url: String,

    /// Where proof images and voice recordings are written.
    /// Env: `PLEDGE_UPLOAD_DIR`
    pub upload_dir: PathBuf,

    /// Account accepted by the credentials sign-in provider. Credentials
    /// sign-in is disabled when unset.
    /// Env: `PLEDGE_CREDENTIALS_EMAIL`, `PLEDGE_CREDENTIALS_NAME`,
    /// `PLEDGE_CREDENTIALS_PASSWORD_HASH` (argon2 PHC string)
    pub credentials: Option<CredentialsUser>,
}

#[derive(Debug, Clone)]
pub struct CredentialsUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            db_path: PathBuf::from("pledge.db"),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            public_url: "http://localhost:3000".to_string(),
            upload_dir: PathBuf::from("./public/uploads"),
            credentials: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PLEDGE_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PLEDGE_PORT must be a port number, got '{}'", raw))?,
            None => defaults.port,
        };

        let jwt_secret = var("PLEDGE_JWT_SECRET").unwrap_or_else(|| {
            warn!("PLEDGE_JWT_SECRET not set, using the development secret");
            defaults.jwt_secret.clone()
        });

        let credentials = match (
            var("PLEDGE_CREDENTIALS_EMAIL"),
            var("PLEDGE_CREDENTIALS_PASSWORD_HASH"),
        ) {
            (Some(email), Some(password_hash)) => Some(CredentialsUser {
                email,
                name: var("PLEDGE_CREDENTIALS_NAME"),
                password_hash,
            }),
            (None, None) => None,
            _ => anyhow::bail!(
                "PLEDGE_CREDENTIALS_EMAIL and PLEDGE_CREDENTIALS_PASSWORD_HASH must be set together"
            ),
        };

        Ok(Self {
            host: var("PLEDGE_HOST").unwrap_or(defaults.host),
            port,
            db_path: var("PLEDGE_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            jwt_secret,
            public_url: var("PLEDGE_PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_url),
            upload_dir: var("PLEDGE_UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            credentials,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
