//! Configuration management for Identity Service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! # Example
//!
//! ```no_run
//! use identity_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("JWT issuer: {}", settings.jwt.issuer);
//!     Ok(())
//! }
//! ```

use crate::cache::DEFAULT_KEY_PREFIX;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;
use tracing::info;

const DEFAULT_ISSUER: &str = "nova-platform";
const DEFAULT_ACCESS_TTL_SECS: u64 = 900; // 15 minutes
const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 60 * 60; // 7 days
const MAX_REFRESH_TTL_SECS: u64 = 365 * 24 * 60 * 60; // 1 year
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_LOG_FILTER: &str = "identity_service=info,info";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub session: SessionSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Load and validate settings, reading `.env` first in debug builds
    pub fn load() -> Result<Self> {
        // Load .env file in development
        if cfg!(debug_assertions) && dotenvy::dotenv().is_ok() {
            info!("Loaded .env file for development");
        }

        let settings = Self::from_env()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            redis: RedisSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            session: SessionSettings::from_env()?,
            log: LogSettings::from_env()?,
        })
    }

    /// Reject configurations the auth flow cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.jwt.access_ttl_seconds == 0 {
            bail!("JWT_ACCESS_TTL_SECONDS must be greater than zero");
        }
        if self.session.refresh_ttl_seconds == 0 {
            bail!("SESSION_REFRESH_TTL_SECONDS must be greater than zero");
        }
        if self.session.refresh_ttl_seconds > MAX_REFRESH_TTL_SECS {
            bail!(
                "SESSION_REFRESH_TTL_SECONDS ({}) must not exceed {}",
                self.session.refresh_ttl_seconds,
                MAX_REFRESH_TTL_SECS
            );
        }
        if self.jwt.access_ttl_seconds >= self.session.refresh_ttl_seconds {
            bail!(
                "JWT_ACCESS_TTL_SECONDS ({}) must be shorter than SESSION_REFRESH_TTL_SECONDS ({})",
                self.jwt.access_ttl_seconds,
                self.session.refresh_ttl_seconds
            );
        }
        if self.session.operation_timeout_ms == 0 {
            bail!("SESSION_OPERATION_TIMEOUT_MS must be greater than zero");
        }
        if self.jwt.private_key.trim().is_empty() {
            bail!("JWT private key is empty");
        }
        if self.jwt.public_key.trim().is_empty() {
            bail!("JWT public key is empty");
        }
        if self.jwt.issuer.trim().is_empty() {
            bail!("JWT_ISSUER must not be empty");
        }
        Ok(())
    }
}

/// Redis session store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
    /// Seconds allowed for the initial connection
    pub connection_timeout: u64,
    pub key_prefix: String,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
            connection_timeout: env::var("REDIS_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid REDIS_CONNECTION_TIMEOUT")?,
            key_prefix: env::var("REDIS_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_KEY_PREFIX.to_string()),
        })
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }
}

/// RS256 signing settings
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    #[serde(skip_serializing)]
    pub private_key: String,
    pub public_key: String,
    pub issuer: String,
    pub access_ttl_seconds: u64,
}

impl JwtSettings {
    /// PEM keys come either inline (`JWT_PRIVATE_KEY`) or from a file (`JWT_PRIVATE_KEY_PATH`)
    fn from_env() -> Result<Self> {
        Ok(Self {
            private_key: pem_from_env("JWT_PRIVATE_KEY", "JWT_PRIVATE_KEY_PATH")?,
            public_key: pem_from_env("JWT_PUBLIC_KEY", "JWT_PUBLIC_KEY_PATH")?,
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string()),
            access_ttl_seconds: env::var("JWT_ACCESS_TTL_SECONDS")
                .unwrap_or_else(|_| DEFAULT_ACCESS_TTL_SECS.to_string())
                .parse()
                .context("Invalid JWT_ACCESS_TTL_SECONDS")?,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_seconds)
    }
}

// Keep the private key out of logs.
impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("private_key", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .finish_non_exhaustive()
    }
}

fn pem_from_env(inline_var: &str, path_var: &str) -> Result<String> {
    if let Ok(pem) = env::var(inline_var) {
        // Single-line secrets carry escaped newlines
        return Ok(pem.replace("\\n", "\n"));
    }
    if let Ok(path) = env::var(path_var) {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {} from {}", inline_var, path));
    }
    bail!("{} or {} must be set", inline_var, path_var)
}

/// Refresh-session policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub refresh_ttl_seconds: u64,
    /// Upper bound for a single request's store round-trips
    pub operation_timeout_ms: u64,
}

impl SessionSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            refresh_ttl_seconds: env::var("SESSION_REFRESH_TTL_SECONDS")
                .unwrap_or_else(|_| DEFAULT_REFRESH_TTL_SECS.to_string())
                .parse()
                .context("Invalid SESSION_REFRESH_TTL_SECONDS")?,
            operation_timeout_ms: env::var("SESSION_OPERATION_TIMEOUT_MS")
                .unwrap_or_else(|_| DEFAULT_OPERATION_TIMEOUT_MS.to_string())
                .parse()
                .context("Invalid SESSION_OPERATION_TIMEOUT_MS")?,
        })
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Tracing subscriber settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directives, e.g. `info,identity_service=debug`
    pub filter: String,
    pub format: LogFormat,
}

impl LogSettings {
    fn from_env() -> Result<Self> {
        let format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "json".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            other => bail!("Invalid LOG_FORMAT: {}", other),
        };

        Ok(Self {
            filter: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            format,
        })
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            format: LogFormat::Json,
        }
    }
}
