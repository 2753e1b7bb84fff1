//! Centralized configuration (environment variables + defaults).

use crate::infra::sandbox::SandboxLimits;
use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
/// Five days.
pub const DEFAULT_DEFINITIONS_CACHE_TTL_SECS: u64 = 432_000;
/// One year.
pub const MAX_DEFINITIONS_CACHE_TTL_SECS: u64 = 31_536_000;
/// Ten minutes.
pub const MAX_SANDBOX_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_addr: SocketAddr,
    /// PostgreSQL backend when set, in-memory definitions otherwise.
    pub database_url: Option<String>,
    pub allow_inline_code: bool,
    pub definitions_cache_ttl: Duration,
    pub sandbox: SandboxLimits,
    pub cors_allowed_origins: Vec<String>,
    pub admin_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            allow_inline_code: false,
            definitions_cache_ttl: Duration::from_secs(DEFAULT_DEFINITIONS_CACHE_TTL_SECS),
            sandbox: SandboxLimits::default(),
            cors_allowed_origins: vec!["*".to_string()],
            admin_token: None,
        }
    }
}

impl Settings {
    /// Loads `.env` (if present) and reads every setting from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();
        let sandbox_defaults = SandboxLimits::default();

        let listen_addr = parse_or(get("API_MAKER_LISTEN_ADDR"), "API_MAKER_LISTEN_ADDR", defaults.listen_addr)?;
        let allow_inline_code = match get("ALLOW_INLINE_CODE") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| anyhow!("ALLOW_INLINE_CODE must be a boolean, got '{}'", raw))?,
            None => defaults.allow_inline_code,
        };
        let ttl_secs: u64 = parse_or(
            get("DEFINITIONS_CACHE_TTL_SECS"),
            "DEFINITIONS_CACHE_TTL_SECS",
            DEFAULT_DEFINITIONS_CACHE_TTL_SECS,
        )?;
        let timeout_ms: u64 = parse_or(
            get("SANDBOX_TIMEOUT_MS"),
            "SANDBOX_TIMEOUT_MS",
            sandbox_defaults.timeout.as_millis() as u64,
        )?;
        let max_operations: u64 = parse_or(
            get("SANDBOX_MAX_OPERATIONS"),
            "SANDBOX_MAX_OPERATIONS",
            sandbox_defaults.max_operations,
        )?;
        let max_string_size: usize = parse_or(
            get("SANDBOX_MAX_STRING_SIZE"),
            "SANDBOX_MAX_STRING_SIZE",
            sandbox_defaults.max_string_size,
        )?;

        if timeout_ms == 0 || timeout_ms > MAX_SANDBOX_TIMEOUT_MS {
            return Err(anyhow!(
                "SANDBOX_TIMEOUT_MS must be between 1 and {}, got {}",
                MAX_SANDBOX_TIMEOUT_MS,
                timeout_ms
            ));
        }
        if ttl_secs > MAX_DEFINITIONS_CACHE_TTL_SECS {
            return Err(anyhow!(
                "DEFINITIONS_CACHE_TTL_SECS must be at most {}, got {}",
                MAX_DEFINITIONS_CACHE_TTL_SECS,
                ttl_secs
            ));
        }

        let cors_allowed_origins = match get("CORS_ALLOWED_ORIGINS") {
            Some(raw) => {
                let origins: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect();
                if origins.is_empty() {
                    defaults.cors_allowed_origins
                } else {
                    origins
                }
            }
            None => defaults.cors_allowed_origins,
        };

        Ok(Self {
            listen_addr,
            database_url: get("DATABASE_URL"),
            allow_inline_code,
            definitions_cache_ttl: Duration::from_secs(ttl_secs.max(1)),
            sandbox: SandboxLimits {
                timeout: Duration::from_millis(timeout_ms),
                max_operations,
                max_string_size,
                ..sandbox_defaults
            },
            cors_allowed_origins,
            admin_token: get("ADMIN_TOKEN"),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
