//! Environment-driven configuration.
//!
//! - `AXILENT_ENDPOINT` (default `https://www.axilent.net`)
//! - `AXILENT_API_VERSION` (default `beta3`)
//! - `AXILENT_API_KEY` (unset: the remote integration is unconfigured)
//! - `AXILENT_TIMEOUT_SECS` (default 20)
//! - `DJAX_SYNC_LOCK_TTL_SECS` (unset: sync locks never expire)

use crate::{Error, Result};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://www.axilent.net";
pub const DEFAULT_API_VERSION: &str = "beta3";

#[derive(Debug, Clone, PartialEq)]
pub struct AxilentConfig {
    pub endpoint: String,
    pub api_version: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for AxilentConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            api_key: None,
            timeout: Duration::from_secs(20),
        }
    }
}

impl AxilentConfig {
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(endpoint) = env_nonempty("AXILENT_ENDPOINT") {
            cfg.endpoint = endpoint;
        }
        if let Some(version) = env_nonempty("AXILENT_API_VERSION") {
            cfg.api_version = version;
        }
        cfg.api_key = env_nonempty("AXILENT_API_KEY");
        if let Some(secs) = env_nonempty("AXILENT_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::Misconfigured(format!("AXILENT_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            cfg.timeout = Duration::from_secs(secs);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug")]
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(Error::Misconfigured("axilent endpoint is empty".to_string()));
        }
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::Misconfigured(format!(
                "axilent endpoint must be an http(s) url: {endpoint}"
            )));
        }
        if self.api_version.trim().is_empty() {
            return Err(Error::Misconfigured("axilent api_version is empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Misconfigured("axilent timeout must be > 0".to_string()));
        }
        Ok(())
    }

    /// The remote integration is only active when an API key is present.
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Upper bound for `DJAX_SYNC_LOCK_TTL_SECS` (30 days).
pub const MAX_LOCK_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncConfig {
    /// Age after which a leftover sync lock is considered abandoned.
    pub lock_ttl: Option<Duration>,
}

impl SyncConfig {
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        let lock_ttl = env_nonempty("DJAX_SYNC_LOCK_TTL_SECS")
            .map(|secs| parse_lock_ttl(&secs))
            .transpose()?;
        Ok(Self { lock_ttl })
    }

    pub(crate) fn chrono_lock_ttl(&self) -> Option<chrono::Duration> {
        self.lock_ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
    }
}

fn parse_lock_ttl(secs: &str) -> Result<Duration> {
    let secs: u64 = secs.parse().map_err(|_| {
        Error::Misconfigured(format!("DJAX_SYNC_LOCK_TTL_SECS is not a number: {secs}"))
    })?;
    if secs == 0 || secs > MAX_LOCK_TTL_SECS {
        return Err(Error::Misconfigured(format!(
            "DJAX_SYNC_LOCK_TTL_SECS must be between 1 and {MAX_LOCK_TTL_SECS}, got {secs}"
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
