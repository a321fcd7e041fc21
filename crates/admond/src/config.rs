//! Environment-driven daemon configuration.
//!
//! Everything has a default except the console credentials: an admin plane
//! with no credentials would accept nobody, so startup fails instead.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Default console bind address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:9981";

/// Default memory sampling cadence in milliseconds.
pub const DEFAULT_MEM_STATS_INTERVAL_MS: u64 = 5000;

/// Default CPU sampling cadence in milliseconds.
pub const DEFAULT_CPU_STATS_INTERVAL_MS: u64 = 5000;

/// Default number of stats ticks retained for replay to new consoles.
pub const DEFAULT_STATS_HISTORY_SIZE: usize = 100;

/// Console credentials checked against every `auth` frame.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    secret: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Checks a credential pair. The caller reports only a generic failure,
    /// so this deliberately does not say which half was wrong.
    pub fn verify(&self, username: &str, secret: &str) -> bool {
        self.username == username && self.secret == secret
    }
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// TCP address the console server binds to
    pub bind_addr: String,

    /// Console credentials
    pub credentials: Credentials,

    /// Initial memory sampling cadence
    pub mem_stats_interval: Duration,

    /// Initial CPU sampling cadence
    pub cpu_stats_interval: Duration,

    /// Stats ticks retained for replay to newly attached consoles
    pub stats_history_size: usize,
}

impl AdminConfig {
    /// Loads configuration from `ADMOND_*` environment variables.
    ///
    /// `ADMOND_ADMIN_USER` and `ADMOND_ADMIN_SECRET` are required; the rest
    /// fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = require("ADMOND_ADMIN_USER")?;
        let secret = require("ADMOND_ADMIN_SECRET")?;

        Ok(Self {
            bind_addr: env::var("ADMOND_BIND").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            credentials: Credentials::new(username, secret),
            mem_stats_interval: Duration::from_millis(parse_var(
                "ADMOND_MEM_STATS_INTERVAL_MS",
                DEFAULT_MEM_STATS_INTERVAL_MS,
            )?),
            cpu_stats_interval: Duration::from_millis(parse_var(
                "ADMOND_CPU_STATS_INTERVAL_MS",
                DEFAULT_CPU_STATS_INTERVAL_MS,
            )?),
            stats_history_size: parse_var("ADMOND_STATS_HISTORY", DEFAULT_STATS_HISTORY_SIZE)?,
        })
    }
}

/// Reads a mandatory, non-empty variable.
fn require(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing { name }),
    }
}

/// Reads an optional numeric variable, falling back to a default.
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be set (admin console credentials are mandatory)")]
    Missing { name: &'static str },

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_verify() {
        let creds = Credentials::new("admin", "s3cret");
        assert!(creds.verify("admin", "s3cret"));
        assert!(!creds.verify("admin", "wrong"));
        assert!(!creds.verify("wrong", "s3cret"));
        assert!(!creds.verify("", ""));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_BIND_ADDR, "127.0.0.1:9981");
        assert_eq!(DEFAULT_MEM_STATS_INTERVAL_MS, 5000);
        assert_eq!(DEFAULT_CPU_STATS_INTERVAL_MS, 5000);
        assert_eq!(DEFAULT_STATS_HISTORY_SIZE, 100);
    }
}
