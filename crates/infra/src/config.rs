//! Configuration loading and representation.
//!
//! Values come from environment variables. `from_lookup` takes the lookup as a
//! closure so tests never touch the process environment.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

pub const ENV_LOCK_TIMEOUT_MS: &str = "REMIT_LOCK_TIMEOUT_MS";
pub const ENV_SELF_TRANSFER: &str = "REMIT_SELF_TRANSFER";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_DB_MAX_CONNECTIONS: &str = "REMIT_DB_MAX_CONNECTIONS";
pub const ENV_DB_ACQUIRE_TIMEOUT_MS: &str = "REMIT_DB_ACQUIRE_TIMEOUT_MS";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// What the engine does when sender and resolved receiver are the same account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfTransferPolicy {
    /// Post the DEBIT/CREDIT pair against the one account (net balance unchanged).
    #[default]
    Allow,
    /// Fail before any lock is taken.
    Reject,
}

impl FromStr for SelfTransferPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(SelfTransferPolicy::Allow),
            "reject" => Ok(SelfTransferPolicy::Reject),
            other => Err(format!("expected 'allow' or 'reject', got '{other}'")),
        }
    }
}

/// Transfer engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on acquiring all account locks of one operation.
    pub lock_timeout: Duration,
    pub self_transfer: SelfTransferPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            self_transfer: SelfTransferPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let lock_timeout = match lookup(ENV_LOCK_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(parse(ENV_LOCK_TIMEOUT_MS, &raw)?),
            None => defaults.lock_timeout,
        };
        if lock_timeout.is_zero() {
            tracing::warn!("{ENV_LOCK_TIMEOUT_MS}=0; every contended transfer will time out");
        }
        let self_transfer = match lookup(ENV_SELF_TRANSFER) {
            Some(raw) => parse(ENV_SELF_TRANSFER, &raw)?,
            None => defaults.self_transfer,
        };

        Ok(Self {
            lock_timeout,
            self_transfer,
        })
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_self_transfer(mut self, policy: SelfTransferPolicy) -> Self {
        self.self_transfer = policy;
        self
    }
}

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup(ENV_DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_DATABASE_URL))?;
        let mut config = Self::new(url);

        if let Some(raw) = lookup(ENV_DB_MAX_CONNECTIONS) {
            config.max_connections = parse(ENV_DB_MAX_CONNECTIONS, &raw)?;
            if config.max_connections == 0 {
                return Err(ConfigError::Invalid {
                    key: ENV_DB_MAX_CONNECTIONS,
                    value: raw,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if let Some(raw) = lookup(ENV_DB_ACQUIRE_TIMEOUT_MS) {
            config.acquire_timeout = Duration::from_millis(parse(ENV_DB_ACQUIRE_TIMEOUT_MS, &raw)?);
        }

        Ok(config)
    }

    /// Open a connection pool with these settings.
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.url)
            .await
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
