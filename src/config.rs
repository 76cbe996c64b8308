//! Engine and IMAP configuration
//!
//! Both configs read from the environment, loading a `.env` file first
//! when one is present.

use crate::error::{Error, Result};
use crate::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_BACKFILL_MONTHS: u32 = 3;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Root directory of the attachment blob store.
    pub storage_dir: PathBuf,
    /// Accounts synced concurrently by a batch run.
    pub pool_size: usize,
    pub retry: RetryPolicy,
    /// How far back a folder without a watermark is fetched.
    pub backfill_months: u32,
    /// Upper bound for a single transport fetch.
    pub fetch_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./attachments"),
            pool_size: DEFAULT_POOL_SIZE,
            retry: RetryPolicy::default(),
            backfill_months: DEFAULT_BACKFILL_MONTHS,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl SyncConfig {
    /// Load the engine configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `SYNC_STORAGE_DIR` (default: `./attachments`)
    /// - `SYNC_POOL_SIZE` (default: `4`)
    /// - `SYNC_RETRY_ATTEMPTS` (default: `3`)
    /// - `SYNC_RETRY_BASE_DELAY_MS` (default: `500`)
    /// - `SYNC_BACKFILL_MONTHS` (default: `3`)
    /// - `SYNC_FETCH_TIMEOUT_SECS` (default: `120`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but not a valid
    /// number, or the pool size is zero.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`SyncConfig::from_env`].
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let pool_size = parse_or(&var, "SYNC_POOL_SIZE", defaults.pool_size)?;
        if pool_size == 0 {
            return Err(Error::Config("SYNC_POOL_SIZE must be at least 1".into()));
        }

        Ok(Self {
            storage_dir: var("SYNC_STORAGE_DIR").map_or(defaults.storage_dir, PathBuf::from),
            pool_size,
            retry: RetryPolicy::new(
                parse_or(&var, "SYNC_RETRY_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
                Duration::from_millis(parse_or(
                    &var,
                    "SYNC_RETRY_BASE_DELAY_MS",
                    u64::try_from(DEFAULT_BASE_DELAY.as_millis()).unwrap_or(u64::MAX),
                )?),
            ),
            backfill_months: parse_or(&var, "SYNC_BACKFILL_MONTHS", defaults.backfill_months)?,
            fetch_timeout: Duration::from_secs(parse_or(
                &var,
                "SYNC_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {key}: {e}")))
    })
}

/// Connection settings for an IMAP bridge
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ImapConfig {
    /// Load IMAP configuration from environment variables
    ///
    /// Required variables:
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `IMAP_HOST` (default: `127.0.0.1`)
    /// - `IMAP_PORT` (default: `1143`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or
    /// the port is not a number.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// # Errors
    ///
    /// See [`ImapConfig::from_env`].
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            host: var("IMAP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&var, "IMAP_PORT", 1143)?,
            username: var("IMAP_USERNAME")
                .ok_or_else(|| Error::Config("IMAP_USERNAME not set".into()))?,
            password: var("IMAP_PASSWORD")
                .ok_or_else(|| Error::Config("IMAP_PASSWORD not set".into()))?,
        })
    }
}
