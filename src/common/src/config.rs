//! Configuration loading from environment variables.

use chrono::FixedOffset;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidVar(String, String),
}

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL; absent when running store-less tools
    /// or the in-memory catalog.
    pub database_url: Option<String>,

    /// Default admission threshold when the settings store is not wired in
    pub discount_threshold: i32,

    /// Seconds between ingestion cycles
    pub scan_interval_secs: u64,

    /// Reference timezone for the ledger's calendar-day rule
    pub history_tz: FixedOffset,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional variables (with defaults):
    /// - DATABASE_URL: PostgreSQL connection string (required only for
    ///   the Postgres catalog)
    /// - DISCOUNT_THRESHOLD: admission threshold, 0-100 (default: 80)
    /// - SCAN_INTERVAL_SECS: ingestion cycle interval (default: 1800)
    /// - HISTORY_TZ_OFFSET_MINUTES: ledger day offset from UTC
    ///   (default: 330, IST)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_env_only()
    }

    /// Load configuration from environment variables only (no .env file).
    /// Useful for testing.
    pub fn from_env_only() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok();

        let discount_threshold = parse_var("DISCOUNT_THRESHOLD", 80)?;
        if !(0..=100).contains(&discount_threshold) {
            return Err(ConfigError::InvalidVar(
                "DISCOUNT_THRESHOLD".to_string(),
                format!("{discount_threshold} is not in 0-100"),
            ));
        }

        let scan_interval_secs = parse_var("SCAN_INTERVAL_SECS", 1800u64)?;

        let offset_minutes: i32 = parse_var("HISTORY_TZ_OFFSET_MINUTES", 330)?;
        let history_tz = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            ConfigError::InvalidVar(
                "HISTORY_TZ_OFFSET_MINUTES".to_string(),
                format!("{offset_minutes} is out of range"),
            )
        })?;

        Ok(Self {
            database_url,
            discount_threshold,
            scan_interval_secs,
            history_tz,
        })
    }

    /// Database URL, or an error for code paths that cannot run without one.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidVar(key.to_string(), raw)),
        Err(_) => Ok(default),
    }
}
