//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in secrecy::SecretString so it
//! never lands in logs.

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub timing: Timing,
}

/// Durations that drive reservation expiry and answer editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How often the reaper sweeps for abandoned reservations.
    pub reaper_interval: Duration,
    /// Age after which an unfinalized reservation is considered abandoned.
    pub reservation_grace: Duration,
    /// How long a non-admin may keep revising an answer after its last change.
    pub edit_window: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reaper_interval: Duration::from_secs(5),
            reservation_grace: Duration::from_secs(5 * 60),
            edit_window: Duration::from_secs(30 * 60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Timing::default();
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            timing: Timing {
                reaper_interval: seconds_var("REAPER_INTERVAL_SECS", defaults.reaper_interval)?,
                reservation_grace: seconds_var(
                    "RESERVATION_GRACE_SECS",
                    defaults.reservation_grace,
                )?,
                edit_window: seconds_var("EDIT_WINDOW_SECS", defaults.edit_window)?,
            },
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn seconds_var(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => parse_seconds(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_seconds(name: &str, raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a whole number of seconds, got {raw:?}")))?;
    if secs == 0 {
        return Err(Error::Config(format!("{name} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(
            parse_seconds("X", " 42 ").unwrap(),
            Duration::from_secs(42)
        );
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(matches!(parse_seconds("X", "0"), Err(Error::Config(_))));
        assert!(matches!(parse_seconds("X", "5m"), Err(Error::Config(_))));
    }
}
