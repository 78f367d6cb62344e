//! Process configuration parsed from environment variables.
//!
//! Absent or unparseable values fall back to defaults; only `DATABASE_URL`
//! is optional without a default (no database means an in-process archive).

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub stats_interval: Duration,
    /// Outbound queue depth per websocket connection.
    pub client_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            stats_interval: Duration::from_secs(DEFAULT_STATS_INTERVAL_SECS),
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `DATABASE_URL`: Postgres URL for the history archive
    /// - `STATS_INTERVAL_SECS`: default 3600
    /// - `CLIENT_CHANNEL_CAPACITY`: default 256
    #[must_use]
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let stats_secs = env_parse("STATS_INTERVAL_SECS", DEFAULT_STATS_INTERVAL_SECS).max(1);

        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url,
            stats_interval: Duration::from_secs(stats_secs),
            client_channel_capacity: env_parse("CLIENT_CHANNEL_CAPACITY", DEFAULT_CLIENT_CHANNEL_CAPACITY).max(1),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
