use std::{str::FromStr, time::Duration};

use anyhow::Context;

use crate::chat::DEFAULT_PAGE_SIZE;

/// Process configuration, read from the environment (and `.env`, if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://whispers.db".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            max_connections: 16,
            busy_timeout: Duration::from_millis(5000),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // a missing .env is normal outside development
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to the defaults for
    /// keys it doesn't know.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: parsed(&lookup, "MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            busy_timeout: parsed(&lookup, "BUSY_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.busy_timeout),
            page_size: parsed(&lookup, "PAGE_SIZE")?.unwrap_or(defaults.page_size),
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .with_context(|| format!("{key} must be a number, got {raw:?}"))
        })
        .transpose()
}
