//! Service configuration.
//!
//! Read from the process environment (after `.env` is loaded by `main`).
//! Every setting has a default; a value that is set but unparseable is an error.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::upload::LifecycleTiming;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_TICK_MS: u64 = 200;
pub const DEFAULT_SETTLE_MS: u64 = 500;
pub const DEFAULT_FAILURE_RATE: f64 = 0.10;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_NOTIFICATION_HISTORY: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Directory of document JSON files; `None` serves the sample catalog.
    pub documents_dir: Option<PathBuf>,
    pub tick_interval: Duration,
    pub settle_delay: Duration,
    /// Probability in [0, 1] that a finished upload resolves to `error`.
    pub failure_rate: f64,
    pub max_upload_bytes: u64,
    pub notification_history: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            documents_dir: None,
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
            failure_rate: DEFAULT_FAILURE_RATE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            notification_history: DEFAULT_NOTIFICATION_HISTORY,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let failure_rate: f64 = parse_var(&get, "UPLOAD_FAILURE_RATE")?.unwrap_or(defaults.failure_rate);
        if !failure_rate.is_finite() {
            anyhow::bail!("UPLOAD_FAILURE_RATE must be a finite number");
        }

        Ok(Self {
            bind_addr: get("INBOX_BIND_ADDR").unwrap_or(defaults.bind_addr),
            documents_dir: get("INBOX_DOCUMENTS_DIR").map(PathBuf::from),
            tick_interval: parse_var(&get, "UPLOAD_TICK_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            settle_delay: parse_var(&get, "UPLOAD_SETTLE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_delay),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            max_upload_bytes: parse_var(&get, "UPLOAD_MAX_BYTES")?.unwrap_or(defaults.max_upload_bytes),
            notification_history: parse_var(&get, "NOTIFICATION_HISTORY")?
                .unwrap_or(defaults.notification_history),
        })
    }

    pub fn timing(&self) -> LifecycleTiming {
        LifecycleTiming {
            tick_interval: self.tick_interval,
            settle_delay: self.settle_delay,
        }
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}
