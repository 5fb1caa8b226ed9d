//! Layered settings.
//!
//! Built-in defaults, then an optional TOML file, then `AGROWATCH_*`
//! environment variables (nested keys joined with `__`, e.g.
//! `AGROWATCH_BACKEND__BASE_URL`). Command-line flags are applied on top by
//! the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::backend::DEFAULT_BACKEND_URL;
use crate::binder::{BinderConfig, DEFAULT_INITIAL_RETRY};
use crate::data::{Provenance, SensorThresholds, DEFAULT_HISTORY_LIMIT};
use crate::feed::{ExponentialBackoff, FixedDelay, RetryPolicy};

/// Upper bound for every period setting: one week.
pub const MAX_PERIOD_SECS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub feed: FeedSettings,
    pub history: HistorySettings,
    pub location: LocationSettings,
    pub thresholds: SensorThresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    pub timeout_secs: f64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// WebSocket URL; derived from the backend address when unset.
    pub url: Option<String>,
    /// `host:port` of a newline-delimited JSON feed, used instead of the
    /// WebSocket when set.
    pub connect: Option<String>,
    pub reconnect_delay_secs: f64,
    pub backoff: Backoff,
    pub max_delay_secs: f64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: None,
            connect: None,
            reconnect_delay_secs: 3.0,
            backoff: Backoff::Fixed,
            max_delay_secs: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub interval_secs: f64,
    pub limit: usize,
    /// Providers in the order they are tried.
    pub providers: Vec<Provenance>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            interval_secs: 10.0,
            limit: DEFAULT_HISTORY_LIMIT,
            providers: vec![Provenance::Sheets, Provenance::Local],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationSettings {
    pub enabled: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Cache file; the platform cache directory when unset.
    pub cache_file: Option<PathBuf>,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            latitude: None,
            longitude: None,
            cache_file: None,
        }
    }
}

impl Settings {
    /// Load defaults, the optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("AGROWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.history.interval_secs > 0.0 && self.history.interval_secs <= MAX_PERIOD_SECS,
            "history.interval_secs must be positive and at most {} seconds",
            MAX_PERIOD_SECS
        );
        ensure!(self.history.limit > 0, "history.limit must be at least 1");
        ensure!(
            (0.0..=MAX_PERIOD_SECS).contains(&self.feed.reconnect_delay_secs),
            "feed.reconnect_delay_secs must be between 0 and {} seconds",
            MAX_PERIOD_SECS
        );
        ensure!(
            (0.0..=MAX_PERIOD_SECS).contains(&self.feed.max_delay_secs),
            "feed.max_delay_secs must be between 0 and {} seconds",
            MAX_PERIOD_SECS
        );
        ensure!(
            self.backend.timeout_secs > 0.0 && self.backend.timeout_secs <= MAX_PERIOD_SECS,
            "backend.timeout_secs must be positive and at most {} seconds",
            MAX_PERIOD_SECS
        );
        Ok(())
    }

    /// The WebSocket URL of the push channel.
    ///
    /// Without an explicit `feed.url`, the backend address is reused with
    /// its scheme switched to `ws`/`wss`.
    pub fn feed_url(&self) -> String {
        if let Some(url) = &self.feed.url {
            return url.clone();
        }
        let base = self.backend.base_url.trim_end_matches('/');
        let ws = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("ws://{}", base)
        };
        format!("{}/", ws)
    }

    pub fn retry_policy(&self) -> Box<dyn RetryPolicy> {
        let delay = period(self.feed.reconnect_delay_secs);
        match self.feed.backoff {
            Backoff::Fixed => Box::new(FixedDelay(delay)),
            Backoff::Exponential => Box::new(ExponentialBackoff::new(
                delay,
                period(self.feed.max_delay_secs),
            )),
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        period(self.backend.timeout_secs)
    }

    pub fn binder_config(&self) -> BinderConfig {
        BinderConfig {
            history_interval: period(self.history.interval_secs),
            initial_retry: DEFAULT_INITIAL_RETRY,
            thresholds: self.thresholds.clone(),
        }
    }
}

/// Seconds to a duration, clamped to `0..=MAX_PERIOD_SECS`. NaN maps to zero.
fn period(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_PERIOD_SECS)).unwrap_or(Duration::ZERO)
}
