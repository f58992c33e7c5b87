//! Pool configuration

use std::env;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Environment variable overriding the sweep interval, in milliseconds
pub const SWEEP_INTERVAL_ENV: &str = "ENDPOINT_POOL_SWEEP_INTERVAL_MS";

/// Environment variable selecting the poll strategy (`none` disables the
/// poll set and backup polling)
pub const POLL_STRATEGY_ENV: &str = "ENDPOINT_POOL_POLL_STRATEGY";

/// Environment variable overriding the backup poll interval, in milliseconds
pub const BACKUP_POLL_INTERVAL_ENV: &str = "ENDPOINT_POOL_BACKUP_POLL_INTERVAL_MS";

/// Default time between sweeps of unused endpoints
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(1000);

/// Default time between backup polls
pub const DEFAULT_BACKUP_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Endpoint pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// How often the sweeper looks for endpoints nobody uses
    pub sweep_interval: Duration,

    /// Attach registered endpoints to a shared poll set
    pub poll_set_enabled: bool,

    /// How often the backup poller drives attached endpoints (zero disables)
    pub backup_poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            poll_set_enabled: true,
            backup_poll_interval: DEFAULT_BACKUP_POLL_INTERVAL,
        }
    }
}

impl PoolConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Invalid values are logged and ignored, never fatal.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let sweep_interval = match read_millis(SWEEP_INTERVAL_ENV) {
            Ok(Some(interval)) => interval,
            Ok(None) => defaults.sweep_interval,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    default_ms = defaults.sweep_interval.as_millis() as u64,
                    "Invalid sweep interval, using default"
                );
                defaults.sweep_interval
            }
        };

        let backup_poll_interval = match read_millis(BACKUP_POLL_INTERVAL_ENV) {
            Ok(Some(interval)) => interval,
            Ok(None) => defaults.backup_poll_interval,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    default_ms = defaults.backup_poll_interval.as_millis() as u64,
                    "Invalid backup poll interval, using default"
                );
                defaults.backup_poll_interval
            }
        };

        Self {
            sweep_interval,
            poll_set_enabled: poll_strategy_enabled(),
            backup_poll_interval,
        }
    }

    /// Build a config from the environment, rejecting invalid values
    pub fn try_from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            sweep_interval: read_millis(SWEEP_INTERVAL_ENV)?.unwrap_or(defaults.sweep_interval),
            poll_set_enabled: poll_strategy_enabled(),
            backup_poll_interval: read_millis(BACKUP_POLL_INTERVAL_ENV)?
                .unwrap_or(defaults.backup_poll_interval),
        })
    }

    /// Set the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the backup poll interval (zero disables backup polling)
    pub fn backup_poll_interval(mut self, interval: Duration) -> Self {
        self.backup_poll_interval = interval;
        self
    }

    /// Disable the shared poll set and backup polling
    pub fn disable_poll_set(mut self) -> Self {
        self.poll_set_enabled = false;
        self
    }
}

/// Parse a non-negative millisecond count
pub fn parse_millis(name: &'static str, raw: &str) -> std::result::Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidMillis {
            name,
            value: raw.to_owned(),
        })
}

fn read_millis(name: &'static str) -> std::result::Result<Option<Duration>, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_millis(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn poll_strategy_enabled() -> bool {
    match env::var(POLL_STRATEGY_ENV) {
        Ok(strategy) => strategy.trim() != "none",
        Err(_) => true,
    }
}
