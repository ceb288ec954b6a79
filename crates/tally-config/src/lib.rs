//! Shared configuration for the tally analytics relay.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! configuration file (`--config-path` or `TALLY_CONFIG_PATH`), then
//! `TALLY_*` environment variables, then command-line flags.

mod defaults;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_GRACE_PERIOD_MS, DEFAULT_LOG_FILTER, DEFAULT_SEND_TIMEOUT_MS, default_grace_period_ms,
    default_log_filter, default_log_filter_string, default_log_format, default_send_timeout_ms,
    timeout_from_millis,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Command-line flags understood by the configuration loader.
///
/// Binaries use this list to separate configuration flags from their own
/// positional arguments before handing the former to [`Config`].
pub const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--grace-period-ms",
    "--send-timeout-ms",
];

/// Resolved worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TALLY")]
pub struct Config {
    /// `tracing` filter expression applied to the worker's logs.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Milliseconds to wait after an unannounced disconnect before draining.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Milliseconds allowed for a single sink delivery; zero disables the limit.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            grace_period_ms: default_grace_period_ms(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl Config {
    /// Filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Selected log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Grace period applied when the parent disconnects without `Finish`.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Upper bound for a single sink delivery, if any.
    #[must_use]
    pub const fn send_timeout(&self) -> Option<Duration> {
        timeout_from_millis(self.send_timeout_ms)
    }
}
