use std::time::Duration;

/// Default log filter expression used by the worker.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Grace period applied when the parent disappears without sending `Finish`.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 1_000;

/// Per-send timeout; zero leaves sink deliveries unbounded.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 0;

/// Default log filter expression used by the worker.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the worker.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default grace period, in milliseconds.
#[must_use]
pub const fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}

/// Default per-send timeout, in milliseconds.
#[must_use]
pub const fn default_send_timeout_ms() -> u64 {
    DEFAULT_SEND_TIMEOUT_MS
}

/// Converts a millisecond budget into an optional timeout, treating zero as
/// "no timeout".
#[must_use]
pub const fn timeout_from_millis(millis: u64) -> Option<Duration> {
    if millis == 0 {
        None
    } else {
        Some(Duration::from_millis(millis))
    }
}
