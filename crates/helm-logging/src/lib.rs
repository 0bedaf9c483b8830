//! # helm-logging
//!
//! Structured logging with `tracing`.
//!
//! All Helm crates instrument with `tracing`; this crate owns subscriber
//! installation so embedders initialize once, at process start, with either
//! human-readable or JSON output.

#![deny(unsafe_code)]

use tracing_subscriber::EnvFilter;

/// Logging configuration.
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Filter directive applied when `HELM_LOG` is unset (e.g. `info`).
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: false,
        }
    }
}

/// Install the global tracing subscriber.
///
/// The filter is taken from the `HELM_LOG` environment variable when set,
/// falling back to `config.default_filter`. Returns `false` if a global
/// subscriber was already installed (e.g. by a test harness), which is not
/// an error.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_env("HELM_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}
