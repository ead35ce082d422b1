//! `tracing` subscriber setup.
//!
//! Library code only emits events; binaries and tests call [`init`] once to see them.

use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;

pub const DEFAULT_FILTER: &str = "frameflow=info,warn";

/// Builds the filter from `FRAMEFLOW_LOG`, falling back to [`DEFAULT_FILTER`] when it
/// is unset or does not parse.
#[must_use]
pub fn env_filter(config: &EnvConfig) -> EnvFilter {
    config
        .log_filter
        .as_deref()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a stderr fmt subscriber. Returns `false` when a global subscriber was
/// already set, which makes repeated calls harmless.
pub fn init(config: &EnvConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
