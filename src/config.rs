//! Environment configuration.

use std::env;

pub const PRESET_VAR: &str = "FRAMEFLOW_PRESET";
pub const HIGHLIGHT_THEME_VAR: &str = "FRAMEFLOW_HIGHLIGHT_THEME";
pub const LOG_VAR: &str = "FRAMEFLOW_LOG";
pub const TRACE_VAR: &str = "FRAMEFLOW_TRACE";

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// Preset name; `None` means `full`.
    pub preset: Option<String>,
    /// syntect theme name; `None` means the built-in default.
    pub highlight_theme: Option<String>,
    /// `tracing` filter directive, e.g. `frameflow=debug`.
    pub log_filter: Option<String>,
    /// Record processor trace entries on frames.
    pub trace: bool,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            preset: env_string_opt(PRESET_VAR),
            highlight_theme: env_string_opt(HIGHLIGHT_THEME_VAR),
            log_filter: env_string_opt(LOG_VAR),
            trace: env_flag(TRACE_VAR),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
