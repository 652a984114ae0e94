//! Engine configuration, loaded from defaults or the environment.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use crate::consts::{
    DEFAULT_APPEND_RETRIES, DEFAULT_APPEND_RETRY_BASE_MS, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH,
    DEFAULT_MAX_HISTORY, DEFAULT_SMOOTHING, MAX_CANVAS_SIZE, MAX_LAYERS,
};

/// Tuning knobs for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of layers a document may hold.
    pub max_layers: usize,
    /// Committed history depth; `0` keeps every entry.
    pub max_history: usize,
    /// Largest accepted canvas edge in pixels.
    pub max_canvas_size: u32,
    /// Size of the blank canvas a new project starts with.
    pub default_width: u32,
    pub default_height: u32,
    /// Initial stroke smoothing level (0..=5).
    pub smoothing: u8,
    /// Attempts per journal append before the record is dropped.
    pub append_retries: usize,
    /// Linear back-off step between append attempts, in milliseconds.
    pub append_retry_base_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_layers: MAX_LAYERS,
            max_history: DEFAULT_MAX_HISTORY,
            max_canvas_size: MAX_CANVAS_SIZE,
            default_width: DEFAULT_CANVAS_WIDTH,
            default_height: DEFAULT_CANVAS_HEIGHT,
            smoothing: DEFAULT_SMOOTHING,
            append_retries: DEFAULT_APPEND_RETRIES,
            append_retry_base_ms: DEFAULT_APPEND_RETRY_BASE_MS,
        }
    }
}

impl EngineConfig {
    /// Read overrides from `PAINTLOG_*` variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_layers: env_parse("PAINTLOG_MAX_LAYERS", defaults.max_layers).max(1),
            max_history: env_parse("PAINTLOG_MAX_HISTORY", defaults.max_history),
            max_canvas_size: env_parse("PAINTLOG_MAX_CANVAS_SIZE", defaults.max_canvas_size).max(1),
            default_width: env_parse("PAINTLOG_CANVAS_WIDTH", defaults.default_width).max(1),
            default_height: env_parse("PAINTLOG_CANVAS_HEIGHT", defaults.default_height).max(1),
            smoothing: env_parse("PAINTLOG_SMOOTHING", defaults.smoothing).min(5),
            append_retries: env_parse("PAINTLOG_APPEND_RETRIES", defaults.append_retries).max(1),
            append_retry_base_ms: env_parse("PAINTLOG_APPEND_RETRY_BASE_MS", defaults.append_retry_base_ms),
        }
    }

    /// History bound as an option; `None` when unbounded.
    #[must_use]
    pub fn history_limit(&self) -> Option<usize> {
        (self.max_history > 0).then_some(self.max_history)
    }
}

/// Parse an environment variable, returning `default` when unset or invalid.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
