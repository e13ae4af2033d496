//! Logging infrastructure - structured tracing throughout the engine
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels via environment
//! - Zero-cost when disabled
//! - Optional JSON output for machine consumption

use once_cell::sync::OnceCell;
use std::io;
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // DYNABIND_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("DYNABIND_LOG_LEVEL") {
            config.level = match level_str.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            };
        }

        // DYNABIND_LOG_JSON: enable JSON format
        config.json_format = std::env::var("DYNABIND_LOG_JSON").is_ok();

        config
    }
}

/// Initialize logging with configuration taken from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "dynabind={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let registry = tracing_subscriber::registry().with(env_filter);
        if config.json_format {
            registry
                .with(fmt::layer().json().with_writer(io::stdout).with_target(true))
                .init();
        } else {
            registry
                .with(fmt::layer().with_writer(io::stdout).with_target(true))
                .init();
        }
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json_format);
    }

    #[test]
    fn test_init_idempotent() {
        init();
        init(); // Should not panic
        assert!(is_initialized());
    }
}
