//! Session configuration management
//!
//! Handles loading configuration from TOML files, environment variables and
//! caller-supplied overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Environment variable for the nesting bound.
pub const ENV_MAX_DEPTH: &str = "FWDAD_MAX_DEPTH";
/// Environment variable for the log level.
pub const ENV_LOG_LEVEL: &str = "FWDAD_LOG_LEVEL";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The nesting bound is zero.
    #[error("Invalid max depth: {0}. Must be at least 1")]
    InvalidMaxDepth(usize),

    /// Unrecognised log level string.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// The configuration file could not be read or parsed.
    #[error("Configuration file error: {0}")]
    FileError(String),

    /// An environment variable holds an unusable value.
    #[error("Environment variable error: {0}")]
    EnvError(String),
}

/// Verbosity of the `fwdad` tracing output.
///
/// The same lowercase name is accepted in `log_level = "..."`,
/// `FWDAD_LOG_LEVEL` and `--log-level`, and is printed back by `fwdad check`.
/// `--verbose` is shorthand for `debug`.
///
/// | Name | What shows up |
/// |------|---------------|
/// | `trace` | host engine level allocation and release |
/// | `debug` | level enter/exit, dual registration and purges |
/// | `info` | command start-up (default) |
/// | `warn` | levels closed by a guard on drop, failed drop-time exits |
/// | `error` | nothing from this crate |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// `trace`
    Trace,
    /// `debug`
    Debug,
    /// `info`
    #[default]
    Info,
    /// `warn`
    Warn,
    /// `error`
    Error,
}

impl LogLevel {
    /// Every level, most verbose first.
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    /// Lowercase name, usable directly as an `EnvFilter` directive.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// The matching `tracing` level filter.
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_filter_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::InvalidLogLevel(s.to_string()))
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

/// Forward-AD session configuration
///
/// # Default Values
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `max_depth` | 64 | Maximum number of simultaneously live levels |
/// | `log_level` | info | Filter used by the CLI tracing subscriber |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardAdConfig {
    /// Maximum number of simultaneously live levels
    pub max_depth: usize,
    /// Log level
    pub log_level: LogLevel,
}

impl Default for ForwardAdConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            log_level: LogLevel::Info,
        }
    }
}

impl ForwardAdConfig {
    /// Create a new ForwardAdConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the nesting bound.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the log level.
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ForwardAdConfig = toml::from_str(content)
            .map_err(|e| ConfigError::FileError(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileError(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Apply `FWDAD_*` environment variables on top of this configuration
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(depth) = std::env::var(ENV_MAX_DEPTH) {
            self.max_depth = depth.trim().parse().map_err(|_| {
                ConfigError::EnvError(format!("{}={} is not a non-negative integer", ENV_MAX_DEPTH, depth))
            })?;
        }

        if let Ok(log_level) = std::env::var(ENV_LOG_LEVEL) {
            self.log_level = LogLevel::from_str(&log_level)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth(self.max_depth));
        }
        Ok(())
    }

    /// Merge with explicit overrides (overrides take precedence)
    pub fn merge_overrides(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(max_depth) = overrides.max_depth {
            self.max_depth = max_depth;
        }
        if let Some(log_level) = &overrides.log_level {
            self.log_level = LogLevel::from_str(log_level)?;
        }
        Ok(())
    }
}

/// Caller-supplied overrides, typically from command-line flags
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Config file path
    pub config_file: Option<std::path::PathBuf>,
    /// Nesting bound override
    pub max_depth: Option<usize>,
    /// Log level override
    pub log_level: Option<String>,
}

/// Build configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Overrides
/// 2. Environment variables
/// 3. Config file
/// 4. Default values
pub fn build_config(overrides: &ConfigOverrides) -> Result<ForwardAdConfig, ConfigError> {
    let config = if let Some(path) = &overrides.config_file {
        ForwardAdConfig::from_file(path)?
    } else {
        ForwardAdConfig::default()
    };

    let mut config = config.apply_env()?;
    config.merge_overrides(overrides)?;

    config.validate()?;
    Ok(config)
}
