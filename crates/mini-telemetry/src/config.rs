//! Telemetry configuration.

use std::env;

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable single-line output.
    Plain,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parse `plain`/`json` (case-insensitive). Anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Some(Self::Plain),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,

    /// Log level filter, either an `EnvFilter` directive or a
    /// `module:level` list such as `*:error,p2p:info`
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,

    /// Whether to write log events to stderr at all
    pub console_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "minid".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            console_output: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MINI_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `MINI_LOG_FORMAT`: `plain` or `json` (default: plain)
    /// - `MINI_CONSOLE_OUTPUT`: Enable console output (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: defaults.service_name,

            log_level: env::var("MINI_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            log_format: env::var("MINI_LOG_FORMAT")
                .ok()
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),

            console_output: env::var("MINI_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}
