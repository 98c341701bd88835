//! Log subscriber setup.
//!
//! The node accepts two level syntaxes: plain `EnvFilter` directives
//! (`info`, `info,mini_node=debug`) and the consensus engine's
//! `module:level` lists (`*:error,p2p:info,state:info`). The latter are
//! translated before the filter is built.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;
use crate::{TelemetryConfig, TelemetryError};

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Translate a log level string into an `EnvFilter` directive.
///
/// `*:error,p2p:info` becomes `error,p2p=info`; `none` maps to `off`.
/// Strings already in directive form pass through unchanged.
pub fn translate_log_level(level: &str) -> Result<String, TelemetryError> {
    let level = level.trim();
    if level.is_empty() {
        return Err(TelemetryError::Config("empty log level".to_string()));
    }
    if !level.contains(':') {
        return Ok(normalize_level(level).unwrap_or(level).to_string());
    }

    let mut directives = Vec::new();
    for entry in level.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (module, lvl) = entry
            .split_once(':')
            .ok_or_else(|| TelemetryError::Config(format!("malformed log level entry: {entry}")))?;
        let lvl = normalize_level(lvl).ok_or_else(|| {
            TelemetryError::Config(format!("unknown log level {lvl:?} in {entry}"))
        })?;
        if module == "*" {
            directives.push(lvl.to_string());
        } else {
            directives.push(format!("{module}={lvl}"));
        }
    }
    Ok(directives.join(","))
}

fn normalize_level(level: &str) -> Option<&'static str> {
    let lower = level.trim().to_ascii_lowercase();
    if lower == "none" {
        return Some("off");
    }
    LEVELS.iter().copied().find(|l| *l == lower)
}

/// Install the global subscriber.
pub(crate) fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let directive = translate_log_level(&config.log_level)?;
    let env_filter =
        EnvFilter::try_new(&directive).map_err(|e| TelemetryError::LoggerInit(e.to_string()))?;

    if !config.console_output {
        return tracing_subscriber::registry()
            .with(env_filter)
            .try_init()
            .map_err(|e| TelemetryError::LoggerInit(e.to_string()));
    }

    match config.log_format {
        LogFormat::Json => {
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggerInit(e.to_string()))?;
        }
        LogFormat::Plain => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::LoggerInit(e.to_string()))?;
        }
    }

    tracing::info!(
        service = %config.service_name,
        filter = %directive,
        "logging initialized"
    );
    Ok(())
}

/// Log an event tagged with the component that emitted it.
#[macro_export]
macro_rules! log_event {
    (info, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(component = $component, $($($field)*,)? $msg)
    };
    (warn, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(component = $component, $($($field)*,)? $msg)
    };
    (error, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(component = $component, $($($field)*,)? $msg)
    };
    (debug, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(component = $component, $($($field)*,)? $msg)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_consensus_levels() {
        assert_eq!(
            translate_log_level("*:error,p2p:info,state:info").unwrap(),
            "error,p2p=info,state=info"
        );
    }

    #[test]
    fn test_translate_passthrough() {
        assert_eq!(translate_log_level("info").unwrap(), "info");
        assert_eq!(translate_log_level("WARN").unwrap(), "warn");
        assert_eq!(
            translate_log_level("info,mini_node=debug").unwrap(),
            "info,mini_node=debug"
        );
    }

    #[test]
    fn test_translate_none_is_off() {
        assert_eq!(translate_log_level("*:none").unwrap(), "off");
    }

    #[test]
    fn test_translate_rejects_unknown_level() {
        assert!(translate_log_level("p2p:loud").is_err());
        assert!(translate_log_level("  ").is_err());
    }
}
