//! # Mini Telemetry
//!
//! Logging and metrics for the Mini-Chain node.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an `EnvFilter` and a plain or JSON
//!   fmt layer on stderr
//! - **Metrics**: Prometheus counters/gauges/histograms in one registry,
//!   scraped from the REST listener
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mini_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MINI_LOG_LEVEL` | `info` | Log level filter |
//! | `MINI_LOG_FORMAT` | `plain` | `plain` or `json` |
//! | `MINI_CONSOLE_OUTPUT` | `true` | Write logs to stderr |

mod config;
mod logging;
pub mod metrics;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::translate_log_level;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, BLOCKS_FINALIZED, BOOTSTRAP_DURATION,
    COMPONENTS_RUNNING, COMPONENT_TRANSITIONS, PROVIDER_INVOCATIONS, QUERY_REQUESTS, RESOLUTIONS,
    STORE_COMMITS, STORE_VERSION,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logger: {0}")]
    LoggerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics and install the global log subscriber.
///
/// Returns a guard that should be held for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so bootstrap events are counted
    register_metrics()?;
    logging::init_logging(&config)?;

    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}

/// Convenience macro for creating a span with component context.
///
/// ```rust,ignore
/// let _span = component_span!("start", component = "rest").entered();
/// ```
#[macro_export]
macro_rules! component_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
