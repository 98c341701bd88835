//! Prometheus metrics for the node.
//!
//! All metrics follow the naming convention: `mini_<area>_<metric>_<unit>`
//! and live in a single process-wide [`REGISTRY`] served by the REST
//! listener at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // DEPENDENCY RESOLUTION
    // =========================================================================

    /// Resolutions by mode (client/server) and outcome
    pub static ref RESOLUTIONS: CounterVec = CounterVec::new(
        Opts::new("mini_inject_resolutions_total", "Dependency resolutions"),
        &["mode", "outcome"]
    ).expect("metric creation failed");

    /// Providers and invokers run across all resolutions
    pub static ref PROVIDER_INVOCATIONS: Counter = Counter::new(
        "mini_inject_provider_invocations_total",
        "Providers and invokers invoked during resolution"
    ).expect("metric creation failed");

    /// Time from process start to a running node
    pub static ref BOOTSTRAP_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "mini_node_bootstrap_duration_seconds",
            "Time spent resolving, composing and starting the node"
        ).buckets(exponential_buckets(0.001, 2.0, 14).expect("bucket creation failed"))
    ).expect("metric creation failed");

    // =========================================================================
    // COMPONENT LIFECYCLE
    // =========================================================================

    /// Lifecycle transitions by component, phase and outcome
    pub static ref COMPONENT_TRANSITIONS: CounterVec = CounterVec::new(
        Opts::new("mini_component_transitions_total", "Component lifecycle transitions"),
        &["component", "phase", "outcome"]  // phase: init/start/stop, outcome: ok/error
    ).expect("metric creation failed");

    /// Components currently running
    pub static ref COMPONENTS_RUNNING: Gauge = Gauge::new(
        "mini_components_running",
        "Number of server components in the running state"
    ).expect("metric creation failed");

    // =========================================================================
    // STORE / CONSENSUS
    // =========================================================================

    /// Store commits
    pub static ref STORE_COMMITS: Counter = Counter::new(
        "mini_store_commits_total",
        "Total number of root store commits"
    ).expect("metric creation failed");

    /// Latest committed store version
    pub static ref STORE_VERSION: Gauge = Gauge::new(
        "mini_store_version",
        "Latest committed root store version"
    ).expect("metric creation failed");

    /// Blocks finalized by the consensus loop
    pub static ref BLOCKS_FINALIZED: Counter = Counter::new(
        "mini_consensus_blocks_finalized_total",
        "Total number of blocks finalized"
    ).expect("metric creation failed");

    // =========================================================================
    // QUERY SURFACES
    // =========================================================================

    /// Query requests by surface (grpc/gateway/rest) and outcome
    pub static ref QUERY_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("mini_query_requests_total", "Query requests served"),
        &["surface", "outcome"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; metrics already registered are skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Resolution
        Box::new(RESOLUTIONS.clone()),
        Box::new(PROVIDER_INVOCATIONS.clone()),
        Box::new(BOOTSTRAP_DURATION.clone()),
        // Lifecycle
        Box::new(COMPONENT_TRANSITIONS.clone()),
        Box::new(COMPONENTS_RUNNING.clone()),
        // Store / consensus
        Box::new(STORE_COMMITS.clone()),
        Box::new(STORE_VERSION.clone()),
        Box::new(BLOCKS_FINALIZED.clone()),
        // Queries
        Box::new(QUERY_REQUESTS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
