//! Prometheus metrics for the sync client.
//!
//! All metrics follow the naming convention: `pulse_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g. frames_received_total)
//! - **Gauge**: Value that can go up or down (e.g. connection_state)
//! - **Histogram**: Distribution of values (e.g. fetch_duration_seconds)

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
    // ROUTER METRICS
    // =========================================================================

    /// Raw frames received on the push channel
    pub static ref FRAMES_RECEIVED: Counter = Counter::new(
        "pulse_router_frames_received_total",
        "Total push frames received"
    ).expect("metric creation failed");

    /// Frames dropped by schema validation
    pub static ref FRAMES_MALFORMED: Counter = Counter::new(
        "pulse_router_frames_malformed_total",
        "Total push frames dropped as malformed"
    ).expect("metric creation failed");

    /// Messages handed to subscribers (one per subscriber callback)
    pub static ref MESSAGES_DELIVERED: Counter = Counter::new(
        "pulse_router_messages_delivered_total",
        "Total subscriber deliveries"
    ).expect("metric creation failed");

    /// Subscriber callbacks that panicked
    pub static ref SUBSCRIBER_PANICS: CounterVec = CounterVec::new(
        Opts::new("pulse_subscriber_panics_total", "Subscriber callbacks that panicked"),
        &["registry"]  // registry: messages/state
    ).expect("metric creation failed");

    // =========================================================================
    // CONNECTION METRICS
    // =========================================================================

    /// Scheduled automatic reconnects
    pub static ref RECONNECT_ATTEMPTS: Counter = Counter::new(
        "pulse_connection_reconnect_attempts_total",
        "Total automatic reconnect attempts scheduled"
    ).expect("metric creation failed");

    /// Connection state (0 disconnected, 1 connecting, 2 connected, 3 failed)
    pub static ref CONNECTION_STATE: Gauge = Gauge::new(
        "pulse_connection_state",
        "Current push connection state"
    ).expect("metric creation failed");

    /// Connections closed after a missed heartbeat
    pub static ref HEARTBEAT_TIMEOUTS: Counter = Counter::new(
        "pulse_connection_heartbeat_timeouts_total",
        "Connections force-closed for missing inbound traffic"
    ).expect("metric creation failed");

    // =========================================================================
    // CACHE METRICS
    // =========================================================================

    /// Cache lookups by outcome
    pub static ref CACHE_LOOKUPS: CounterVec = CounterVec::new(
        Opts::new("pulse_cache_lookups_total", "Cache lookups"),
        &["outcome"]  // outcome: hit/miss/join
    ).expect("metric creation failed");

    /// Failed fetches by reason
    pub static ref FETCH_FAILURES: CounterVec = CounterVec::new(
        Opts::new("pulse_cache_fetch_failures_total", "Failed pull fetches"),
        &["reason"]  // reason: network/timeout/status/rejected/decode/aborted
    ).expect("metric creation failed");

    /// Fetch latency
    pub static ref FETCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "pulse_cache_fetch_duration_seconds",
            "Time spent in pull fetches"
        ).buckets(exponential_buckets(0.005, 2.0, 12).expect("bucket creation failed"))
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already registered collectors are skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(FRAMES_RECEIVED.clone()),
        Box::new(FRAMES_MALFORMED.clone()),
        Box::new(MESSAGES_DELIVERED.clone()),
        Box::new(SUBSCRIBER_PANICS.clone()),
        Box::new(RECONNECT_ATTEMPTS.clone()),
        Box::new(CONNECTION_STATE.clone()),
        Box::new(HEARTBEAT_TIMEOUTS.clone()),
        Box::new(CACHE_LOOKUPS.clone()),
        Box::new(FETCH_FAILURES.clone()),
        Box::new(FETCH_DURATION.clone()),
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
pub fn gather_text() -> Result<String, TelemetryError> {
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
