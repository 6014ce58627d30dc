//! Prometheus metrics for the allocation service
//!
//! Tracks:
//! - Allocation engine: allocations created per path, room conflicts, batch runs
//! - Notifications: deliveries per channel and result
//! - HTTP API: requests per endpoint and status, request duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Allocation engine and notification metrics
struct AllocationMetrics {
    allocations_created: CounterVec,
    room_conflicts: Counter,
    batch_runs: CounterVec,
    batch_duration: Histogram,
    notifications: CounterVec,
}

/// HTTP API metrics
struct ApiMetrics {
    requests: CounterVec,
    duration: HistogramVec,
}

static ALLOCATION_METRICS: OnceLock<AllocationMetrics> = OnceLock::new();

static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Call once at startup. Registration failures are returned; the
/// application can keep running and metric calls become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = class_organize::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let allocation = AllocationMetrics {
        allocations_created: register_counter_vec!(
            "class_organize_allocations_created_total",
            "Allocations created, by path (single, batch)",
            &["path"]
        )?,
        room_conflicts: register_counter!(
            "class_organize_room_conflicts_total",
            "Allocation writes rejected because the room was already booked"
        )?,
        batch_runs: register_counter_vec!(
            "class_organize_batch_runs_total",
            "Auto-allocation runs by outcome",
            &["outcome"]
        )?,
        batch_duration: register_histogram!(
            "class_organize_batch_duration_seconds",
            "Auto-allocation run duration in seconds",
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        )?,
        notifications: register_counter_vec!(
            "class_organize_notifications_total",
            "Notification deliveries by channel and result",
            &["channel", "result"]
        )?,
    };

    let api = ApiMetrics {
        requests: register_counter_vec!(
            "class_organize_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        duration: register_histogram_vec!(
            "class_organize_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
    };

    ALLOCATION_METRICS
        .set(allocation)
        .map_err(|_| "Allocation metrics already initialized")?;
    API_METRICS
        .set(api)
        .map_err(|_| "API metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    ALLOCATION_METRICS.get().is_some() && API_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record created allocations for a path (`single` or `batch`)
pub fn record_allocations_created(path: &str, count: usize) {
    if count == 0 {
        return;
    }
    if let Some(m) = ALLOCATION_METRICS.get() {
        m.allocations_created
            .with_label_values(&[path])
            .inc_by(count as f64);
    }
}

/// Record a rejected room booking
pub fn record_room_conflict() {
    if let Some(m) = ALLOCATION_METRICS.get() {
        m.room_conflicts.inc();
    }
}

/// Record the outcome of an auto-allocation run
pub fn record_batch_run(outcome: &str) {
    if let Some(m) = ALLOCATION_METRICS.get() {
        m.batch_runs.with_label_values(&[outcome]).inc();
    }
}

/// Record a notification delivery attempt
pub fn record_notification(channel: &str, delivered: bool) {
    let Some(m) = ALLOCATION_METRICS.get() else {
        return;
    };

    let result = if delivered { "delivered" } else { "failed" };
    m.notifications
        .with_label_values(&[channel, result])
        .inc();
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start timing an auto-allocation run
pub fn start_batch_timer() -> MetricsTimer {
    match ALLOCATION_METRICS.get() {
        Some(m) => MetricsTimer::new(m.batch_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
