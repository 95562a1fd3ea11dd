//! Prometheus metrics for perpgate.
//!
//! Covers:
//! - Request pipeline outcomes, retries and latency
//! - Local rate limiter exhaustion
//! - Snapshot aggregation failures per source
//! - Trade cache size
//! - Position poller activity
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, register_int_counter,
    register_int_gauge, CounterVec, Encoder, Histogram, HistogramVec, IntCounter, IntGauge,
    TextEncoder,
};

/// Total logical requests by endpoint and outcome (`ok` or an error kind).
pub static REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpgate_requests_total",
        "Total logical exchange requests",
        &["endpoint", "outcome"]
    )
    .unwrap()
});

/// Retries scheduled, labelled by the error kind that caused them.
pub static REQUEST_RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpgate_request_retries_total",
        "Total request retries",
        &["kind"]
    )
    .unwrap()
});

/// Latency of a single HTTP attempt in milliseconds.
pub static REQUEST_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "perpgate_request_latency_ms",
        "Single HTTP attempt latency in milliseconds",
        &["endpoint"],
        vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Times the local token bucket was exhausted.
pub static RATE_LIMIT_WAITS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "perpgate_rate_limit_waits_total",
        "Times a caller slept on an exhausted local token bucket"
    )
    .unwrap()
});

/// Snapshot sources that failed.
pub static SOURCE_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpgate_source_failures_total",
        "Market snapshot sources that returned an error",
        &["source"]
    )
    .unwrap()
});

/// Wall time of a full snapshot fan-out.
pub static SNAPSHOT_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "perpgate_snapshot_latency_ms",
        "Market snapshot aggregation latency in milliseconds",
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 15000.0, 30000.0]
    )
    .unwrap()
});

/// Entries currently held in the rolling trade cache.
pub static TRADE_CACHE_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "perpgate_trade_cache_size",
        "Entries in the rolling trade cache"
    )
    .unwrap()
});

/// Position polls by outcome (`open`, `flat`, `error`).
pub static POSITION_POLLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perpgate_position_polls_total",
        "Position poller fetches by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Position poller running state (1 = running).
pub static POLLER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "perpgate_poller_running",
        "Position poller running state (1=running)"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record the final outcome of a logical request.
    pub fn request_completed(endpoint: &str, outcome: &str) {
        REQUESTS_TOTAL
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    /// Record a retry caused by an error of `kind`.
    pub fn request_retry(kind: &str) {
        REQUEST_RETRIES_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record latency of one HTTP attempt.
    pub fn request_latency(endpoint: &str, latency_ms: f64) {
        REQUEST_LATENCY_MS
            .with_label_values(&[endpoint])
            .observe(latency_ms);
    }

    /// Record a sleep on an exhausted token bucket.
    pub fn rate_limit_wait() {
        RATE_LIMIT_WAITS_TOTAL.inc();
    }

    /// Record a failed snapshot source.
    pub fn source_failed(source: &str) {
        SOURCE_FAILURES_TOTAL.with_label_values(&[source]).inc();
    }

    /// Record snapshot aggregation latency.
    pub fn snapshot_latency(latency_ms: f64) {
        SNAPSHOT_LATENCY_MS.observe(latency_ms);
    }

    /// Set the trade cache size.
    pub fn trade_cache_size(size: usize) {
        TRADE_CACHE_SIZE.set(i64::try_from(size).unwrap_or(i64::MAX));
    }

    /// Record a position poll outcome.
    pub fn position_poll(outcome: &str) {
        POSITION_POLLS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Set poller running state.
    pub fn poller_running(running: bool) {
        POLLER_RUNNING.set(i64::from(running));
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
