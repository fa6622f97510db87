// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for discovery record reconciliation.
//!
//! All metrics use the `dnsdisc` namespace prefix. The binary prints them in text
//! exposition format at the end of a run when `--print-metrics` is given, so they can
//! be collected by a node exporter textfile collector.
//!
//! # Example
//!
//! ```rust,no_run
//! use dnsdisc::metrics::{gather_metrics, record_cache_wipe};
//!
//! record_cache_wipe("records");
//! println!("{}", gather_metrics().unwrap());
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

use crate::record::{Action, Topology};

/// Namespace prefix for all metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "dnsdisc";

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Outcome of each record handled by a run
///
/// Labels:
/// - `topology`: `active/active` or `active/passive`
/// - `outcome`: `applied`, `noop`, `skipped`, `failed`
/// - `reason`: reason code, empty for clean outcomes
pub static RECORD_OUTCOMES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_record_outcomes_total"),
        "Total number of discovery records handled by topology, outcome and reason",
    );
    let counter = CounterVec::new(opts, &["topology", "outcome", "reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Pool/depool writes sent to the control plane
///
/// Labels:
/// - `action`: `pool` or `depool`
pub static CONTROL_PLANE_WRITES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_control_plane_writes_total"),
        "Total number of pooled-state writes sent to the control plane",
    );
    let counter = CounterVec::new(opts, &["action"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Number of DNS check attempts needed until a record converged (or gave up)
///
/// Labels:
/// - `result`: `converged` or `diverged`
pub static VERIFICATION_ATTEMPTS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_verification_attempts"),
        "DNS check attempts per record until convergence",
    )
    .buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0, 10.0, 15.0]);
    let histogram = HistogramVec::new(opts, &["result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Recursor cache wipes
///
/// Labels:
/// - `kind`: `records` for targeted wipes, `zone` for whole-zone wipes
pub static CACHE_WIPES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_cache_wipes_total"),
        "Total number of recursor cache wipes by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of whole runs in seconds
///
/// Labels:
/// - `action`: `pool`, `depool`, `status`, `rollback`, `route`
pub static RUN_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_run_duration_seconds"),
        "Duration of reconciliation runs in seconds by action",
    )
    .buckets(vec![0.1, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0]);
    let histogram = HistogramVec::new(opts, &["action"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Record the outcome of one discovery record.
pub fn record_outcome(topology: Topology, outcome: &str, reason: Option<&str>) {
    RECORD_OUTCOMES_TOTAL
        .with_label_values(&[topology.as_str(), outcome, reason.unwrap_or("")])
        .inc();
}

/// Record a pooled-state write.
pub fn record_control_plane_write(action: Action) {
    CONTROL_PLANE_WRITES_TOTAL
        .with_label_values(&[action.as_str()])
        .inc();
}

/// Record how many check attempts a record needed.
pub fn record_verification_attempts(attempts: u32, converged: bool) {
    let result = if converged { "converged" } else { "diverged" };
    VERIFICATION_ATTEMPTS
        .with_label_values(&[result])
        .observe(f64::from(attempts));
}

/// Record a recursor cache wipe.
pub fn record_cache_wipe(kind: &str) {
    CACHE_WIPES_TOTAL.with_label_values(&[kind]).inc();
}

/// Record the duration of a run.
pub fn record_run_duration(action: &str, duration: Duration) {
    RUN_DURATION_SECONDS
        .with_label_values(&[action])
        .observe(duration.as_secs_f64());
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
