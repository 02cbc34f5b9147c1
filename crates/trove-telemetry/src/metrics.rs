//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Collector registration stays private; callers only see typed recorders.
//! - Label values are fixed vocabularies chosen by the caller (`full`, `ok`, ...).

use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{CollectorStage, Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the fleet.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    reconcile_cycles_total: IntCounterVec,
    records_written_total: IntCounterVec,
    placements_total: IntCounterVec,
    tracker_requests_total: IntCounterVec,
    queue_depth: IntGauge,
    workers_locked: IntGauge,
}

/// Snapshot of the gauges for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Pending admissions in the queue.
    pub queue_depth: i64,
    /// Workers whose lock was held at the last probe.
    pub workers_locked: i64,
}

fn counter(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::collector(name, CollectorStage::Build, source))
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::collector(name, CollectorStage::Build, source))
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::collector(name, CollectorStage::Register, source))
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = counter(
            "http_requests_total",
            "Total HTTP requests received",
            &["route", "code"],
        )?;
        let reconcile_cycles_total = counter(
            "reconcile_cycles_total",
            "Reconciliation passes by scope and outcome",
            &["scope", "outcome"],
        )?;
        let records_written_total = counter(
            "records_written_total",
            "Record store writes applied by reconciliation",
            &["kind"],
        )?;
        let placements_total = counter(
            "placements_total",
            "Placement attempts by outcome",
            &["outcome"],
        )?;
        let tracker_requests_total = counter(
            "tracker_requests_total",
            "Calls to the external metadata API by outcome",
            &["outcome"],
        )?;
        let queue_depth = gauge("queue_depth", "Queued admissions")?;
        let workers_locked = gauge("workers_locked", "Workers currently locked")?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "reconcile_cycles_total", &reconcile_cycles_total)?;
        register(&registry, "records_written_total", &records_written_total)?;
        register(&registry, "placements_total", &placements_total)?;
        register(&registry, "tracker_requests_total", &tracker_requests_total)?;
        register(&registry, "queue_depth", &queue_depth)?;
        register(&registry, "workers_locked", &workers_locked)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                reconcile_cycles_total,
                records_written_total,
                placements_total,
                tracker_requests_total,
                queue_depth,
                workers_locked,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Count one reconciliation pass.
    pub fn inc_reconcile(&self, scope: &str, outcome: &str) {
        self.inner
            .reconcile_cycles_total
            .with_label_values(&[scope, outcome])
            .inc();
    }

    /// Count records written by kind (`created`, `updated`, `deleted`).
    pub fn add_records_written(&self, kind: &str, count: usize) {
        self.inner
            .records_written_total
            .with_label_values(&[kind])
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Count one placement attempt.
    pub fn inc_placement(&self, outcome: &str) {
        self.inner
            .placements_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count one metadata API call.
    pub fn inc_tracker_request(&self, outcome: &str) {
        self.inner
            .tracker_requests_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Set the queue depth gauge.
    pub fn set_queue_depth(&self, depth: u64) {
        self.inner
            .queue_depth
            .set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    /// Set the locked-worker gauge.
    pub fn set_workers_locked(&self, count: usize) {
        self.inner
            .workers_locked
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Current gauge values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_depth: self.inner.queue_depth.get(),
            workers_locked: self.inner.workers_locked.get(),
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not UTF-8.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|source| TelemetryError::Exposition { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::ExpositionText { source })
    }
}
