//! Prometheus metrics for the pool, pipeline, and watchdog.
//!
//! A fresh, non-deprecated metrics module built on the `prometheus` crate's
//! `Registry` + typed-metric-struct idiom, rather than the single-giant-struct
//! pattern the workspace's own `riptide-api` metrics module has since
//! deprecated in favour of split, purpose-specific collectors.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub struct PoolMetrics {
    pub registry: Registry,
    pub circuit_open: IntGauge,
    pub circuit_trips_total: IntCounter,
    pub launches_total: IntCounter,
    pub launch_failures_total: IntCounter,
    pub disconnects_total: IntCounter,
    pub restarts_total: IntCounterVec,
    pub extractions_total: IntCounterVec,
    pub extraction_duration_seconds: HistogramVec,
    pub queue_depth: IntGauge,
    pub active_extractions: IntGauge,
    pub queue_wait_seconds: prometheus::Histogram,
    pub context_creation_seconds: prometheus::Histogram,
    pub manifest_detection_seconds: prometheus::Histogram,
}

impl PoolMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let circuit_open = IntGauge::new("extract_circuit_open", "1 if the circuit is open")
            .expect("metric");
        let circuit_trips_total = IntCounter::new(
            "extract_circuit_trips_total",
            "Number of times the circuit has tripped open",
        )
        .expect("metric");
        let launches_total =
            IntCounter::new("extract_browser_launches_total", "Browser launches").expect("metric");
        let launch_failures_total = IntCounter::new(
            "extract_browser_launch_failures_total",
            "Browser launch failures",
        )
        .expect("metric");
        let disconnects_total = IntCounter::new(
            "extract_browser_disconnects_total",
            "Unexpected browser disconnects",
        )
        .expect("metric");
        let restarts_total = IntCounterVec::new(
            Opts::new("extract_browser_restarts_total", "Browser restarts by reason"),
            &["reason"],
        )
        .expect("metric");
        let extractions_total = IntCounterVec::new(
            Opts::new("extract_extractions_total", "Extractions by status and error type"),
            &["status", "error_type"],
        )
        .expect("metric");
        let extraction_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "extract_extraction_duration_seconds",
                "Extraction duration by status",
            ),
            &["status"],
        )
        .expect("metric");
        let queue_depth =
            IntGauge::new("extract_queue_depth", "Pending (not yet admitted) tasks").expect("metric");
        let active_extractions =
            IntGauge::new("extract_active_extractions", "Admitted, running extractions")
                .expect("metric");
        let queue_wait_seconds = prometheus::Histogram::with_opts(HistogramOpts::new(
            "extract_queue_wait_seconds",
            "Time spent waiting for admission",
        ))
        .expect("metric");
        let context_creation_seconds = prometheus::Histogram::with_opts(HistogramOpts::new(
            "extract_context_creation_seconds",
            "Time spent acquiring an extraction context",
        ))
        .expect("metric");
        let manifest_detection_seconds = prometheus::Histogram::with_opts(HistogramOpts::new(
            "extract_manifest_detection_seconds",
            "Time from admission to manifest sighting",
        ))
        .expect("metric");

        for collector in [
            Box::new(circuit_open.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(circuit_trips_total.clone()),
            Box::new(launches_total.clone()),
            Box::new(launch_failures_total.clone()),
            Box::new(disconnects_total.clone()),
            Box::new(restarts_total.clone()),
            Box::new(extractions_total.clone()),
            Box::new(extraction_duration_seconds.clone()),
            Box::new(queue_depth.clone()),
            Box::new(active_extractions.clone()),
            Box::new(queue_wait_seconds.clone()),
            Box::new(context_creation_seconds.clone()),
            Box::new(manifest_detection_seconds.clone()),
        ] {
            registry.register(collector).expect("metric registration");
        }

        Self {
            registry,
            circuit_open,
            circuit_trips_total,
            launches_total,
            launch_failures_total,
            disconnects_total,
            restarts_total,
            extractions_total,
            extraction_duration_seconds,
            queue_depth,
            active_extractions,
            queue_wait_seconds,
            context_creation_seconds,
            manifest_detection_seconds,
        }
    }

    pub fn render(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("encode metrics");
        String::from_utf8(buffer).expect("utf8 metrics")
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}
